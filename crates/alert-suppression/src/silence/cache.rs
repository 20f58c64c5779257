//! Silence cache: in-memory, read-mostly index of
//! silences by ID and by status. Multi-reader/single-writer, fully
//! replaceable by [`SilenceCache::rebuild`].

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{Silence, SilenceStatus};
use crate::metrics;

#[derive(Debug, Clone)]
pub struct CacheStats {
	pub size: usize,
	pub last_sync: Option<DateTime<Utc>>,
	pub by_status_counts: HashMap<String, usize>,
}

struct Inner {
	by_id: HashMap<String, Silence>,
	by_status: HashMap<SilenceStatus, Vec<String>>,
	last_sync: Option<DateTime<Utc>>,
}

impl Inner {
	fn new() -> Self {
		Self {
			by_id: HashMap::new(),
			by_status: HashMap::new(),
			last_sync: None,
		}
	}

	/// Rebuild the by-status index from `by_id` from scratch. Deliberately
	/// a full O(N) rebuild rather than incremental maintenance, so the
	/// index can never drift out of sync with `by_id` — do not "optimize"
	/// this into incremental updates without re-checking that guarantee.
	fn reindex(&mut self) {
		self.by_status.clear();
		for (id, silence) in &self.by_id {
			self.by_status.entry(silence.status).or_default().push(id.clone());
		}
	}
}

/// Thread-safe, read-mostly index over the current silence set.
pub struct SilenceCache {
	inner: RwLock<Inner>,
}

impl Default for SilenceCache {
	fn default() -> Self {
		Self::new()
	}
}

impl SilenceCache {
	pub fn new() -> Self {
		Self { inner: RwLock::new(Inner::new()) }
	}

	pub fn get(&self, id: &str) -> Option<Silence> {
		let found = self.inner.read().expect("cache lock poisoned").by_id.get(id).cloned();
		metrics::record_cache_op(found.is_some(), "get");
		found
	}

	/// Insert-or-replace by ID; refreshes the by-status index under the
	/// same exclusive section: `set` is linearizable.
	pub fn set(&self, silence: Silence) {
		let mut inner = self.inner.write().expect("cache lock poisoned");
		inner.by_id.insert(silence.id.clone(), silence);
		inner.reindex();
	}

	pub fn delete(&self, id: &str) {
		let mut inner = self.inner.write().expect("cache lock poisoned");
		if inner.by_id.remove(id).is_some() {
			inner.reindex();
		}
	}

	/// Snapshot of all silences with the given status. Returned `Vec` is a
	/// copy of the reference list, not an alias into internal storage:
	/// callers may not observe concurrent mutation mid-iteration.
	pub fn get_by_status(&self, status: SilenceStatus) -> Vec<Silence> {
		let inner = self.inner.read().expect("cache lock poisoned");
		let ids = inner.by_status.get(&status);
		metrics::record_cache_op(ids.is_some(), "get_by_status");
		ids.map(|ids| ids.iter().filter_map(|id| inner.by_id.get(id).cloned()).collect())
			.unwrap_or_default()
	}

	pub fn get_all(&self) -> Vec<Silence> {
		self.inner.read().expect("cache lock poisoned").by_id.values().cloned().collect()
	}

	/// Atomic full replacement: readers either see the entire old state or
	/// the entire new state. Updates `last_sync`.
	pub fn rebuild(&self, silences: Vec<Silence>) {
		let mut inner = self.inner.write().expect("cache lock poisoned");
		inner.by_id = silences.into_iter().map(|s| (s.id.clone(), s)).collect();
		inner.reindex();
		inner.last_sync = Some(Utc::now());
	}

	pub fn stats(&self) -> CacheStats {
		let inner = self.inner.read().expect("cache lock poisoned");
		let mut by_status_counts = HashMap::new();
		for (status, ids) in &inner.by_status {
			by_status_counts.insert(status.as_str().to_string(), ids.len());
		}
		CacheStats {
			size: inner.by_id.len(),
			last_sync: inner.last_sync,
			by_status_counts,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::matcher::MatchType;
	use crate::silence::MatcherSpec;
	use chrono::Duration;

	fn silence(status_offset_hours: i64) -> Silence {
		let now = Utc::now();
		let start = now + Duration::hours(status_offset_hours);
		Silence::new(
			"me",
			"",
			start,
			start + Duration::hours(1),
			vec![MatcherSpec { name: "a".into(), value: "b".into(), match_type: MatchType::Equal }],
			now,
		)
		.unwrap()
	}

	#[test]
	fn set_and_get_round_trip() {
		let cache = SilenceCache::new();
		let s = silence(-1);
		let id = s.id.clone();
		cache.set(s.clone());
		let got = cache.get(&id).unwrap();
		assert_eq!(got.id, s.id);
	}

	#[test]
	fn delete_removes_from_both_indexes() {
		let cache = SilenceCache::new();
		let s = silence(-1);
		let id = s.id.clone();
		cache.set(s);
		cache.delete(&id);
		assert!(cache.get(&id).is_none());
		assert!(cache.get_by_status(SilenceStatus::Active).is_empty());
	}

	#[test]
	fn get_by_status_matches_reindex() {
		let cache = SilenceCache::new();
		let active = silence(-1);
		let pending = silence(1);
		cache.set(active.clone());
		cache.set(pending.clone());
		let actives = cache.get_by_status(SilenceStatus::Active);
		assert_eq!(actives.len(), 1);
		assert_eq!(actives[0].id, active.id);
	}

	#[test]
	fn rebuild_replaces_atomically() {
		let cache = SilenceCache::new();
		cache.set(silence(-1));
		let fresh = vec![silence(-1), silence(-1)];
		cache.rebuild(fresh.clone());
		let all = cache.get_all();
		assert_eq!(all.len(), 2);
		let stats = cache.stats();
		assert_eq!(stats.size, 2);
		assert!(stats.last_sync.is_some());
	}

	#[test]
	fn snapshot_is_a_copy() {
		let cache = SilenceCache::new();
		cache.set(silence(-1));
		let mut snapshot = cache.get_by_status(SilenceStatus::Active);
		snapshot.clear();
		assert_eq!(cache.get_by_status(SilenceStatus::Active).len(), 1);
	}
}
