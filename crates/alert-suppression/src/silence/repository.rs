//! Silence repository contract. Database driver specifics are out of
//! scope here — only the trait contract and an in-memory reference
//! implementation live in this module. A real deployment injects its own
//! implementation (Postgres, etc.) behind this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::{Silence, SilenceStatus};
use crate::error::{Error, Result};

/// Filter predicates accepted by `list_silences` / `count_silences`. The
/// silence manager's `list_silences` fast path checks for the *exact*
/// shape `{status: Some([Active]), no other predicate, no pagination}` —
/// see `SilenceFilter::is_active_only`.
#[derive(Debug, Clone, Default)]
pub struct SilenceFilter {
	pub status: Option<Vec<SilenceStatus>>,
	pub created_by: Option<String>,
	pub matcher_name: Option<String>,
	pub matcher_value: Option<String>,
	pub starts_after: Option<DateTime<Utc>>,
	pub ends_before: Option<DateTime<Utc>>,
	pub limit: Option<usize>,
	pub offset: Option<usize>,
}

impl SilenceFilter {
	pub fn active_only() -> Self {
		Self {
			status: Some(vec![SilenceStatus::Active]),
			..Default::default()
		}
	}

	/// True only for the exact shape the manager's cache fast-path is
	/// allowed to serve: `status == [active]` alone, nothing else. Any
	/// other predicate combined with `status=active` — this is spelled
	/// out — is a deliberate, non-obvious distinction and must fall
	/// through to the repository.
	pub fn is_active_only(&self) -> bool {
		matches!(&self.status, Some(s) if s == &[SilenceStatus::Active])
			&& self.created_by.is_none()
			&& self.matcher_name.is_none()
			&& self.matcher_value.is_none()
			&& self.starts_after.is_none()
			&& self.ends_before.is_none()
			&& self.limit.is_none()
			&& self.offset.is_none()
	}

	fn accepts(&self, s: &Silence) -> bool {
		if let Some(statuses) = &self.status {
			if !statuses.contains(&s.status) {
				return false;
			}
		}
		if let Some(by) = &self.created_by {
			if &s.created_by != by {
				return false;
			}
		}
		if let Some(name) = &self.matcher_name {
			if !s.matchers.iter().any(|m| &m.name == name) {
				return false;
			}
		}
		if let Some(value) = &self.matcher_value {
			if !s.matchers.iter().any(|m| &m.value == value) {
				return false;
			}
		}
		if let Some(after) = self.starts_after {
			if s.starts_at < after {
				return false;
			}
		}
		if let Some(before) = self.ends_before {
			if s.ends_at >= before {
				return false;
			}
		}
		true
	}
}

#[derive(Debug, Clone, Default)]
pub struct SilenceStats {
	pub total: usize,
	pub by_status: HashMap<String, usize>,
}

/// Collaborator contract expected by [`super::manager::SilenceManager`].
#[async_trait]
pub trait SilenceRepository: Send + Sync {
	async fn create_silence(&self, silence: Silence) -> Result<Silence>;

	/// `SilenceNotFound` for an absent ID.
	async fn get_silence_by_id(&self, id: &str) -> Result<Silence>;

	/// `SilenceConflict` on optimistic-lock failure.
	async fn update_silence(&self, silence: Silence) -> Result<Silence>;

	async fn delete_silence(&self, id: &str) -> Result<()>;

	async fn list_silences(&self, filter: &SilenceFilter) -> Result<Vec<Silence>>;

	async fn count_silences(&self, filter: &SilenceFilter) -> Result<usize>;

	/// `delete_expired=false`: transition `end<before ∧ status=active` to
	/// `expired`. `delete_expired=true`: delete `end<before ∧
	/// status=expired`. Touches at most `limit` rows per call so a single
	/// GC tick can't run an unbounded UPDATE/DELETE against a real
	/// backing store; the caller loops ticks to drain a larger backlog.
	/// Returns the number of rows touched.
	async fn expire_silences(&self, before: DateTime<Utc>, delete_expired: bool, limit: usize) -> Result<usize>;

	async fn bulk_update_status(&self, ids: &[String], status: SilenceStatus) -> Result<usize>;

	async fn get_silence_stats(&self) -> Result<SilenceStats>;
}

/// In-memory reference implementation, used by this crate's own tests and
/// by embedders with no database of their own.
#[derive(Default)]
pub struct InMemorySilenceRepository {
	silences: RwLock<HashMap<String, Silence>>,
}

impl InMemorySilenceRepository {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl SilenceRepository for InMemorySilenceRepository {
	async fn create_silence(&self, silence: Silence) -> Result<Silence> {
		let mut map = self.silences.write().expect("lock poisoned");
		map.insert(silence.id.clone(), silence.clone());
		Ok(silence)
	}

	async fn get_silence_by_id(&self, id: &str) -> Result<Silence> {
		self.silences
			.read()
			.expect("lock poisoned")
			.get(id)
			.cloned()
			.ok_or_else(|| Error::SilenceNotFound { id: id.to_string() })
	}

	async fn update_silence(&self, silence: Silence) -> Result<Silence> {
		let mut map = self.silences.write().expect("lock poisoned");
		if !map.contains_key(&silence.id) {
			return Err(Error::SilenceNotFound { id: silence.id.clone() });
		}
		map.insert(silence.id.clone(), silence.clone());
		Ok(silence)
	}

	async fn delete_silence(&self, id: &str) -> Result<()> {
		self.silences.write().expect("lock poisoned").remove(id);
		Ok(())
	}

	async fn list_silences(&self, filter: &SilenceFilter) -> Result<Vec<Silence>> {
		let map = self.silences.read().expect("lock poisoned");
		let mut matched: Vec<Silence> = map.values().filter(|s| filter.accepts(s)).cloned().collect();
		matched.sort_by(|a, b| a.id.cmp(&b.id));
		if let Some(offset) = filter.offset {
			matched = matched.into_iter().skip(offset).collect();
		}
		if let Some(limit) = filter.limit {
			matched.truncate(limit);
		}
		Ok(matched)
	}

	async fn count_silences(&self, filter: &SilenceFilter) -> Result<usize> {
		let map = self.silences.read().expect("lock poisoned");
		Ok(map.values().filter(|s| filter.accepts(s)).count())
	}

	async fn expire_silences(&self, before: DateTime<Utc>, delete_expired: bool, limit: usize) -> Result<usize> {
		let mut map = self.silences.write().expect("lock poisoned");
		if delete_expired {
			let mut to_delete: Vec<String> = map
				.values()
				.filter(|s| s.ends_at < before && s.status == SilenceStatus::Expired)
				.map(|s| s.id.clone())
				.collect();
			to_delete.sort();
			to_delete.truncate(limit);
			for id in &to_delete {
				map.remove(id);
			}
			Ok(to_delete.len())
		} else {
			let mut candidates: Vec<String> = map
				.values()
				.filter(|s| s.ends_at < before && s.status == SilenceStatus::Active)
				.map(|s| s.id.clone())
				.collect();
			candidates.sort();
			candidates.truncate(limit);
			for id in &candidates {
				map.get_mut(id).expect("id came from this map").status = SilenceStatus::Expired;
			}
			Ok(candidates.len())
		}
	}

	async fn bulk_update_status(&self, ids: &[String], status: SilenceStatus) -> Result<usize> {
		let mut map = self.silences.write().expect("lock poisoned");
		let mut count = 0;
		for id in ids {
			if let Some(s) = map.get_mut(id) {
				s.status = status;
				count += 1;
			}
		}
		Ok(count)
	}

	async fn get_silence_stats(&self) -> Result<SilenceStats> {
		let map = self.silences.read().expect("lock poisoned");
		let mut by_status = HashMap::new();
		for s in map.values() {
			*by_status.entry(s.status.as_str().to_string()).or_insert(0) += 1;
		}
		Ok(SilenceStats { total: map.len(), by_status })
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

	#[tokio::test]
	async fn create_then_get_round_trips() {
		let repo = InMemorySilenceRepository::new();
		let s = silence(-1);
		let created = repo.create_silence(s.clone()).await.unwrap();
		let fetched = repo.get_silence_by_id(&created.id).await.unwrap();
		assert_eq!(fetched.id, s.id);
	}

	#[tokio::test]
	async fn get_missing_returns_not_found() {
		let repo = InMemorySilenceRepository::new();
		let err = repo.get_silence_by_id("nope").await.unwrap_err();
		assert_eq!(err.kind(), "silence_not_found");
	}

	#[tokio::test]
	async fn expire_silences_transitions_then_deletes() {
		let repo = InMemorySilenceRepository::new();
		let mut s = silence(-3);
		s.status = SilenceStatus::Active;
		s.ends_at = Utc::now() - Duration::hours(2);
		repo.create_silence(s.clone()).await.unwrap();

		let touched = repo.expire_silences(Utc::now(), false, 100).await.unwrap();
		assert_eq!(touched, 1);
		let fetched = repo.get_silence_by_id(&s.id).await.unwrap();
		assert_eq!(fetched.status, SilenceStatus::Expired);

		let deleted = repo
			.expire_silences(Utc::now() + Duration::hours(25), true, 100)
			.await
			.unwrap();
		assert_eq!(deleted, 1);
		assert!(repo.get_silence_by_id(&s.id).await.is_err());
	}

	#[tokio::test]
	async fn expire_silences_respects_batch_limit() {
		let repo = InMemorySilenceRepository::new();
		for _ in 0..5 {
			let mut s = silence(-3);
			s.status = SilenceStatus::Active;
			s.ends_at = Utc::now() - Duration::hours(2);
			repo.create_silence(s).await.unwrap();
		}

		let touched = repo.expire_silences(Utc::now(), false, 2).await.unwrap();
		assert_eq!(touched, 2);
		let remaining_active = repo
			.list_silences(&SilenceFilter { status: Some(vec![SilenceStatus::Active]), ..Default::default() })
			.await
			.unwrap();
		assert_eq!(remaining_active.len(), 3);
	}

	#[test]
	fn active_only_filter_shape_detection() {
		assert!(SilenceFilter::active_only().is_active_only());
		let mut f = SilenceFilter::active_only();
		f.created_by = Some("me".into());
		assert!(!f.is_active_only());
		let mut f2 = SilenceFilter::active_only();
		f2.limit = Some(10);
		assert!(!f2.is_active_only());
	}
}
