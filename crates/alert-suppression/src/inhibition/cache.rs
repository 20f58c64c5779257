//! Active alert cache: two-tier store of currently-firing alerts backing
//! the inhibition matcher. L1 is an in-memory, capacity-bounded map; L2
//! is an optional distributed store consulted only on L1 miss.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::matcher::FiringAlertSource;
use super::store::DistributedStore;
use crate::alert::Alert;
#[cfg(test)]
use crate::alert::AlertStatus;
use crate::metrics;
use crate::worker::Worker;

const DEFAULT_PREFIX: &str = "inhibition:active_alerts";

#[derive(Debug, Clone)]
pub struct ActiveAlertCacheConfig {
	pub l1_capacity: usize,
	pub l2_ttl: Duration,
	pub cleanup_interval: Duration,
	pub key_prefix: String,
}

impl Default for ActiveAlertCacheConfig {
	fn default() -> Self {
		Self {
			l1_capacity: 1000,
			l2_ttl: Duration::from_secs(5 * 60),
			cleanup_interval: Duration::from_secs(60),
			key_prefix: DEFAULT_PREFIX.to_string(),
		}
	}
}

struct Inner {
	by_fingerprint: HashMap<String, Alert>,
}

/// Firing-alert store with graceful L2 fallback. L1 alone serves the hot
/// path; L2, when configured, lets a freshly started replica recover its
/// firing set instead of starting cold.
pub struct ActiveAlertCache {
	inner: std::sync::RwLock<Inner>,
	l2: Option<Arc<dyn DistributedStore>>,
	config: ActiveAlertCacheConfig,
	cleanup: tokio::sync::Mutex<Option<Worker>>,
}

impl ActiveAlertCache {
	pub fn new(config: ActiveAlertCacheConfig, l2: Option<Arc<dyn DistributedStore>>) -> Arc<Self> {
		Arc::new(Self {
			inner: std::sync::RwLock::new(Inner { by_fingerprint: HashMap::new() }),
			l2,
			config,
			cleanup: tokio::sync::Mutex::new(None),
		})
	}

	fn alert_key(&self, fp: &str) -> String {
		format!("{}:{}", self.config.key_prefix, fp)
	}

	fn set_key(&self) -> String {
		format!("{}:set", self.config.key_prefix)
	}

	/// Insert into L1 (evicting the oldest-`starts_at` entry when full)
	/// and best-effort mirror into L2. L2 failures are logged, never
	/// propagated: the cache's correctness never depends on L2 being up.
	pub async fn add_firing_alert(&self, alert: Alert) {
		{
			let mut inner = self.inner.write().expect("lock poisoned");
			if inner.by_fingerprint.len() >= self.config.l1_capacity
				&& !inner.by_fingerprint.contains_key(&alert.fingerprint)
			{
				if let Some(oldest_fp) = inner
					.by_fingerprint
					.values()
					.min_by_key(|a| a.starts_at)
					.map(|a| a.fingerprint.clone())
				{
					inner.by_fingerprint.remove(&oldest_fp);
					metrics::record_cache_eviction();
				}
			}
			inner.by_fingerprint.insert(alert.fingerprint.clone(), alert.clone());
		}

		if let Some(l2) = &self.l2 {
			let key = self.alert_key(&alert.fingerprint);
			match serde_json::to_string(&alert) {
				Ok(json) => {
					if let Err(err) = l2.set(&key, &json, self.config.l2_ttl).await {
						warn!(error = %err, fingerprint = %alert.fingerprint, "l2 write failed");
						metrics::record_redis_error("add_firing_alert");
					}
					if let Err(err) = l2.sadd(&self.set_key(), &alert.fingerprint).await {
						warn!(error = %err, "l2 set tracking failed");
						metrics::record_redis_error("add_firing_alert");
					}
				}
				Err(err) => warn!(error = %err, "failed to serialize alert for l2"),
			}
		}
	}

	pub async fn remove_alert(&self, fingerprint: &str) {
		self.inner.write().expect("lock poisoned").by_fingerprint.remove(fingerprint);
		if let Some(l2) = &self.l2 {
			if let Err(err) = l2.delete(&self.alert_key(fingerprint)).await {
				warn!(error = %err, fingerprint, "l2 delete failed");
				metrics::record_redis_error("remove_alert");
			}
			if let Err(err) = l2.srem(&self.set_key(), fingerprint).await {
				warn!(error = %err, "l2 set removal failed");
				metrics::record_redis_error("remove_alert");
			}
		}
	}

	/// Fast path: any firing alert in L1 means L1 is considered
	/// authoritative and L2 is not consulted. Only a fully-cold L1
	/// (process restart, or everything evicted) triggers L2 recovery.
	pub async fn get_firing_alerts(&self) -> Vec<Alert> {
		let l1_firing: Vec<Alert> = {
			let inner = self.inner.read().expect("lock poisoned");
			inner.by_fingerprint.values().filter(|a| a.is_firing()).cloned().collect()
		};
		if !l1_firing.is_empty() {
			metrics::record_cache_hit("l1");
			return l1_firing;
		}
		metrics::record_cache_miss("l1");

		let Some(l2) = &self.l2 else {
			return Vec::new();
		};

		let fingerprints = match l2.smembers(&self.set_key()).await {
			Ok(members) => members,
			Err(err) => {
				warn!(error = %err, "l2 recovery enumeration failed");
				metrics::record_redis_error("get_firing_alerts");
				return Vec::new();
			}
		};

		let mut recovered = Vec::new();
		for fp in fingerprints {
			match l2.get(&self.alert_key(&fp)).await {
				Ok(Some(json)) => match serde_json::from_str::<Alert>(&json) {
					Ok(alert) if alert.is_firing() => recovered.push(alert),
					Ok(_) => {} // resolved entries are dropped, not treated as orphans
					Err(err) => {
						debug!(error = %err, fingerprint = %fp, "dropping corrupt l2 entry");
						let _ = l2.srem(&self.set_key(), &fp).await;
					}
				},
				Ok(None) => {
					let _ = l2.srem(&self.set_key(), &fp).await;
				}
				Err(err) => {
					warn!(error = %err, fingerprint = %fp, "l2 read failed during recovery");
					metrics::record_redis_error("get_firing_alerts");
				}
			}
		}

		if !recovered.is_empty() {
			metrics::record_cache_hit("l2");
			let mut inner = self.inner.write().expect("lock poisoned");
			for alert in recovered.iter().take(self.config.l1_capacity) {
				inner.by_fingerprint.insert(alert.fingerprint.clone(), alert.clone());
			}
		} else {
			metrics::record_cache_miss("l2");
		}

		recovered
	}

	pub fn size(&self) -> usize {
		let size = self.inner.read().expect("lock poisoned").by_fingerprint.len();
		metrics::set_cache_size(size);
		size
	}

	/// Sweep entries that are resolved-and-past-end or have outlived
	/// their TTL since `starts_at`. Does not touch L2 — L2 entries expire
	/// on their own TTL.
	fn sweep_expired(&self, ttl: Duration) {
		let now = Utc::now();
		let mut inner = self.inner.write().expect("lock poisoned");
		inner.by_fingerprint.retain(|_, alert| {
			let ended = matches!(alert.ends_at, Some(end) if end <= now);
			let aged_out = now.signed_duration_since(alert.starts_at)
				> chrono::Duration::from_std(ttl).unwrap_or_default();
			!(ended || aged_out)
		});
	}

	pub async fn start_cleanup_worker(self: &Arc<Self>) {
		let this = self.clone();
		let ttl = self.config.l2_ttl;
		let worker = Worker::spawn("active-alert-cleanup", self.config.cleanup_interval, move || {
			let this = this.clone();
			async move { this.sweep_expired(ttl) }
		});
		*self.cleanup.lock().await = Some(worker);
	}

	pub async fn stop(&self) {
		if let Some(mut w) = self.cleanup.lock().await.take() {
			w.stop().await;
		}
	}
}

#[async_trait::async_trait]
impl FiringAlertSource for ActiveAlertCache {
	async fn get_firing_alerts(&self) -> Vec<Alert> {
		ActiveAlertCache::get_firing_alerts(self).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::inhibition::store::InMemoryStore;
	use std::collections::BTreeMap;

	fn alert(fp: &str, status: AlertStatus) -> Alert {
		Alert {
			fingerprint: fp.to_string(),
			labels: BTreeMap::new(),
			annotations: BTreeMap::new(),
			status,
			starts_at: Utc::now(),
			ends_at: None,
		}
	}

	#[tokio::test]
	async fn add_and_get_round_trip() {
		let cache = ActiveAlertCache::new(ActiveAlertCacheConfig::default(), None);
		cache.add_firing_alert(alert("a", AlertStatus::Firing)).await;
		let firing = cache.get_firing_alerts().await;
		assert_eq!(firing.len(), 1);
	}

	#[tokio::test]
	async fn resolved_alerts_invisible_to_readers() {
		let cache = ActiveAlertCache::new(ActiveAlertCacheConfig::default(), None);
		cache.add_firing_alert(alert("a", AlertStatus::Resolved)).await;
		assert!(cache.get_firing_alerts().await.is_empty());
		assert_eq!(cache.size(), 1);
	}

	#[tokio::test]
	async fn eviction_removes_oldest_starts_at() {
		let config = ActiveAlertCacheConfig { l1_capacity: 2, ..Default::default() };
		let cache = ActiveAlertCache::new(config, None);
		let mut old = alert("old", AlertStatus::Firing);
		old.starts_at = Utc::now() - chrono::Duration::hours(1);
		cache.add_firing_alert(old).await;
		cache.add_firing_alert(alert("mid", AlertStatus::Firing)).await;
		cache.add_firing_alert(alert("new", AlertStatus::Firing)).await;

		assert_eq!(cache.size(), 2);
		let firing = cache.get_firing_alerts().await;
		assert!(!firing.iter().any(|a| a.fingerprint == "old"));
	}

	#[tokio::test]
	async fn remove_alert_deletes_from_l1() {
		let cache = ActiveAlertCache::new(ActiveAlertCacheConfig::default(), None);
		cache.add_firing_alert(alert("a", AlertStatus::Firing)).await;
		cache.remove_alert("a").await;
		assert!(cache.get_firing_alerts().await.is_empty());
	}

	#[tokio::test]
	async fn recovers_from_l2_when_l1_empty() {
		let store = Arc::new(InMemoryStore::new());
		let cache = ActiveAlertCache::new(ActiveAlertCacheConfig::default(), Some(store.clone()));
		cache.add_firing_alert(alert("a", AlertStatus::Firing)).await;

		// simulate a fresh replica: new cache sharing the same L2
		let fresh = ActiveAlertCache::new(ActiveAlertCacheConfig::default(), Some(store));
		let firing = fresh.get_firing_alerts().await;
		assert_eq!(firing.len(), 1);
		assert_eq!(fresh.size(), 1);
	}

	#[tokio::test]
	async fn orphan_l2_fingerprint_is_dropped() {
		let store = Arc::new(InMemoryStore::new());
		store.sadd("inhibition:active_alerts:set", "ghost").await.unwrap();
		let cache = ActiveAlertCache::new(ActiveAlertCacheConfig::default(), Some(store.clone()));
		let firing = cache.get_firing_alerts().await;
		assert!(firing.is_empty());
		assert_eq!(store.scard("inhibition:active_alerts:set").await.unwrap(), 0);
	}

	#[tokio::test]
	async fn sweep_removes_ended_and_aged_entries() {
		let cache = ActiveAlertCache::new(ActiveAlertCacheConfig::default(), None);
		let mut ended = alert("ended", AlertStatus::Firing);
		ended.ends_at = Some(Utc::now() - chrono::Duration::minutes(1));
		cache.add_firing_alert(ended).await;
		cache.add_firing_alert(alert("live", AlertStatus::Firing)).await;

		cache.sweep_expired(Duration::from_secs(5 * 60));
		assert_eq!(cache.size(), 1);
	}
}
