//! Inhibition state manager: tracks live inhibition decisions for
//! observability and cross-instance consistency, backed by a concurrent
//! in-memory map with an optional L2 read-through/write-behind tier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;

use super::store::DistributedStore;
use super::InhibitionState;
use crate::error::{Error, Result};
use crate::metrics;
use crate::worker::Worker;

const DEFAULT_PREFIX: &str = "inhibition:state";

#[derive(Debug, Clone)]
pub struct InhibitionStateConfig {
	pub l2_ttl: Duration,
	pub cleanup_interval: Duration,
	pub key_prefix: String,
}

impl Default for InhibitionStateConfig {
	fn default() -> Self {
		Self {
			l2_ttl: Duration::from_secs(24 * 3600),
			cleanup_interval: Duration::from_secs(60),
			key_prefix: DEFAULT_PREFIX.to_string(),
		}
	}
}

pub struct InhibitionStateManager {
	records: DashMap<String, InhibitionState>,
	l2: Option<Arc<dyn DistributedStore>>,
	config: InhibitionStateConfig,
	cleanup: tokio::sync::Mutex<Option<Worker>>,
}

impl InhibitionStateManager {
	pub fn new(config: InhibitionStateConfig, l2: Option<Arc<dyn DistributedStore>>) -> Arc<Self> {
		Arc::new(Self {
			records: DashMap::new(),
			l2,
			config,
			cleanup: tokio::sync::Mutex::new(None),
		})
	}

	fn key(&self, target_fp: &str) -> String {
		format!("{}:{}", self.config.key_prefix, target_fp)
	}

	pub async fn record_inhibition(&self, state: InhibitionState) -> Result<()> {
		if state.target_fp.is_empty() {
			return Err(Error::InvalidFilter("inhibition state target_fp must not be empty".into()));
		}
		if state.source_fp.is_empty() {
			return Err(Error::InvalidFilter("inhibition state source_fp must not be empty".into()));
		}

		let start = Instant::now();
		let rule_name = state.rule_name.clone();
		self.records.insert(state.target_fp.clone(), state.clone());
		metrics::record_inhibition_recorded(&rule_name);

		if let Some(l2) = &self.l2 {
			match serde_json::to_string(&state) {
				Ok(json) => {
					if let Err(err) = l2.set(&self.key(&state.target_fp), &json, self.config.l2_ttl).await {
						warn!(error = %err, target_fp = %state.target_fp, "l2 persist failed");
						metrics::record_redis_error("record_inhibition");
					}
				}
				Err(err) => warn!(error = %err, "failed to serialize inhibition state"),
			}
		}

		metrics::record_inhibition_state_operation("record_inhibition", start.elapsed());
		Ok(())
	}

	pub async fn remove_inhibition(&self, target_fp: &str) -> Result<()> {
		if target_fp.is_empty() {
			return Err(Error::InvalidFilter("target_fp must not be empty".into()));
		}
		let start = Instant::now();
		self.records.remove(target_fp);
		metrics::record_inhibition_removed("explicit");

		if let Some(l2) = &self.l2 {
			if let Err(err) = l2.delete(&self.key(target_fp)).await {
				warn!(error = %err, target_fp, "l2 delete failed");
				metrics::record_redis_error("remove_inhibition");
			}
		}

		metrics::record_inhibition_state_operation("remove_inhibition", start.elapsed());
		Ok(())
	}

	/// Memory-only lookup with lazy expiry: an expired entry is deleted
	/// on read rather than waiting for the cleanup worker.
	pub fn is_inhibited(&self, target_fp: &str) -> bool {
		self.lazy_lookup(target_fp).is_some()
	}

	fn lazy_lookup(&self, target_fp: &str) -> Option<InhibitionState> {
		let now = Utc::now();
		let expired = self
			.records
			.get(target_fp)
			.map(|entry| entry.is_expired(now))
			.unwrap_or(false);
		if expired {
			self.records.remove(target_fp);
			metrics::record_inhibition_expired();
			return None;
		}
		self.records.get(target_fp).map(|entry| entry.clone())
	}

	/// Memory lookup with the same lazy-expiry rule; on a memory miss,
	/// read through to L2, rehydrate memory on a hit, and return. Absence
	/// in L2 (or no L2 configured) means no inhibition state exists.
	pub async fn get_inhibition_state(&self, target_fp: &str) -> Option<InhibitionState> {
		if let Some(state) = self.lazy_lookup(target_fp) {
			return Some(state);
		}

		let l2 = self.l2.as_ref()?;
		match l2.get(&self.key(target_fp)).await {
			Ok(Some(json)) => match serde_json::from_str::<InhibitionState>(&json) {
				Ok(state) => {
					self.records.insert(target_fp.to_string(), state.clone());
					Some(state)
				}
				Err(err) => {
					warn!(error = %err, target_fp, "dropping corrupt l2 inhibition state");
					None
				}
			},
			Ok(None) => None,
			Err(err) => {
				warn!(error = %err, target_fp, "l2 read-through failed");
				metrics::record_redis_error("get_inhibition_state");
				None
			}
		}
	}

	/// All currently active inhibitions (memory only), filtering and
	/// lazily deleting expired entries as encountered.
	pub fn get_active_inhibitions(&self) -> Vec<InhibitionState> {
		let now = Utc::now();
		let mut active = Vec::new();
		let mut expired_keys = Vec::new();
		for entry in self.records.iter() {
			if entry.is_expired(now) {
				expired_keys.push(entry.key().clone());
			} else {
				active.push(entry.value().clone());
			}
		}
		for key in expired_keys {
			self.records.remove(&key);
			metrics::record_inhibition_expired();
		}
		active
	}

	/// Target fingerprints currently inhibited, equivalent to the keys
	/// of [`Self::get_active_inhibitions`].
	pub fn get_inhibited_alerts(&self) -> Vec<String> {
		self.get_active_inhibitions().into_iter().map(|s| s.target_fp).collect()
	}

	fn sweep_expired(&self) {
		let now = Utc::now();
		let expired_keys: Vec<String> = self
			.records
			.iter()
			.filter(|entry| entry.is_expired(now))
			.map(|entry| entry.key().clone())
			.collect();
		for key in &expired_keys {
			self.records.remove(key);
		}
		if !expired_keys.is_empty() {
			for _ in &expired_keys {
				metrics::record_inhibition_expired();
			}
		}
		metrics::set_inhibition_state_active(self.records.len() as i64);
	}

	pub async fn start_cleanup_worker(self: &Arc<Self>) {
		let this = self.clone();
		let worker = Worker::spawn("inhibition-state-cleanup", self.config.cleanup_interval, move || {
			let this = this.clone();
			async move { this.sweep_expired() }
		});
		*self.cleanup.lock().await = Some(worker);
	}

	/// Idempotent: safe against repeated calls, mirroring the rest of
	/// this crate's worker shutdown convention.
	pub async fn stop_cleanup_worker(&self) {
		if let Some(mut w) = self.cleanup.lock().await.take() {
			w.stop().await;
		}
	}
}
