//! Configuration validation for the silence manager. Invalid values fall
//! back to defaults with a warning rather than failing construction —
//! the manager must still be constructible even from a bad config file.

use std::time::Duration;

use tracing::warn;

const MIN_GC_INTERVAL: Duration = Duration::from_secs(60);
const MIN_GC_RETENTION: Duration = Duration::from_secs(3600);
const MAX_GC_BATCH_SIZE: usize = 10_000;
const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(10);
const MIN_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Hard cap on "fetch all active silences" queries, used by both the
/// manager's initial sync and the recurring sync worker.
pub const ACTIVE_SILENCE_FETCH_CAP: usize = 10_000;

#[derive(Debug, Clone)]
pub struct SilenceManagerConfig {
	pub gc_interval: Duration,
	pub gc_retention: Duration,
	pub gc_batch_size: usize,
	pub sync_interval: Duration,
	pub shutdown_timeout: Duration,
}

impl Default for SilenceManagerConfig {
	fn default() -> Self {
		Self {
			gc_interval: Duration::from_secs(5 * 60),
			gc_retention: Duration::from_secs(24 * 3600),
			gc_batch_size: 1000,
			sync_interval: Duration::from_secs(60),
			shutdown_timeout: Duration::from_secs(30),
		}
	}
}

impl SilenceManagerConfig {
	/// Validate and clamp to defaults-with-warning: `gc_interval >= 1m`,
	/// `gc_retention >= 1h`, `gc_batch_size in (0, 10000]`,
	/// `sync_interval >= 10s`, `shutdown_timeout >= 5s`.
	pub fn validated(mut self) -> Self {
		let defaults = Self::default();

		if self.gc_interval < MIN_GC_INTERVAL {
			warn!(?self.gc_interval, minimum = ?MIN_GC_INTERVAL, "gc_interval too low, using default");
			self.gc_interval = defaults.gc_interval;
		}
		if self.gc_retention < MIN_GC_RETENTION {
			warn!(?self.gc_retention, minimum = ?MIN_GC_RETENTION, "gc_retention too low, using default");
			self.gc_retention = defaults.gc_retention;
		}
		if self.gc_batch_size == 0 || self.gc_batch_size > MAX_GC_BATCH_SIZE {
			warn!(self.gc_batch_size, "gc_batch_size out of range, using default");
			self.gc_batch_size = defaults.gc_batch_size;
		}
		if self.sync_interval < MIN_SYNC_INTERVAL {
			warn!(?self.sync_interval, minimum = ?MIN_SYNC_INTERVAL, "sync_interval too low, using default");
			self.sync_interval = defaults.sync_interval;
		}
		if self.shutdown_timeout < MIN_SHUTDOWN_TIMEOUT {
			warn!(?self.shutdown_timeout, minimum = ?MIN_SHUTDOWN_TIMEOUT, "shutdown_timeout too low, using default");
			self.shutdown_timeout = defaults.shutdown_timeout;
		}

		self
	}

	/// Overlay environment variable overrides (`SILENCE_GC_INTERVAL`,
	/// `SILENCE_GC_RETENTION`, `SILENCE_GC_BATCH_SIZE`,
	/// `SILENCE_SYNC_INTERVAL`, `SILENCE_SHUTDOWN_TIMEOUT`), then validate.
	/// Durations use Go-duration-compatible syntax (`5m`, `24h`) parsed
	/// with `humantime`.
	pub fn from_env() -> Self {
		Self::default().with_env_overrides()
	}

	pub fn with_env_overrides(mut self) -> Self {
		if let Some(d) = env_duration("SILENCE_GC_INTERVAL") {
			self.gc_interval = d;
		}
		if let Some(d) = env_duration("SILENCE_GC_RETENTION") {
			self.gc_retention = d;
		}
		if let Ok(v) = std::env::var("SILENCE_GC_BATCH_SIZE") {
			if let Ok(n) = v.parse() {
				self.gc_batch_size = n;
			} else {
				warn!(value = %v, "SILENCE_GC_BATCH_SIZE is not a valid integer, ignoring");
			}
		}
		if let Some(d) = env_duration("SILENCE_SYNC_INTERVAL") {
			self.sync_interval = d;
		}
		if let Some(d) = env_duration("SILENCE_SHUTDOWN_TIMEOUT") {
			self.shutdown_timeout = d;
		}
		self.validated()
	}
}

fn env_duration(name: &str) -> Option<Duration> {
	let raw = std::env::var(name).ok()?;
	match humantime::parse_duration(&raw) {
		Ok(d) => Some(d),
		Err(e) => {
			warn!(%name, value = %raw, error = %e, "invalid duration in environment, ignoring");
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let cfg = SilenceManagerConfig::default().validated();
		assert_eq!(cfg.gc_interval, Duration::from_secs(300));
	}

	#[test]
	fn below_minimum_falls_back_to_default() {
		let cfg = SilenceManagerConfig {
			gc_interval: Duration::from_secs(1),
			..SilenceManagerConfig::default()
		}
		.validated();
		assert_eq!(cfg.gc_interval, SilenceManagerConfig::default().gc_interval);
	}

	#[test]
	fn batch_size_zero_falls_back() {
		let cfg = SilenceManagerConfig { gc_batch_size: 0, ..SilenceManagerConfig::default() }.validated();
		assert_eq!(cfg.gc_batch_size, 1000);
	}

	#[test]
	fn env_overrides_are_applied() {
		temp_env::with_vars(
			vec![
				("SILENCE_GC_INTERVAL", Some("10m")),
				("SILENCE_GC_BATCH_SIZE", Some("500")),
			],
			|| {
				let cfg = SilenceManagerConfig::from_env();
				assert_eq!(cfg.gc_interval, Duration::from_secs(600));
				assert_eq!(cfg.gc_batch_size, 500);
			},
		);
	}
}
