//! Generalized background worker lifecycle: one stop-channel, one
//! done-handle, tick cadence driven by a timer, immediate execution on
//! start. Pulled out once and reused by every background worker this
//! crate runs.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// A running background task plus the means to stop it.
///
/// `stop` closes the stop signal and blocks until the task's done-channel
/// fires. Dropping a `Worker` without calling `stop`
/// leaves the task running detached — callers that need the tidy shutdown
/// guarantee must call `stop` explicitly, mirroring `Scheduler::shutdown`
/// aborting tracked `JoinHandle`s.
pub struct Worker {
	stop_tx: Option<oneshot::Sender<()>>,
	handle: Option<JoinHandle<()>>,
	name: &'static str,
}

impl Worker {
	/// Spawn `body` immediately, then again every `interval`, until
	/// stopped. `body` receives no arguments; callers close over whatever
	/// state they need (repository, cache, metrics).
	pub fn spawn<F, Fut>(name: &'static str, interval: Duration, mut body: F) -> Self
	where
		F: FnMut() -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send,
	{
		let (stop_tx, mut stop_rx) = oneshot::channel();

		let handle = tokio::spawn(async move {
			debug!(worker = name, "running initial tick");
			body().await;

			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			// the first tick fires immediately; we already ran the initial
			// body() above, so consume it without running body() twice.
			ticker.tick().await;

			loop {
				tokio::select! {
					_ = &mut stop_rx => {
						debug!(worker = name, "stop signal received");
						break;
					}
					_ = ticker.tick() => {
						debug!(worker = name, "tick");
						body().await;
					}
				}
			}
		});

		Self {
			stop_tx: Some(stop_tx),
			handle: Some(handle),
			name,
		}
	}

	/// Signal the worker to stop and wait for it to exit. Idempotent:
	/// calling this twice (or on an already-stopped worker) is a no-op.
	pub async fn stop(&mut self) {
		if let Some(tx) = self.stop_tx.take() {
			let _ = tx.send(());
		}
		if let Some(handle) = self.handle.take() {
			debug!(worker = self.name, "awaiting worker exit");
			let _ = handle.await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[tokio::test]
	async fn runs_immediately_on_start() {
		let count = Arc::new(AtomicUsize::new(0));
		let c = count.clone();
		let mut w = Worker::spawn("test", Duration::from_secs(60), move || {
			let c = c.clone();
			async move {
				c.fetch_add(1, Ordering::SeqCst);
			}
		});
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert_eq!(count.load(Ordering::SeqCst), 1);
		w.stop().await;
	}

	#[tokio::test]
	async fn stop_is_idempotent() {
		let mut w = Worker::spawn("test", Duration::from_secs(60), || async {});
		w.stop().await;
		w.stop().await;
	}
}
