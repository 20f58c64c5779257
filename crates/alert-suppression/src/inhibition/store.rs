//! L2 distributed key/value store contract. All methods may fail;
//! callers treat failure as an availability issue, never a hard error —
//! see the best-effort write patterns in [`super::cache`] and
//! [`super::state`].

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

/// Collaborator contract for the L2 tier. Implementors need not be
/// consistent or durable; the system above them tolerates total absence.
#[async_trait]
pub trait DistributedStore: Send + Sync {
	async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
	async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;
	async fn delete(&self, key: &str) -> anyhow::Result<()>;
	async fn sadd(&self, key: &str, member: &str) -> anyhow::Result<()>;
	async fn srem(&self, key: &str, member: &str) -> anyhow::Result<()>;
	async fn smembers(&self, key: &str) -> anyhow::Result<Vec<String>>;
	async fn scard(&self, key: &str) -> anyhow::Result<usize>;
	async fn ping(&self) -> anyhow::Result<()>;
}

struct Entry {
	value: String,
	expires_at: Option<std::time::Instant>,
}

/// In-memory stand-in for a real distributed store, used in tests and by
/// embedders that run without Redis. TTLs are honored lazily on read.
#[derive(Default)]
pub struct InMemoryStore {
	values: Mutex<HashMap<String, Entry>>,
	sets: Mutex<HashMap<String, HashSet<String>>>,
}

impl InMemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn is_live(entry: &Entry) -> bool {
		match entry.expires_at {
			Some(at) => std::time::Instant::now() < at,
			None => true,
		}
	}
}

#[async_trait]
impl DistributedStore for InMemoryStore {
	async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
		let mut values = self.values.lock().expect("lock poisoned");
		match values.get(key) {
			Some(entry) if Self::is_live(entry) => Ok(Some(entry.value.clone())),
			Some(_) => {
				values.remove(key);
				Ok(None)
			}
			None => Ok(None),
		}
	}

	async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
		let expires_at = if ttl.is_zero() { None } else { Some(std::time::Instant::now() + ttl) };
		self.values
			.lock()
			.expect("lock poisoned")
			.insert(key.to_string(), Entry { value: value.to_string(), expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> anyhow::Result<()> {
		self.values.lock().expect("lock poisoned").remove(key);
		Ok(())
	}

	async fn sadd(&self, key: &str, member: &str) -> anyhow::Result<()> {
		self.sets
			.lock()
			.expect("lock poisoned")
			.entry(key.to_string())
			.or_default()
			.insert(member.to_string());
		Ok(())
	}

	async fn srem(&self, key: &str, member: &str) -> anyhow::Result<()> {
		if let Some(set) = self.sets.lock().expect("lock poisoned").get_mut(key) {
			set.remove(member);
		}
		Ok(())
	}

	async fn smembers(&self, key: &str) -> anyhow::Result<Vec<String>> {
		Ok(self
			.sets
			.lock()
			.expect("lock poisoned")
			.get(key)
			.map(|s| s.iter().cloned().collect())
			.unwrap_or_default())
	}

	async fn scard(&self, key: &str) -> anyhow::Result<usize> {
		Ok(self.sets.lock().expect("lock poisoned").get(key).map(HashSet::len).unwrap_or(0))
	}

	async fn ping(&self) -> anyhow::Result<()> {
		Ok(())
	}
}

#[cfg(feature = "redis-store")]
pub use redis_impl::RedisStore;

#[cfg(feature = "redis-store")]
mod redis_impl {
	use super::DistributedStore;
	use async_trait::async_trait;
	use redis::aio::ConnectionManager;
	use redis::AsyncCommands;
	use std::time::Duration;

	/// Redis-backed implementation, used in production deployments that
	/// run more than one replica and need a shared L2 tier.
	pub struct RedisStore {
		conn: ConnectionManager,
	}

	impl RedisStore {
		pub async fn connect(url: &str) -> anyhow::Result<Self> {
			let client = redis::Client::open(url)?;
			let conn = client.get_connection_manager().await?;
			Ok(Self { conn })
		}
	}

	#[async_trait]
	impl DistributedStore for RedisStore {
		async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
			let mut conn = self.conn.clone();
			Ok(conn.get(key).await?)
		}

		async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
			let mut conn = self.conn.clone();
			if ttl.is_zero() {
				conn.set::<_, _, ()>(key, value).await?;
			} else {
				conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
			}
			Ok(())
		}

		async fn delete(&self, key: &str) -> anyhow::Result<()> {
			let mut conn = self.conn.clone();
			conn.del::<_, ()>(key).await?;
			Ok(())
		}

		async fn sadd(&self, key: &str, member: &str) -> anyhow::Result<()> {
			let mut conn = self.conn.clone();
			conn.sadd::<_, _, ()>(key, member).await?;
			Ok(())
		}

		async fn srem(&self, key: &str, member: &str) -> anyhow::Result<()> {
			let mut conn = self.conn.clone();
			conn.srem::<_, _, ()>(key, member).await?;
			Ok(())
		}

		async fn smembers(&self, key: &str) -> anyhow::Result<Vec<String>> {
			let mut conn = self.conn.clone();
			Ok(conn.smembers(key).await?)
		}

		async fn scard(&self, key: &str) -> anyhow::Result<usize> {
			let mut conn = self.conn.clone();
			Ok(conn.scard(key).await?)
		}

		async fn ping(&self) -> anyhow::Result<()> {
			let mut conn = self.conn.clone();
			let _: String = redis::cmd("PING").query_async(&mut conn).await?;
			Ok(())
		}
	}
}
