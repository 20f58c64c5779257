#![deny(rust_2018_idioms)]

//! Alert-suppression core for an alert-history service: a time-bounded,
//! label-matcher silence registry plus a rule-driven inhibition engine
//! that mutes target alerts while matching source alerts are firing.

mod alert;
pub mod error;
pub mod inhibition;
mod matcher;
pub mod metrics;
pub mod silence;
mod worker;

pub use alert::{Alert, AlertStatus};
pub use error::{ConfigError, Error, ParseError, Result, ValidationError};
pub use inhibition::cache::{ActiveAlertCache, ActiveAlertCacheConfig};
pub use inhibition::matcher::{FiringAlertSource, InhibitionMatcher};
pub use inhibition::parser::parse_rules;
pub use inhibition::state::{InhibitionStateConfig, InhibitionStateManager};
pub use inhibition::store::{DistributedStore, InMemoryStore};
pub use inhibition::{CompiledPattern, InhibitionRule, InhibitionState, MatchResult};
pub use matcher::{is_valid_label_name, matches_labels, validate_label_name, MatchType, Matcher};
pub use silence::cache::{CacheStats, SilenceCache};
pub use silence::config::SilenceManagerConfig;
pub use silence::manager::{SilenceManager, SilenceResult};
pub use silence::repository::{
	InMemorySilenceRepository, SilenceFilter, SilenceRepository, SilenceStats,
};
pub use silence::{MatcherSpec, Silence, SilenceStatus};

#[cfg(feature = "redis-store")]
pub use inhibition::store::RedisStore;
