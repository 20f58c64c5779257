//! Inhibition data model: rules, live inhibition state, and match results.

pub mod cache;
pub mod matcher;
pub mod parser;
pub mod state;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A compiled, immutable inhibition rule: mutes *target* alerts while a
/// matching *source* alert is firing.
#[derive(Debug, Clone)]
pub struct InhibitionRule {
	pub name: String,
	pub source_match: HashMap<String, String>,
	pub source_match_re: HashMap<String, CompiledPattern>,
	pub target_match: HashMap<String, String>,
	pub target_match_re: HashMap<String, CompiledPattern>,
	pub equal: Vec<String>,
}

/// A regex pattern kept alongside its textual source, so the rule can be
/// displayed or re-serialized without losing the original form.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
	pub pattern: String,
	pub regex: Arc<Regex>,
}

/// A live inhibition decision, keyed externally by `target_fp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InhibitionState {
	pub target_fp: String,
	pub source_fp: String,
	pub rule_name: String,
	pub effective_at: DateTime<Utc>,
	/// `None` means "until the source alert resolves" rather than a
	/// fixed wall-clock deadline.
	pub expires_at: Option<DateTime<Utc>>,
}

impl InhibitionState {
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		matches!(self.expires_at, Some(exp) if exp <= now)
	}
}

/// Result of evaluating one target alert against the rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
	pub matched: bool,
	pub inhibitor_fp: Option<String>,
	pub rule_name: Option<String>,
	pub elapsed: Duration,
}

impl MatchResult {
	pub fn none(elapsed: Duration) -> Self {
		Self { matched: false, inhibitor_fp: None, rule_name: None, elapsed }
	}
}
