//! Silence data model.

pub mod cache;
pub mod config;
pub mod manager;
pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matcher::Matcher;

/// Derived status of a [`Silence`] at a point in time. Stored status may
/// lag real time (the GC worker transitions it); consumers of the cache
/// must treat `status` as authoritative rather than recomputing it ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilenceStatus {
	Pending,
	Active,
	Expired,
}

impl SilenceStatus {
	/// Compute status from `start`/`end` at observation time `now`.
	pub fn derive(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
		if now < start {
			SilenceStatus::Pending
		} else if now < end {
			SilenceStatus::Active
		} else {
			SilenceStatus::Expired
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			SilenceStatus::Pending => "pending",
			SilenceStatus::Active => "active",
			SilenceStatus::Expired => "expired",
		}
	}
}

/// A time-bounded, label-matcher–based suppression rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Silence {
	pub id: String,
	pub created_by: String,
	pub comment: String,
	pub starts_at: DateTime<Utc>,
	pub ends_at: DateTime<Utc>,
	#[serde(skip, default)]
	matchers_compiled: Vec<CompiledMatcher>,
	pub matchers: Vec<MatcherSpec>,
	pub status: SilenceStatus,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// The serializable form of a [`Matcher`] — [`Matcher`] itself carries a
/// compiled regex that is not (and should not be) serialized; repositories
/// persist this shape and we recompile on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherSpec {
	pub name: String,
	pub value: String,
	pub match_type: crate::matcher::MatchType,
}

#[derive(Debug, Clone)]
struct CompiledMatcher(Matcher);

impl Silence {
	/// Build a new silence, validating and compiling its matcher set.
	/// `end` strictly greater than `start` and a non-empty matcher set are
	/// both enforced.
	pub fn new(
		created_by: impl Into<String>,
		comment: impl Into<String>,
		starts_at: DateTime<Utc>,
		ends_at: DateTime<Utc>,
		matchers: Vec<MatcherSpec>,
		now: DateTime<Utc>,
	) -> crate::error::Result<Self> {
		if ends_at <= starts_at {
			return Err(crate::error::Error::InvalidSilence(
				"end must be strictly after start".into(),
			));
		}
		if matchers.is_empty() {
			return Err(crate::error::Error::InvalidSilence(
				"matcher set must not be empty".into(),
			));
		}
		let compiled = compile(&matchers)?;
		let status = SilenceStatus::derive(starts_at, ends_at, now);
		Ok(Self {
			id: Uuid::new_v4().to_string(),
			created_by: created_by.into(),
			comment: comment.into(),
			starts_at,
			ends_at,
			matchers_compiled: compiled,
			matchers,
			status,
			created_at: now,
			updated_at: now,
		})
	}

	/// Recompile the matcher set after deserialization from a repository.
	/// Repositories hand back [`MatcherSpec`]s without a compiled regex;
	/// this must be called before [`Silence::matches`] is usable.
	pub fn recompile(&mut self) -> crate::error::Result<()> {
		self.matchers_compiled = compile(&self.matchers)?;
		Ok(())
	}

	pub fn matches(&self, labels: &std::collections::BTreeMap<String, String>) -> bool {
		let matchers: Vec<Matcher> = self.matchers_compiled.iter().map(|c| c.0.clone()).collect();
		crate::matcher::matches_labels(&matchers, labels)
	}

	pub fn refresh_status(&mut self, now: DateTime<Utc>) {
		self.status = SilenceStatus::derive(self.starts_at, self.ends_at, now);
	}
}

fn compile(specs: &[MatcherSpec]) -> crate::error::Result<Vec<CompiledMatcher>> {
	specs
		.iter()
		.map(|s| Matcher::new(&s.name, &s.value, s.match_type).map(CompiledMatcher))
		.collect()
}
