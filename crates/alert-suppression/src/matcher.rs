//! Label matching: a pure function evaluating a matcher set
//! against an alert's label mapping. Shared by the silence cache's
//! per-silence evaluation and the inhibition rule parser/matcher's label
//! name validation.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `[A-Za-z_][A-Za-z0-9_]*`, checked without pulling in a second regex
/// compile per call: a hand-rolled scan is cheap and this runs on every
/// label name at silence-creation and rule-parse time.
pub fn is_valid_label_name(name: &str) -> bool {
	let mut chars = name.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_label_name(name: &str) -> Result<()> {
	if is_valid_label_name(name) {
		Ok(())
	} else {
		Err(Error::InvalidLabelName {
			name: name.to_string(),
		})
	}
}

/// Match-type of a single [`Matcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
	#[serde(rename = "=")]
	Equal,
	#[serde(rename = "!=")]
	NotEqual,
	#[serde(rename = "=~")]
	Regex,
	#[serde(rename = "!~")]
	NotRegex,
}

/// A single label-name / value / match-type triple.
///
/// Regex matchers are pre-compiled at construction (`Matcher::new`) and
/// stored anchored for full-string semantics, so
/// evaluation never recompiles or partially matches.
#[derive(Debug, Clone)]
pub struct Matcher {
	pub name: String,
	pub value: String,
	pub match_type: MatchType,
	compiled: Option<Arc<Regex>>,
}

impl Matcher {
	pub fn new(name: impl Into<String>, value: impl Into<String>, match_type: MatchType) -> Result<Self> {
		let name = name.into();
		let value = value.into();
		validate_label_name(&name)?;

		let compiled = match match_type {
			MatchType::Regex | MatchType::NotRegex => {
				let anchored = anchor(&value);
				let re = Regex::new(&anchored).map_err(|e| Error::InvalidRegex {
					pattern: value.clone(),
					cause: e.to_string(),
				})?;
				Some(Arc::new(re))
			}
			MatchType::Equal | MatchType::NotEqual => None,
		};

		Ok(Self {
			name,
			value,
			match_type,
			compiled,
		})
	}

	/// Evaluate this single matcher against a label value that may be
	/// absent.
	fn matches(&self, present: Option<&str>) -> bool {
		match self.match_type {
			MatchType::Equal => match present {
				Some(v) => v == self.value,
				None => self.value.is_empty(),
			},
			MatchType::NotEqual => match present {
				Some(v) => v != self.value,
				None => true,
			},
			MatchType::Regex => {
				let hay = present.unwrap_or("");
				self.compiled.as_ref().expect("regex compiled").is_match(hay)
			}
			MatchType::NotRegex => {
				let hay = present.unwrap_or("");
				!self.compiled.as_ref().expect("regex compiled").is_match(hay)
			}
		}
	}
}

fn anchor(pattern: &str) -> String {
	if pattern.starts_with('^') && pattern.ends_with('$') {
		pattern.to_string()
	} else {
		format!("^(?:{pattern})$")
	}
}

/// Evaluate an entire matcher set against a label mapping. All matchers
/// must succeed (AND); an empty set always fails, because a silence that
/// selects nothing is not allowed to exist.
pub fn matches_labels(matchers: &[Matcher], labels: &BTreeMap<String, String>) -> bool {
	if matchers.is_empty() {
		return false;
	}
	matchers
		.iter()
		.all(|m| m.matches(labels.get(&m.name).map(String::as_str)))
}
