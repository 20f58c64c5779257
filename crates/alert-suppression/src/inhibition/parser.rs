//! Inhibition rule parser: Alertmanager-compatible `inhibit_rules` YAML,
//! deserialized, defaulted, validated, and regex-compiled into
//! [`InhibitionRule`]s.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;

use super::{CompiledPattern, InhibitionRule};
use crate::error::{ConfigError, Error, ParseError, Result, ValidationError};
use crate::matcher::is_valid_label_name;

#[derive(Debug, Deserialize)]
struct RawConfig {
	#[serde(default)]
	inhibit_rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
	name: Option<String>,
	#[serde(default)]
	source_match: HashMap<String, String>,
	#[serde(default)]
	source_match_re: HashMap<String, String>,
	#[serde(default)]
	target_match: HashMap<String, String>,
	#[serde(default)]
	target_match_re: HashMap<String, String>,
	#[serde(default)]
	equal: Vec<String>,
}

/// Parse a YAML document into a validated, compiled rule set.
///
/// Pipeline: deserialize -> apply defaults (auto-name absent rules,
/// normalize empty maps) -> structural validation -> compile every regex
/// -> semantic validation (at least one source and one target predicate,
/// every label name valid). A regex fails to compile or a semantic rule
/// is violated -> the whole document is rejected; partial rule sets are
/// never returned.
pub fn parse_rules(yaml: &str) -> Result<Vec<InhibitionRule>> {
	let raw: RawConfig = serde_yaml::from_str(yaml).map_err(|e| {
		Error::Parse(ParseError {
			field: "inhibit_rules".to_string(),
			value: String::new(),
			cause: e.to_string(),
		})
	})?;

	if raw.inhibit_rules.is_empty() {
		return Err(Error::Config(ConfigError {
			message: "inhibit_rules must contain at least one rule".to_string(),
			children: Vec::new(),
		}));
	}

	let mut rules = Vec::with_capacity(raw.inhibit_rules.len());
	let mut problems = Vec::new();

	for (index, raw_rule) in raw.inhibit_rules.into_iter().enumerate() {
		match compile_rule(index, raw_rule) {
			Ok(rule) => rules.push(rule),
			Err(Error::Validation(v)) => problems.push(v),
			Err(other) => return Err(other),
		}
	}

	if !problems.is_empty() {
		return Err(Error::Config(ConfigError {
			message: format!("{} inhibition rule(s) failed validation", problems.len()),
			children: problems,
		}));
	}

	Ok(rules)
}

fn compile_rule(index: usize, raw: RawRule) -> Result<InhibitionRule> {
	let name = raw.name.unwrap_or_else(|| format!("rule-{index}"));

	for label in raw
		.source_match
		.keys()
		.chain(raw.source_match_re.keys())
		.chain(raw.target_match.keys())
		.chain(raw.target_match_re.keys())
		.chain(raw.equal.iter())
	{
		if !is_valid_label_name(label) {
			return Err(Error::Validation(ValidationError {
				rule: name.clone(),
				field: "label_name".to_string(),
				message: format!("invalid label name {label:?}"),
			}));
		}
	}

	let source_match_re = compile_patterns(&name, "source_match_re", raw.source_match_re)?;
	let target_match_re = compile_patterns(&name, "target_match_re", raw.target_match_re)?;

	if raw.source_match.is_empty() && source_match_re.is_empty() {
		return Err(Error::Validation(ValidationError {
			rule: name.clone(),
			field: "source_match".to_string(),
			message: "rule must define at least one source predicate".to_string(),
		}));
	}
	if raw.target_match.is_empty() && target_match_re.is_empty() {
		return Err(Error::Validation(ValidationError {
			rule: name.clone(),
			field: "target_match".to_string(),
			message: "rule must define at least one target predicate".to_string(),
		}));
	}

	Ok(InhibitionRule {
		name,
		source_match: raw.source_match,
		source_match_re,
		target_match: raw.target_match,
		target_match_re,
		equal: raw.equal,
	})
}

fn compile_patterns(
	rule: &str,
	field: &'static str,
	raw: HashMap<String, String>,
) -> Result<HashMap<String, CompiledPattern>> {
	raw.into_iter()
		.map(|(label, pattern)| {
			let anchored = format!("^(?:{pattern})$");
			Regex::new(&anchored)
				.map(|regex| (label, CompiledPattern { pattern: pattern.clone(), regex: Arc::new(regex) }))
				.map_err(|e| {
					Error::Parse(ParseError {
						field: format!("{field}.{rule}"),
						value: pattern.clone(),
						cause: e.to_string(),
					})
				})
		})
		.collect()
}
