//! Inhibition matcher: evaluates target alerts against a compiled rule
//! set, backed by a source of currently-firing alerts.

use std::time::Instant;

use async_trait::async_trait;

use super::{InhibitionRule, MatchResult};
use crate::alert::Alert;

/// Supplies the currently-firing alert set that candidate sources are
/// drawn from. Implemented by [`super::cache::ActiveAlertCache`]; kept as
/// a trait so the matcher can be exercised without a live cache.
#[async_trait]
pub trait FiringAlertSource: Send + Sync {
	async fn get_firing_alerts(&self) -> Vec<Alert>;
}

pub struct InhibitionMatcher {
	rules: Vec<InhibitionRule>,
}

impl InhibitionMatcher {
	pub fn new(rules: Vec<InhibitionRule>) -> Self {
		Self { rules }
	}

	pub fn rules(&self) -> &[InhibitionRule] {
		&self.rules
	}

	/// First matching rule wins; returns as soon as a candidate source
	/// satisfies `match_rule`.
	pub async fn should_inhibit(&self, source: &dyn FiringAlertSource, target: &Alert) -> MatchResult {
		let start = Instant::now();
		let firing = source.get_firing_alerts().await;
		if firing.is_empty() {
			return MatchResult::none(start.elapsed());
		}

		for rule in &self.rules {
			for candidate in candidates(rule, &firing, target) {
				if match_rule(rule, candidate, target) {
					return MatchResult {
						matched: true,
						inhibitor_fp: Some(candidate.fingerprint.clone()),
						rule_name: Some(rule.name.clone()),
						elapsed: start.elapsed(),
					};
				}
			}
		}

		MatchResult::none(start.elapsed())
	}

	/// Same evaluation, but collects every match across every rule
	/// instead of stopping at the first. Order follows rule order.
	pub async fn find_inhibitors(&self, source: &dyn FiringAlertSource, target: &Alert) -> Vec<MatchResult> {
		let start = Instant::now();
		let firing = source.get_firing_alerts().await;
		if firing.is_empty() {
			return Vec::new();
		}

		let mut results = Vec::new();
		for rule in &self.rules {
			for candidate in candidates(rule, &firing, target) {
				if match_rule(rule, candidate, target) {
					results.push(MatchResult {
						matched: true,
						inhibitor_fp: Some(candidate.fingerprint.clone()),
						rule_name: Some(rule.name.clone()),
						elapsed: start.elapsed(),
					});
				}
			}
		}
		results
	}
}

/// The candidate source set for one rule: every firing alert except the
/// target itself, pre-filtered on `alertname` when the rule's
/// `source_match` names it — this is the hot-path optimization, since
/// most rules pin `alertname` and it avoids evaluating the full predicate
/// conjunction against alerts that could never match.
fn candidates<'a>(rule: &InhibitionRule, firing: &'a [Alert], target: &Alert) -> Vec<&'a Alert> {
	let alertname_pin = rule.source_match.get("alertname");
	firing
		.iter()
		.filter(|a| a.fingerprint != target.fingerprint)
		.filter(|a| match alertname_pin {
			Some(expected) => a.label("alertname") == Some(expected.as_str()),
			None => true,
		})
		.collect()
}

/// Conjunction of five predicates, short-circuiting on the first failure.
fn match_rule(rule: &InhibitionRule, source: &Alert, target: &Alert) -> bool {
	rule.source_match.iter().all(|(k, v)| source.label(k) == Some(v.as_str()))
		&& rule
			.source_match_re
			.iter()
			.all(|(k, pattern)| source.label(k).is_some_and(|v| pattern.regex.is_match(v)))
		&& rule.target_match.iter().all(|(k, v)| target.label(k) == Some(v.as_str()))
		&& rule
			.target_match_re
			.iter()
			.all(|(k, pattern)| target.label(k).is_some_and(|v| pattern.regex.is_match(v)))
		&& rule.equal.iter().all(|k| match (source.label(k), target.label(k)) {
			(Some(a), Some(b)) => a == b,
			_ => false,
		})
}
