use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Firing/resolved state of an [`Alert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
	Firing,
	Resolved,
}

/// An alert instance flowing through the pipeline.
///
/// This is the shared shape consumed by both the silence manager
/// (`IsAlertSilenced`) and the inhibition engine (`ShouldInhibit`) — both
/// only ever need the label map, but the richer shape is what the active
/// alert cache stores and what `AddFiringAlert` accepts, so one type
/// serves both call sites rather than converting back and forth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
	/// Stable, hash-derived identifier for this alert instance.
	pub fingerprint: String,

	pub labels: BTreeMap<String, String>,

	#[serde(default)]
	pub annotations: BTreeMap<String, String>,

	pub status: AlertStatus,

	pub starts_at: DateTime<Utc>,

	/// Unset or in the future while the alert is still firing.
	#[serde(default)]
	pub ends_at: Option<DateTime<Utc>>,
}

impl Alert {
	pub fn label(&self, name: &str) -> Option<&str> {
		self.labels.get(name).map(String::as_str)
	}

	pub fn is_firing(&self) -> bool {
		matches!(self.status, AlertStatus::Firing)
	}
}
