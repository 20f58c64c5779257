use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the silence manager and inhibition engine.
///
/// Variants are named and comparable (via [`Error::kind`]) because callers
/// are expected to branch on error kind, not just display it — e.g. a
/// caller of `update_silence` needs to tell `SilenceConflict` apart from a
/// generic repository failure. Errors that the design says must never
/// surface to a caller (cache faults, L2 failures) are not represented
/// here at all: they are logged and swallowed at the boundary that owns
/// the fail-safe policy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	// -- lifecycle --
	#[error("silence manager has not been started")]
	ManagerNotStarted,

	#[error("silence manager is shutting down or has shut down")]
	ManagerShutdown,

	#[error("silence manager is already started")]
	AlreadyStarted,

	#[error("initial sync failed: {0}")]
	InitialSyncFailed(#[source] Box<Error>),

	// -- input validation --
	#[error("invalid alert: {0}")]
	InvalidAlert(String),

	#[error("invalid silence: {0}")]
	InvalidSilence(String),

	#[error("invalid uuid: {0}")]
	InvalidUuid(String),

	#[error("invalid filter: {0}")]
	InvalidFilter(String),

	#[error("invalid label name {name:?}: must match [A-Za-z_][A-Za-z0-9_]*")]
	InvalidLabelName { name: String },

	#[error("invalid regex {pattern:?}: {cause}")]
	InvalidRegex { pattern: String, cause: String },

	// -- storage --
	#[error("silence {id} not found")]
	SilenceNotFound { id: String },

	#[error("silence {id} was concurrently modified")]
	SilenceConflict { id: String },

	#[error("repository error during {operation}: {cause}")]
	Repository {
		operation: &'static str,
		#[source]
		cause: Box<dyn std::error::Error + Send + Sync>,
	},

	// -- inhibition rule parser --
	#[error("{0}")]
	Parse(#[from] ParseError),

	#[error("{0}")]
	Validation(#[from] ValidationError),

	#[error("{0}")]
	Config(#[from] ConfigError),
}

impl Error {
	/// A `Debug`-free, stable tag for the error's category, for metrics
	/// labels (`silence_manager_errors_total{type}`) and log fields.
	pub fn kind(&self) -> &'static str {
		match self {
			Error::ManagerNotStarted => "manager_not_started",
			Error::ManagerShutdown => "manager_shutdown",
			Error::AlreadyStarted => "already_started",
			Error::InitialSyncFailed(_) => "initial_sync_failed",
			Error::InvalidAlert(_) => "invalid_alert",
			Error::InvalidSilence(_) => "invalid_silence",
			Error::InvalidUuid(_) => "invalid_uuid",
			Error::InvalidFilter(_) => "invalid_filter",
			Error::InvalidLabelName { .. } => "invalid_label_name",
			Error::InvalidRegex { .. } => "invalid_regex",
			Error::SilenceNotFound { .. } => "silence_not_found",
			Error::SilenceConflict { .. } => "silence_conflict",
			Error::Repository { .. } => "repository",
			Error::Parse(_) => "parse_error",
			Error::Validation(_) => "validation_error",
			Error::Config(_) => "config_error",
		}
	}
}

/// A single failure during YAML deserialization or regex compilation of an
/// inhibition rule file.
#[derive(Debug, thiserror::Error)]
#[error("parse error in field {field:?} (value {value:?}): {cause}")]
pub struct ParseError {
	pub field: String,
	pub value: String,
	pub cause: String,
}

/// A single-field semantic validation failure for one rule.
#[derive(Debug, thiserror::Error)]
#[error("validation error in rule {rule:?}, field {field:?}: {message}")]
pub struct ValidationError {
	pub rule: String,
	pub field: String,
	pub message: String,
}

/// An aggregate configuration failure: an empty rule list, or one or more
/// [`ValidationError`]s joined together. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub struct ConfigError {
	pub message: String,
	pub children: Vec<ValidationError>,
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.message)?;
		for child in &self.children {
			write!(f, "\n  - {child}")?;
		}
		Ok(())
	}
}
