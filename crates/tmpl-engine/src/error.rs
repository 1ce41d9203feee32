//! Error types for the template engine
//!
//! Every variant carries enough structure (field paths, versions, record
//! identities) for a caller to correct its input without a human.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tmpl_sandbox::ExecutionError;
use tmpl_schema::ValidationErrors;
use tmpl_store::{RecordId, StoreError, TemplateId};

/// Write rejected because the writer has not seen the latest state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleWrite {
    /// Template the write targeted
    pub template_id: TemplateId,
    /// Last successful write
    pub last_modified_at: DateTime<Utc>,
    /// Last read for editing, if any since that write
    pub last_read_at: Option<DateTime<Utc>>,
}

impl fmt::Display for StaleWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "template {} was modified at {} but ",
            self.template_id,
            self.last_modified_at.to_rfc3339()
        )?;
        match self.last_read_at {
            Some(read) => write!(f, "last read at {}", read.to_rfc3339())?,
            None => f.write_str("has not been read since")?,
        }
        f.write_str("; re-read the template before retrying")
    }
}

/// Why one record failed a migration dry run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureReason {
    /// Snippet misbehaved on this record
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Snippet output does not fit the proposed fields
    #[error("output does not fit the new fields: {0}")]
    Validation(ValidationErrors),
}

/// One record that would not migrate
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    /// Record identifier
    pub record_id: RecordId,
    /// Record display name
    pub record_name: String,
    /// What went wrong
    pub reason: FailureReason,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.record_name, self.record_id, self.reason)
    }
}

/// Migration chain resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// No migration starts at `from_version`
    #[error("no migration from version {from_version} to {}", .from_version + 1)]
    MissingMigration {
        /// Version nothing migrates away from
        from_version: u32,
    },

    /// Stored migration does not advance exactly one version
    #[error("migration from version {from_version} targets version {to_version}, expected {}", .from_version + 1)]
    MisnumberedMigration {
        /// Version the migration starts at
        from_version: u32,
        /// Version it claims to reach
        to_version: u32,
    },

    /// A step's snippet failed
    #[error("migration from version {from_version} failed: {source}")]
    Execution {
        /// Version of the failing step's input
        from_version: u32,
        /// Executor failure
        source: ExecutionError,
    },

    /// Migrated data does not fit the target version
    #[error("migrated data does not fit version {version}: {errors}")]
    Validation {
        /// Target version
        version: u32,
        /// Field-level errors
        errors: ValidationErrors,
    },

    /// Target version has no snapshot
    #[error("no snapshot for version {version}")]
    SnapshotNotFound {
        /// Missing version
        version: u32,
    },

    /// Storage failure while loading migrations
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ChainError {
    /// Version at which the chain stopped
    #[must_use]
    pub fn failed_at_version(&self) -> Option<u32> {
        match self {
            Self::MissingMigration { from_version }
            | Self::MisnumberedMigration { from_version, .. }
            | Self::Execution { from_version, .. } => Some(*from_version),
            Self::Validation { version, .. } | Self::SnapshotNotFound { version } => Some(*version),
            Self::Store(_) => None,
        }
    }

    /// Field errors, when the failure was validation
    #[must_use]
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Data does not match a schema
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Field schema itself is malformed
    #[error("invalid schema: {0}")]
    InvalidSchema(ValidationErrors),

    /// Concurrency guard tripped
    #[error("stale write: {0}")]
    StaleWrite(StaleWrite),

    /// Chain resolution failed
    #[error("migration chain failed: {0}")]
    Chain(#[from] ChainError),

    /// Dry run failed for at least one record; nothing was written
    #[error("migration rejected: {} record(s) failed", .failures.len())]
    MigrationRejected {
        /// Every failing record
        failures: Vec<RecordFailure>,
    },

    /// Snippet does not parse
    #[error("invalid transform: {message}")]
    InvalidTransform {
        /// Parser message
        message: String,
    },

    /// Commit requested with nothing staged
    #[error("template {0} has no pending change")]
    NoPendingChange(TemplateId),

    /// Unknown template
    #[error("template not found: {0}")]
    TemplateNotFound(TemplateId),

    /// Unknown record
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    /// Storage failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Check if the caller can fix the problem by changing its input
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Store(_) | Self::Chain(ChainError::Store(_)) | Self::Config(_)
        )
    }

    /// Check if the caller must re-read the template before retrying
    #[inline]
    #[must_use]
    pub fn requires_reread(&self) -> bool {
        matches!(self, Self::StaleWrite(_))
    }

    /// Failing records, for a rejected migration
    #[must_use]
    pub fn failures(&self) -> &[RecordFailure] {
        match self {
            Self::MigrationRejected { failures } => failures,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn missing_migration_names_the_gap() {
        let err = ChainError::MissingMigration { from_version: 3 };
        assert_eq!(err.to_string(), "no migration from version 3 to 4");
        assert_eq!(err.failed_at_version(), Some(3));
    }

    #[test]
    fn stale_write_tells_caller_to_reread() {
        let stale = StaleWrite {
            template_id: TemplateId::new(),
            last_modified_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            last_read_at: None,
        };
        let err = EngineError::StaleWrite(stale);
        assert!(err.requires_reread());
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("re-read"));
    }

    #[test]
    fn store_errors_are_not_recoverable() {
        let err = EngineError::from(StoreError::Conflict("duplicate".to_string()));
        assert!(!err.is_recoverable());
        assert!(!err.requires_reread());
    }

    #[test]
    fn rejected_migration_lists_failures() {
        let err = EngineError::MigrationRejected {
            failures: vec![RecordFailure {
                record_id: RecordId::new(),
                record_name: "intro".to_string(),
                reason: FailureReason::Execution(ExecutionError::Timeout { limit_ms: 10 }),
            }],
        };
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.to_string(), "migration rejected: 1 record(s) failed");
        assert!(err.failures()[0].to_string().starts_with("intro ("));
    }
}
