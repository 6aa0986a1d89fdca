//! Pipeline error taxonomy

use camino::Utf8PathBuf;
use thiserror::Error;

/// Result type alias using [`BackupError`]
pub type Result<T> = std::result::Result<T, BackupError>;

/// Whole-run errors raised by the producer, verifier, restore executor and
/// retention manager. Per-table and per-bucket failures are never raised;
/// they are recorded in the document or in the restore report.
#[derive(Error, Debug)]
pub enum BackupError {
    /// The relational or object store cannot be reached at all
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The document cannot be parsed or lacks a required section
    #[error("Backup document {path} is malformed: {reason}")]
    DocumentMalformed { path: Utf8PathBuf, reason: String },

    /// Recomputed totals disagree with the stored summary
    #[error("Backup {name} failed its consistency check: {}", .details.join("; "))]
    ConsistencyMismatch { name: String, details: Vec<String> },

    /// Some tables failed during backup
    #[error("Backup {name} is partial, these tables failed to back up: {}", .tables.join(", "))]
    PartialBackup { name: String, tables: Vec<String> },

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Backup name {name} exists in several tiers: {}", .candidates.join(", "))]
    AmbiguousBackup {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Backup already exists: {0}")]
    AlreadyExists(Utf8PathBuf),

    #[error("Lock {0} is held by another creel process")]
    LockHeld(Utf8PathBuf),

    #[error("Invalid backup name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Backup {0} contains no tables")]
    EmptyDocument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackupError {
    pub fn malformed(path: impl Into<Utf8PathBuf>, reason: impl Into<String>) -> Self {
        Self::DocumentMalformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
