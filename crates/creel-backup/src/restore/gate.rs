//! Confirmation gate in front of every destructive restore

use camino::Utf8PathBuf;

use crate::document::BackupSummary;
use crate::error::Result;

/// What the operator is shown before anything is touched
#[derive(Debug, Clone)]
pub struct RestorePreview {
    pub backup_name: String,
    pub path: Utf8PathBuf,
    pub summary: BackupSummary,
    /// Tables in restore order with the rows each will receive
    pub tables: Vec<PreviewTable>,
    /// Buckets listed in the document; never rewritten
    pub buckets: Vec<String>,
    /// Advisory findings from verification
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewTable {
    pub name: String,
    pub rows: u64,
    /// Set when the table will be skipped, with the reason
    pub skip_reason: Option<String>,
}

/// Source of the operator's answers
pub trait ConfirmationGate {
    /// Explicit yes/no on the restore as previewed
    fn confirm(&mut self, preview: &RestorePreview) -> Result<bool>;

    /// Second, louder confirmation required when restoring a document that
    /// failed its consistency check
    fn confirm_override(&mut self, backup_name: &str, problems: &[String]) -> Result<bool>;
}

/// Gate with predetermined answers, for tests and scripted use
#[derive(Debug, Clone, Default)]
pub struct FixedAnswers {
    pub confirm: bool,
    pub confirm_override: bool,
    /// How many times each question was asked
    pub confirm_asked: usize,
    pub override_asked: usize,
}

impl FixedAnswers {
    pub fn yes() -> Self {
        Self {
            confirm: true,
            confirm_override: true,
            ..Self::default()
        }
    }

    pub fn no() -> Self {
        Self::default()
    }
}

impl ConfirmationGate for FixedAnswers {
    fn confirm(&mut self, _preview: &RestorePreview) -> Result<bool> {
        self.confirm_asked += 1;
        Ok(self.confirm)
    }

    fn confirm_override(&mut self, _backup_name: &str, _problems: &[String]) -> Result<bool> {
        self.override_asked += 1;
        Ok(self.confirm_override)
    }
}
