//! Restore executor
//!
//! Stages:
//! 1. Preflight: resolve, parse and deep-verify the document, apply the
//!    consistency and partial-backup policies, check the store, take the
//!    restore lock
//! 2. Confirmation: show the preview and wait for an explicit yes
//! 3. Restore: one table transaction per table, in document order
//! 4. Report: per-table outcomes plus storage notices
//!
//! ```text
//! Idle -> AwaitingConfirmation -> Aborted
//!                              -> Restoring -> Completed(report)
//! ```

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use creel_core::retry::RetryPolicy;
use creel_store::TableStore;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

pub mod gate;
pub mod transaction;

pub use gate::{ConfirmationGate, FixedAnswers, PreviewTable, RestorePreview};
pub use transaction::{TableChange, TableTransaction};

use crate::document::BackupDocument;
use crate::error::{BackupError, Result};
use crate::interrupt::InterruptFlag;
use crate::layout::BackupRepository;
use crate::lock::RunLock;
use crate::progress::PipelineProgress;
use crate::tier::Tier;
use crate::verifier::{inspect_file, VerificationReport};

/// Name of the lock serializing restores against one repository
pub const RESTORE_LOCK: &str = "restore";

/// Reason recorded for tables left untouched after an interrupt
pub const INTERRUPTED: &str = "interrupted";

/// Operator choices that relax the preflight policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Restore a document with errored tables, skipping those tables
    pub allow_partial: bool,
    /// Restore a document that failed its consistency check. Also requires
    /// the operator to confirm a second time.
    pub override_consistency: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreState {
    Idle,
    AwaitingConfirmation,
    Aborted,
    Restoring,
    Completed,
}

/// Outcome of restoring one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Success {
        rows: u64,
    },
    /// `rolled_back` is true when the table holds its pre-restore rows,
    /// either because it was never changed or because rollback succeeded
    Failed {
        error: String,
        rolled_back: bool,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

/// Storage is never rewritten; each bucket is reported for manual re-upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageNotice {
    pub bucket: String,
    pub files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub backup_name: String,
    pub path: Utf8PathBuf,
    pub tables: Vec<TableReport>,
    pub storage: Vec<StorageNotice>,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RestoreReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Success { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Skipped { .. }))
    }

    pub fn restored_records(&self) -> u64 {
        self.tables
            .iter()
            .map(|t| match t.outcome {
                TableOutcome::Success { rows } => rows,
                _ => 0,
            })
            .sum()
    }

    /// Every table succeeded or was skipped, and the run was not interrupted
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !self.interrupted
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| &t.outcome)
    }

    fn count(&self, pred: impl Fn(&TableOutcome) -> bool) -> usize {
        self.tables.iter().filter(|t| pred(&t.outcome)).count()
    }
}

/// Terminal result of a restore invocation
#[derive(Debug, Clone)]
pub enum RestoreResult {
    /// The operator declined; nothing was changed
    Aborted,
    Completed(RestoreReport),
}

/// A document that passed preflight, with the restore lock held
pub struct PreparedRestore {
    pub name: String,
    pub tier: Option<Tier>,
    pub path: Utf8PathBuf,
    pub document: BackupDocument,
    pub verification: VerificationReport,
    pub options: RestoreOptions,
    _lock: RunLock,
}

impl PreparedRestore {
    pub fn preview(&self) -> RestorePreview {
        let tables = self
            .document
            .tables
            .iter()
            .map(|(name, snapshot)| PreviewTable {
                name: name.to_string(),
                rows: snapshot.record_count(),
                skip_reason: snapshot
                    .error
                    .as_ref()
                    .map(|e| format!("backup recorded an error: {}", e)),
            })
            .collect();

        RestorePreview {
            backup_name: self.name.clone(),
            path: self.path.clone(),
            summary: self.document.summary.clone(),
            tables,
            buckets: self.document.storage.keys().map(str::to_string).collect(),
            notes: self.verification.notes.clone(),
        }
    }
}

/// Replaces table contents with a backup's snapshots
pub struct RestoreExecutor<'a> {
    store: &'a dyn TableStore,
    repository: &'a BackupRepository,
    retry: RetryPolicy,
    progress: PipelineProgress,
    state: RestoreState,
}

impl<'a> RestoreExecutor<'a> {
    pub fn new(store: &'a dyn TableStore, repository: &'a BackupRepository) -> Self {
        Self {
            store,
            repository,
            retry: RetryPolicy::default(),
            progress: PipelineProgress::hidden(),
            state: RestoreState::Idle,
        }
    }

    /// Retry policy for the pre-restore snapshot reads
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: PipelineProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> RestoreState {
        self.state
    }

    fn transition(&mut self, next: RestoreState) {
        debug!("Restore state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Load and check a document without touching the store's tables
    pub async fn prepare(
        &self,
        reference: &str,
        tier: Option<Tier>,
        options: RestoreOptions,
    ) -> Result<PreparedRestore> {
        info!("Stage 1/4: Preflight for {}", reference);
        let resolved = self.repository.resolve(reference, tier)?;

        let (verification, document) = inspect_file(&resolved.path);
        let Some(document) = document else {
            return Err(BackupError::malformed(
                resolved.path.clone(),
                verification
                    .error
                    .clone()
                    .unwrap_or_else(|| "unreadable document".to_string()),
            ));
        };
        let name = document.metadata.backup_name.clone();

        if document.tables.is_empty() {
            return Err(BackupError::EmptyDocument(name));
        }

        if verification.has_consistency_problems() {
            let details = verification.consistency_details();
            if options.override_consistency {
                warn!(
                    "Backup {} failed its consistency check, continuing under override: {}",
                    name,
                    details.join("; ")
                );
            } else {
                return Err(BackupError::ConsistencyMismatch { name, details });
            }
        }

        let errored = verification.errored_tables();
        if !errored.is_empty() {
            if options.allow_partial {
                warn!(
                    "Backup {} is partial, {} table(s) will be skipped",
                    name,
                    errored.len()
                );
            } else {
                return Err(BackupError::PartialBackup {
                    name,
                    tables: errored,
                });
            }
        }

        self.store
            .ping()
            .await
            .map_err(|e| BackupError::StoreUnavailable(e.to_string()))?;

        let lock = RunLock::try_acquire(&self.repository.lock_path(RESTORE_LOCK))?;
        debug!("Preflight passed for {}", resolved.path);

        Ok(PreparedRestore {
            name,
            tier: resolved.tier,
            path: resolved.path,
            document,
            verification,
            options,
            _lock: lock,
        })
    }

    /// Ask for confirmation, then restore every table
    pub async fn execute(
        &mut self,
        prepared: PreparedRestore,
        gate: &mut dyn ConfirmationGate,
        interrupt: &InterruptFlag,
    ) -> Result<RestoreResult> {
        self.transition(RestoreState::AwaitingConfirmation);
        info!("Stage 2/4: Awaiting confirmation for {}", prepared.name);

        if prepared.options.override_consistency
            && prepared.verification.has_consistency_problems()
        {
            let problems = prepared.verification.consistency_details();
            if !gate.confirm_override(&prepared.name, &problems)? {
                info!("Consistency override declined, nothing restored");
                self.transition(RestoreState::Aborted);
                return Ok(RestoreResult::Aborted);
            }
        }

        if !gate.confirm(&prepared.preview())? {
            info!("Restore declined, nothing restored");
            self.transition(RestoreState::Aborted);
            return Ok(RestoreResult::Aborted);
        }

        self.transition(RestoreState::Restoring);
        info!("Stage 3/4: Restoring {} tables", prepared.document.tables.len());

        let started_at = Utc::now();
        let start = Instant::now();
        self.progress.set_length(prepared.document.tables.len() as u64);

        let mut tables = Vec::with_capacity(prepared.document.tables.len());
        let mut interrupted = false;

        for (table, snapshot) in prepared.document.tables.iter() {
            self.progress.set_message(table);

            let outcome = if interrupted || interrupt.is_triggered() {
                interrupted = true;
                TableOutcome::Skipped {
                    reason: INTERRUPTED.to_string(),
                }
            } else {
                match snapshot.rows() {
                    None => TableOutcome::Skipped {
                        reason: format!(
                            "backup recorded an error: {}",
                            snapshot.error.as_deref().unwrap_or("no data")
                        ),
                    },
                    Some(rows) => self.restore_table(table, rows).await,
                }
            };

            match &outcome {
                TableOutcome::Success { rows } => info!("Table {}: restored {} rows", table, rows),
                TableOutcome::Failed { error, rolled_back } => warn!(
                    "Table {}: failed ({}), rolled back: {}",
                    table, error, rolled_back
                ),
                TableOutcome::Skipped { reason } => info!("Table {}: skipped ({})", table, reason),
            }
            self.progress.inc();

            tables.push(TableReport {
                table: table.to_string(),
                outcome,
            });
        }
        self.progress.finish();

        info!("Stage 4/4: Reporting");
        let storage = prepared
            .document
            .storage
            .iter()
            .map(|(bucket, snapshot)| StorageNotice {
                bucket: bucket.to_string(),
                files: snapshot.file_count(),
                error: snapshot.error.clone(),
            })
            .collect();

        let report = RestoreReport {
            backup_name: prepared.name.clone(),
            path: prepared.path.clone(),
            tables,
            storage,
            interrupted,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Restore of {} finished: {} succeeded, {} failed, {} skipped",
            report.backup_name,
            report.succeeded(),
            report.failed(),
            report.skipped()
        );
        self.transition(RestoreState::Completed);
        Ok(RestoreResult::Completed(report))
    }

    async fn restore_table(&self, table: &str, rows: &[creel_store::Row]) -> TableOutcome {
        let mut transaction = match TableTransaction::begin(self.store, table, &self.retry).await {
            Ok(tx) => tx,
            Err(e) => {
                return TableOutcome::Failed {
                    error: format!("pre-restore snapshot failed: {}", e),
                    rolled_back: true,
                }
            }
        };

        match transaction.replace(rows).await {
            Ok(inserted) => {
                transaction.commit();
                TableOutcome::Success { rows: inserted }
            }
            Err(e) => match transaction.rollback().await {
                Ok(()) => TableOutcome::Failed {
                    error: e.to_string(),
                    rolled_back: true,
                },
                Err(rollback_err) => TableOutcome::Failed {
                    error: format!("{}; rollback failed: {}", e, rollback_err),
                    rolled_back: false,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: Vec<TableOutcome>, interrupted: bool) -> RestoreReport {
        RestoreReport {
            backup_name: "b".into(),
            path: Utf8PathBuf::from("b.json"),
            tables: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| TableReport {
                    table: format!("t{}", i),
                    outcome,
                })
                .collect(),
            storage: Vec::new(),
            interrupted,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    #[test]
    fn test_success_allows_skips() {
        let r = report(
            vec![
                TableOutcome::Success { rows: 3 },
                TableOutcome::Skipped {
                    reason: "error".into(),
                },
            ],
            false,
        );
        assert!(r.is_success());
        assert_eq!(r.restored_records(), 3);
        assert_eq!((r.succeeded(), r.failed(), r.skipped()), (1, 0, 1));
    }

    #[test]
    fn test_failure_or_interrupt_is_not_success() {
        let failed = report(
            vec![TableOutcome::Failed {
                error: "boom".into(),
                rolled_back: true,
            }],
            false,
        );
        assert!(!failed.is_success());

        let interrupted = report(vec![TableOutcome::Success { rows: 1 }], true);
        assert!(!interrupted.is_success());
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let value = serde_json::to_value(TableReport {
            table: "users".into(),
            outcome: TableOutcome::Success { rows: 3 },
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"table": "users", "status": "success", "rows": 3})
        );
    }
}
