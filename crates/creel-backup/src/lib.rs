//! Creel backup pipeline
//!
//! Produces, verifies, restores and prunes JSON snapshots of a Supabase
//! project's tables and storage listings.
//!
//! # Features
//!
//! ## Backup
//! - **Tiered repository**: `<root>/<tier>/<name>.json` for emergency, daily, weekly and monthly backups
//! - **Partial-failure tolerance**: a table that cannot be read is recorded as an error, the rest are captured
//! - **Atomic writes**: documents are written to a temp file and renamed without clobbering
//! - **Emergency sidecars**: a plain-text summary next to every emergency document
//!
//! ## Verify
//! - **Catalog**: every document per tier with size and health
//! - **Deep check**: recomputes the summary and flags tables with neither data nor error
//!
//! ## Restore
//! - **Preflight**: malformed, inconsistent and partial documents are refused unless overridden
//! - **Confirmation gate**: nothing is touched before an explicit yes
//! - **Per-table transactions**: a failed table is rolled back to its pre-restore rows
//!
//! ## Retention
//! - **Per-tier bounds**: maximum age and maximum count
//! - **Scheduler**: timed backups promoted to weekly and monthly tiers when due
//!
//! # Examples
//!
//! ```no_run
//! use creel_backup::{BackupProducer, BackupRepository, BackupRequest, ProducerSettings, Tier};
//! use creel_core::ConfigLoader;
//! use creel_store::SupabaseStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new()?.load(None)?;
//!     let store = SupabaseStore::from_config(&config.store)?;
//!     let repository = BackupRepository::new(config.backup.root.clone());
//!     let settings = ProducerSettings::from_config(&config);
//!
//!     let outcome = BackupProducer::new(&store, &store, &repository, &settings)
//!         .produce(&BackupRequest::new(Tier::Daily), chrono::Utc::now())
//!         .await?;
//!
//!     println!("Backup written: {}", outcome.path);
//!     Ok(())
//! }
//! ```

pub mod document;
pub mod error;
pub mod interrupt;
pub mod layout;
pub mod lock;
pub mod naming;
pub mod producer;
pub mod progress;
pub mod restore;
pub mod retention;
pub mod tier;
pub mod verifier;

// Re-export commonly used types
pub use document::{
    BackupDocument, BackupSummary, BucketSnapshot, DocumentMetadata, OrderedMap, TableSnapshot,
    DOCUMENT_VERSION, REQUIRED_SECTIONS,
};
pub use error::{BackupError, Result};
pub use interrupt::{InterruptFlag, SignalAction};
pub use layout::{BackupRepository, CatalogEntry, ResolvedBackup};
pub use lock::RunLock;
pub use naming::{default_backup_name, emergency_backup_name, validate_name};
pub use producer::{BackupOutcome, BackupProducer, BackupRequest, ProducerSettings};
pub use progress::PipelineProgress;
pub use restore::{
    ConfirmationGate, FixedAnswers, PreparedRestore, RestoreExecutor, RestoreOptions,
    RestorePreview, RestoreReport, RestoreResult, RestoreState, StorageNotice, TableOutcome,
    TableReport,
};
pub use retention::{
    prune, PruneCandidate, PrunePlan, PruneReason, PruneReport, RetentionPolicy, RunRecord,
    Scheduler, SchedulerStats, TierPlanner,
};
pub use tier::Tier;
pub use verifier::{
    inspect_file, verify_document, verify_file, BackupVerifier, Catalog, DocumentHealth,
    ListedBackup, VerificationReport,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
