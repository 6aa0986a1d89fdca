//! Backup producer
//!
//! Snapshots every configured table and bucket into one document and writes
//! it atomically under `<root>/<tier>/<name>.json`.

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use creel_core::config::{BucketSpec, CreelConfig};
use creel_core::retry::{retry_with_policy, RetryPolicy};
use creel_store::{ObjectStore, StoreError, TableStore};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::document::{
    BackupDocument, BackupSummary, BucketSnapshot, DocumentMetadata, OrderedMap, TableSnapshot,
    DOCUMENT_VERSION,
};
use crate::error::{BackupError, Result};
use crate::layout::BackupRepository;
use crate::lock::RunLock;
use crate::naming::{default_backup_name, emergency_backup_name, validate_name};
use crate::progress::PipelineProgress;
use crate::tier::Tier;

/// What the producer captures and how
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub tables: Vec<String>,
    pub buckets: Vec<BucketSpec>,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub description: Option<String>,
}

impl ProducerSettings {
    pub fn from_config(config: &CreelConfig) -> Self {
        Self {
            tables: config.tables.clone(),
            buckets: config.buckets.clone(),
            concurrency: config.backup.concurrency,
            retry: config.retry.clone(),
            description: Some(config.backup.description.clone()),
        }
    }
}

/// One backup to take
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRequest {
    /// Explicit name; a timestamped default is used when absent
    pub name: Option<String>,
    pub tier: Tier,
    /// Emergency reason, stored in metadata
    pub reason: Option<String>,
}

impl BackupRequest {
    pub fn new(tier: Tier) -> Self {
        Self {
            name: None,
            tier,
            reason: None,
        }
    }

    pub fn named(name: impl Into<String>, tier: Tier) -> Self {
        Self {
            name: Some(name.into()),
            tier,
            reason: None,
        }
    }

    /// Emergency backups always land in the emergency tier
    pub fn emergency(reason: Option<String>) -> Self {
        Self {
            name: None,
            tier: Tier::Emergency,
            reason,
        }
    }

    fn resolve_name(&self, now: DateTime<Utc>) -> String {
        match (&self.name, self.tier) {
            (Some(name), _) => name.clone(),
            (None, Tier::Emergency) => emergency_backup_name(self.reason.as_deref(), now),
            (None, _) => default_backup_name(now),
        }
    }
}

/// Result of a successful producer run
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub name: String,
    pub tier: Tier,
    pub path: Utf8PathBuf,
    pub sidecar: Option<Utf8PathBuf>,
    pub summary: BackupSummary,
    pub failed_tables: Vec<(String, String)>,
    pub failed_buckets: Vec<(String, String)>,
}

impl BackupOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed_tables.is_empty()
    }
}

/// Produces backup documents from a table store and an object store
pub struct BackupProducer<'a> {
    tables: &'a dyn TableStore,
    objects: &'a dyn ObjectStore,
    repository: &'a BackupRepository,
    settings: &'a ProducerSettings,
    progress: PipelineProgress,
}

impl<'a> BackupProducer<'a> {
    pub fn new(
        tables: &'a dyn TableStore,
        objects: &'a dyn ObjectStore,
        repository: &'a BackupRepository,
        settings: &'a ProducerSettings,
    ) -> Self {
        Self {
            tables,
            objects,
            repository,
            settings,
            progress: PipelineProgress::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: PipelineProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Take one backup.
    ///
    /// Fails without writing anything when the table store is unreachable,
    /// the (tier, name) lock is held, or the document already exists.
    /// Individual table and bucket failures are recorded in the document.
    pub async fn produce(&self, request: &BackupRequest, now: DateTime<Utc>) -> Result<BackupOutcome> {
        let name = request.resolve_name(now);
        validate_name(&name)?;
        let tier = request.tier;

        info!("Starting {} backup {} via {}", tier, name, self.tables.name());

        self.tables.ping().await.map_err(|e| {
            warn!("Store ping failed: {}", e);
            BackupError::StoreUnavailable(e.to_string())
        })?;

        let _lock = RunLock::try_acquire(
            &self
                .repository
                .lock_path(&format!("{}-{}", tier.as_str(), name)),
        )?;

        let target = self.repository.document_path(tier, &name);
        if target.exists() {
            return Err(BackupError::AlreadyExists(target));
        }

        self.progress
            .set_length((self.settings.tables.len() + self.settings.buckets.len()) as u64);

        let tables = self.capture_tables().await;
        let storage = self.capture_buckets().await;
        self.progress.finish();

        let summary = BackupSummary::compute(&tables, &storage, Utc::now());
        let mut document = BackupDocument {
            metadata: DocumentMetadata {
                created_at: now,
                backup_name: name.clone(),
                version: DOCUMENT_VERSION.to_string(),
                description: self.settings.description.clone(),
                tier: Some(tier),
                reason: request.reason.clone(),
                created_by: format!("creel v{}", crate::VERSION),
            },
            tables,
            storage,
            summary,
        };

        let bytes = document.to_json_bytes()?;
        let path = self.repository.write_document(tier, &name, &bytes)?;

        let sidecar = if tier == Tier::Emergency {
            Some(
                self.repository
                    .write_sidecar(tier, &name, &emergency_sidecar(&document))?,
            )
        } else {
            None
        };

        let failed_tables = failures(document.tables.iter().map(|(n, t)| (n, t.error.as_ref())));
        let failed_buckets =
            failures(document.storage.iter().map(|(n, b)| (n, b.error.as_ref())));

        let summary = document.summary;
        info!(
            "Backup {} written: {}/{} tables, {} records, {} bytes",
            name,
            summary.successful_tables,
            summary.total_tables,
            summary.total_records,
            summary.backup_size_bytes
        );
        if !failed_tables.is_empty() {
            warn!(
                "Backup {} is partial: {} table(s) failed",
                name,
                failed_tables.len()
            );
        }

        Ok(BackupOutcome {
            name,
            tier,
            path,
            sidecar,
            summary,
            failed_tables,
            failed_buckets,
        })
    }

    async fn capture_tables(&self) -> OrderedMap<TableSnapshot> {
        let retry = &self.settings.retry;
        stream::iter(self.settings.tables.iter())
            .map(|table| async move {
                let operation = format!("fetch {}", table);
                let result = retry_with_policy(retry, &operation, StoreError::is_transient, || {
                    self.tables.fetch_rows(table)
                })
                .await;
                self.progress.inc();

                let snapshot = match result {
                    Ok(rows) => {
                        debug!("Table {}: {} rows", table, rows.len());
                        TableSnapshot::captured(rows)
                    }
                    Err(e) => {
                        warn!("Table {} failed: {}", table, e);
                        TableSnapshot::failed(e.to_string())
                    }
                };
                (table.clone(), snapshot)
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await
    }

    async fn capture_buckets(&self) -> OrderedMap<BucketSnapshot> {
        let retry = &self.settings.retry;
        stream::iter(self.settings.buckets.iter())
            .map(|bucket| async move {
                let operation = format!("list {}", bucket.name);
                let result = retry_with_policy(retry, &operation, StoreError::is_transient, || {
                    self.objects.list_objects(&bucket.name, bucket.prefix.as_deref())
                })
                .await;
                self.progress.inc();

                let snapshot = match result {
                    Ok(files) => {
                        debug!("Bucket {}: {} objects", bucket.name, files.len());
                        BucketSnapshot::listed(files)
                    }
                    Err(e) => {
                        warn!("Bucket {} failed: {}", bucket.name, e);
                        BucketSnapshot::failed(e.to_string())
                    }
                };
                (bucket.name.clone(), snapshot)
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await
    }
}

fn failures<'s>(
    items: impl Iterator<Item = (&'s str, Option<&'s String>)>,
) -> Vec<(String, String)> {
    items
        .filter_map(|(name, error)| error.map(|e| (name.to_string(), e.clone())))
        .collect()
}

/// Plain-text summary written next to emergency documents
fn emergency_sidecar(document: &BackupDocument) -> String {
    let meta = &document.metadata;
    let summary = &document.summary;
    let mut text = String::new();

    text.push_str(&format!("EMERGENCY BACKUP - {}\n", meta.backup_name));
    text.push_str(&"=".repeat(31));
    text.push('\n');
    text.push_str(&format!("Created: {}\n", meta.created_at.to_rfc3339()));
    text.push_str(&format!(
        "Reason: {}\n",
        meta.reason
            .as_deref()
            .unwrap_or(crate::naming::DEFAULT_EMERGENCY_REASON)
    ));
    text.push_str(&format!(
        "Tables: {}/{}\n",
        summary.successful_tables, summary.total_tables
    ));
    text.push_str(&format!("Records: {}\n\n", summary.total_records));

    text.push_str("Tables captured:\n");
    for (name, table) in document.tables.iter() {
        match &table.error {
            Some(_) => text.push_str(&format!("- {}: ERROR\n", name)),
            None => text.push_str(&format!("- {}: {} records\n", name, table.record_count())),
        }
    }

    text.push_str(&format!(
        "\nTo restore:\ncreel restore emergency/{}\n",
        meta.backup_name
    ));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_names() {
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert!(BackupRequest::new(Tier::Daily)
            .resolve_name(now)
            .starts_with("backup-2024-05-06-"));
        assert!(BackupRequest::emergency(Some("disk".into()))
            .resolve_name(now)
            .starts_with("EMERGENCY-disk-2024-05-06T07-08-09"));
        assert_eq!(
            BackupRequest::named("manual", Tier::Weekly).resolve_name(now),
            "manual"
        );
    }

    #[test]
    fn test_sidecar_lists_tables() {
        let mut tables = OrderedMap::new();
        tables.insert("profiles", TableSnapshot::captured(vec![serde_json::json!({})]));
        tables.insert("records", TableSnapshot::failed("timeout"));
        let storage = OrderedMap::new();
        let now = Utc::now();
        let document = BackupDocument {
            metadata: DocumentMetadata {
                created_at: now,
                backup_name: "EMERGENCY-x".into(),
                version: DOCUMENT_VERSION.into(),
                description: None,
                tier: Some(Tier::Emergency),
                reason: Some("x".into()),
                created_by: String::new(),
            },
            summary: BackupSummary::compute(&tables, &storage, now),
            tables,
            storage,
        };
        let text = emergency_sidecar(&document);
        assert!(text.contains("Tables: 1/2"));
        assert!(text.contains("- profiles: 1 records"));
        assert!(text.contains("- records: ERROR"));
        assert!(text.contains("creel restore emergency/EMERGENCY-x"));
    }
}
