//! Backup verifier
//!
//! Two modes:
//! - listing: every stored document with coarse health, newest first, with
//!   byte totals overall and per tier
//! - deep verification of one document: recompute the summary from the
//!   `tables` section and compare it with what was stored
//!
//! Content problems never surface as `Err`; they become part of the report
//! so one bad file cannot break a listing.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

use crate::document::{BackupDocument, BackupSummary, DocumentMetadata, REQUIRED_SECTIONS};
use crate::error::Result;
use crate::layout::{BackupRepository, CatalogEntry};
use crate::tier::Tier;

/// Coarse health of a stored document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DocumentHealth {
    Healthy,
    MissingSections(Vec<String>),
    Unparseable(String),
    Unreadable(String),
}

impl DocumentHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, DocumentHealth::Healthy)
    }

    pub fn label(&self) -> String {
        match self {
            DocumentHealth::Healthy => "ok".to_string(),
            DocumentHealth::MissingSections(s) => format!("missing {}", s.join(", ")),
            DocumentHealth::Unparseable(_) => "not valid JSON".to_string(),
            DocumentHealth::Unreadable(_) => "unreadable".to_string(),
        }
    }
}

/// One row of a listing
#[derive(Debug, Clone, Serialize)]
pub struct ListedBackup {
    pub tier: Tier,
    pub name: String,
    pub path: Utf8PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    pub health: DocumentHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BackupSummary>,
}

impl ListedBackup {
    /// Creation instant from the metadata, or the file mtime when the
    /// document does not carry one
    pub fn ranked_at(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(self.modified)
    }
}

/// Listing of the repository
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    /// Newest first by creation time
    pub backups: Vec<ListedBackup>,
    pub total_bytes: u64,
    pub bytes_per_tier: BTreeMap<Tier, u64>,
    pub healthy: usize,
    pub unhealthy: usize,
}

impl Catalog {
    pub fn newest(&self) -> Option<&ListedBackup> {
        self.backups.first()
    }

    pub fn oldest(&self) -> Option<&ListedBackup> {
        self.backups.last()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }
}

/// Stored summary value that disagrees with the recomputed one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub field: String,
    pub stored: u64,
    pub recomputed: u64,
}

/// Structural problem with a single table snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Neither `data` nor `error`
    Empty,
    /// `error` set while `data` still holds rows
    ErrorWithRows,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableAnomaly {
    pub table: String,
    pub kind: AnomalyKind,
}

/// Totals recomputed from the `tables` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputedTotals {
    pub total_tables: u64,
    pub successful_tables: u64,
    pub errored_tables: u64,
    pub total_records: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCheck {
    pub name: String,
    pub records: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCheck {
    pub name: String,
    pub files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of deep verification
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub path: Utf8PathBuf,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<BackupSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recomputed: Option<RecomputedTotals>,
    pub tables: Vec<TableCheck>,
    pub buckets: Vec<BucketCheck>,
    pub mismatches: Vec<Mismatch>,
    pub anomalies: Vec<TableAnomaly>,
    /// Advisory findings that never affect the verdict
    pub notes: Vec<String>,
}

impl VerificationReport {
    fn failed(path: &Utf8Path, error: String) -> Self {
        Self {
            path: path.to_owned(),
            valid: false,
            error: Some(error),
            metadata: None,
            stored: None,
            recomputed: None,
            tables: Vec::new(),
            buckets: Vec::new(),
            mismatches: Vec::new(),
            anomalies: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn errored_tables(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|t| t.error.is_some())
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn has_consistency_problems(&self) -> bool {
        !self.mismatches.is_empty() || !self.anomalies.is_empty()
    }

    /// Human-readable consistency problems, one per line
    pub fn consistency_details(&self) -> Vec<String> {
        let mut details: Vec<String> = self
            .mismatches
            .iter()
            .map(|m| {
                format!(
                    "{}: stored {} but recomputed {}",
                    m.field, m.stored, m.recomputed
                )
            })
            .collect();
        details.extend(self.anomalies.iter().map(|a| match a.kind {
            AnomalyKind::Empty => format!("table {} has neither data nor error", a.table),
            AnomalyKind::ErrorWithRows => {
                format!("table {} has an error but still carries rows", a.table)
            }
        }));
        details
    }
}

/// Verifier over a backup repository
pub struct BackupVerifier<'a> {
    repository: &'a BackupRepository,
}

impl<'a> BackupVerifier<'a> {
    pub fn new(repository: &'a BackupRepository) -> Self {
        Self { repository }
    }

    /// List documents in `tier` (or all tiers) with coarse health
    pub fn catalog(&self, tier: Option<Tier>) -> Result<Catalog> {
        let entries = self.repository.entries(tier)?;
        let mut catalog = Catalog::default();

        for entry in entries {
            let listed = list_entry(entry);
            catalog.total_bytes += listed.size_bytes;
            *catalog.bytes_per_tier.entry(listed.tier).or_insert(0) += listed.size_bytes;
            if listed.health.is_healthy() {
                catalog.healthy += 1;
            } else {
                catalog.unhealthy += 1;
            }
            catalog.backups.push(listed);
        }

        catalog.backups.sort_by(|a, b| {
            b.ranked_at()
                .cmp(&a.ranked_at())
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(catalog)
    }

    /// Resolve a reference and deep-verify it
    pub fn verify(&self, reference: &str, tier: Option<Tier>) -> Result<VerificationReport> {
        let resolved = self.repository.resolve(reference, tier)?;
        Ok(verify_file(&resolved.path))
    }
}

fn list_entry(entry: CatalogEntry) -> ListedBackup {
    let mut listed = ListedBackup {
        tier: entry.tier,
        name: entry.name,
        path: entry.path,
        size_bytes: entry.size_bytes,
        modified: entry.modified,
        health: DocumentHealth::Healthy,
        created_at: None,
        summary: None,
    };

    let bytes = match fs::read(&listed.path) {
        Ok(b) => b,
        Err(e) => {
            listed.health = DocumentHealth::Unreadable(e.to_string());
            return listed;
        }
    };
    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            listed.health = DocumentHealth::Unparseable(e.to_string());
            return listed;
        }
    };

    let missing = missing_sections(&value);
    if !missing.is_empty() {
        listed.health = DocumentHealth::MissingSections(missing);
        return listed;
    }

    listed.created_at = value
        .pointer("/metadata/created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));
    listed.summary = value
        .get("summary")
        .and_then(|s| serde_json::from_value(s.clone()).ok());
    listed
}

fn missing_sections(value: &Value) -> Vec<String> {
    REQUIRED_SECTIONS
        .iter()
        .filter(|section| value.get(**section).is_none_or(|v| !v.is_object()))
        .map(|s| s.to_string())
        .collect()
}

/// Read, parse and deep-verify one document file
pub fn verify_file(path: &Utf8Path) -> VerificationReport {
    inspect_file(path).0
}

/// Deep-verify one document file, also returning the parsed document when
/// it could be read
pub fn inspect_file(path: &Utf8Path) -> (VerificationReport, Option<BackupDocument>) {
    debug!("Verifying {}", path);

    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            return (
                VerificationReport::failed(path, format!("cannot read document: {}", e)),
                None,
            )
        }
    };

    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            return (
                VerificationReport::failed(path, format!("not valid JSON: {}", e)),
                None,
            )
        }
    };

    let missing = missing_sections(&value);
    if !missing.is_empty() {
        return (
            VerificationReport::failed(
                path,
                format!("missing required section(s): {}", missing.join(", ")),
            ),
            None,
        );
    }

    let document: BackupDocument = match serde_json::from_value(value) {
        Ok(d) => d,
        Err(e) => {
            return (
                VerificationReport::failed(path, format!("invalid document structure: {}", e)),
                None,
            )
        }
    };

    let report = verify_document(&document, path, bytes.len() as u64);
    (report, Some(document))
}

/// Deep-verify an already parsed document
pub fn verify_document(
    document: &BackupDocument,
    path: &Utf8Path,
    file_len: u64,
) -> VerificationReport {
    let stored = document.summary.clone();

    let mut tables = Vec::with_capacity(document.tables.len());
    let mut anomalies = Vec::new();
    let mut recomputed = RecomputedTotals::default();

    for (name, table) in document.tables.iter() {
        recomputed.total_tables += 1;
        if table.is_errored() {
            recomputed.errored_tables += 1;
        } else {
            recomputed.successful_tables += 1;
        }
        recomputed.total_records += table.record_count();

        match (&table.data, &table.error) {
            (None, None) => anomalies.push(TableAnomaly {
                table: name.to_string(),
                kind: AnomalyKind::Empty,
            }),
            (Some(rows), Some(_)) if !rows.is_empty() => anomalies.push(TableAnomaly {
                table: name.to_string(),
                kind: AnomalyKind::ErrorWithRows,
            }),
            _ => {}
        }

        tables.push(TableCheck {
            name: name.to_string(),
            records: table.record_count(),
            error: table.error.clone(),
        });
    }

    let mut mismatches = Vec::new();
    let mut compare = |field: &str, stored: u64, recomputed: u64| {
        if stored != recomputed {
            mismatches.push(Mismatch {
                field: field.to_string(),
                stored,
                recomputed,
            });
        }
    };
    compare("total_tables", stored.total_tables, recomputed.total_tables);
    compare(
        "successful_tables",
        stored.successful_tables,
        recomputed.successful_tables,
    );
    compare("total_records", stored.total_records, recomputed.total_records);
    if stored.successful_tables > stored.total_tables {
        mismatches.push(Mismatch {
            field: "successful_tables exceeds total_tables".to_string(),
            stored: stored.successful_tables,
            recomputed: stored.total_tables,
        });
    }

    let mut notes = Vec::new();
    let buckets: Vec<BucketCheck> = document
        .storage
        .iter()
        .map(|(name, bucket)| {
            if let Some(error) = &bucket.error {
                notes.push(format!("bucket {} was not listed: {}", name, error));
            }
            BucketCheck {
                name: name.to_string(),
                files: bucket.file_count(),
                error: bucket.error.clone(),
            }
        })
        .collect();

    if stored.backup_size_bytes != 0 && stored.backup_size_bytes != file_len {
        notes.push(format!(
            "recorded size {} bytes differs from file size {} bytes",
            stored.backup_size_bytes, file_len
        ));
    }

    let valid = recomputed.errored_tables == 0
        && recomputed.total_records == stored.total_records
        && mismatches.is_empty()
        && anomalies.is_empty();

    VerificationReport {
        path: path.to_owned(),
        valid,
        error: None,
        metadata: Some(document.metadata.clone()),
        stored: Some(stored),
        recomputed: Some(recomputed),
        tables,
        buckets,
        mismatches,
        anomalies,
        notes,
    }
}
