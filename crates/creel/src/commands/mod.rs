//! CLI command implementations

pub mod backup;
pub mod config;
pub mod emergency;
pub mod list;
pub mod prune;
pub mod restore;
pub mod schedule;
pub mod verify;

use anyhow::{Context, Result};
use camino::Utf8Path;
use creel_backup::{BackupOutcome, BackupRepository, PipelineProgress};
use creel_core::{ConfigLoader, CreelConfig};
use creel_store::SupabaseStore;

use crate::output;

/// Flags shared by every command
#[derive(Debug, Clone, Copy)]
pub struct Globals<'a> {
    pub config: Option<&'a Utf8Path>,
    pub root: Option<&'a Utf8Path>,
    pub quiet: bool,
}

impl Globals<'_> {
    /// Defaults, then config file, then environment, then `--root`
    pub fn load_config(&self) -> Result<CreelConfig> {
        let loader = ConfigLoader::new().context("Failed to locate configuration")?;
        let mut config = loader
            .load(self.config)
            .context("Failed to load configuration")?;
        if let Some(root) = self.root {
            config.backup.root = root.to_owned();
        }
        Ok(config)
    }

    pub fn repository(&self, config: &CreelConfig) -> BackupRepository {
        BackupRepository::new(config.backup.root.clone())
    }

    /// Progress bar unless running quietly
    pub fn progress(&self, total: u64, message: &str) -> PipelineProgress {
        if self.quiet {
            PipelineProgress::hidden()
        } else {
            PipelineProgress::bar(total, message)
        }
    }
}

/// Supabase client for the configured project
pub fn connect(config: &CreelConfig) -> Result<SupabaseStore> {
    config.require_store_url()?;
    config.require_service_key()?;
    SupabaseStore::from_config(&config.store).context("Failed to create Supabase client")
}

/// Summary shared by `backup`, `emergency` and `schedule`
pub fn print_backup_outcome(outcome: &BackupOutcome) {
    let summary = &outcome.summary;

    println!();
    if outcome.is_complete() {
        output::success(&format!("Backup {} written", outcome.name));
    } else {
        output::warning(&format!(
            "Backup {} written with {} failed table(s)",
            outcome.name,
            outcome.failed_tables.len()
        ));
    }
    output::kv("Tier", outcome.tier.as_str());
    output::kv("Path", outcome.path.as_str());
    if let Some(sidecar) = &outcome.sidecar {
        output::kv("Summary", sidecar.as_str());
    }
    output::kv(
        "Tables",
        &format!("{}/{}", summary.successful_tables, summary.total_tables),
    );
    output::kv("Records", &summary.total_records.to_string());
    output::kv(
        "Buckets",
        &format!("{}/{}", summary.successful_buckets, summary.total_buckets),
    );
    output::kv("Size", &output::format_bytes(summary.backup_size_bytes));

    for (table, error) in &outcome.failed_tables {
        output::error(&format!("Table {}: {}", table, error));
    }
    for (bucket, error) in &outcome.failed_buckets {
        output::warning(&format!("Bucket {}: {}", bucket, error));
    }

    output::warning("Backup documents contain personal data in plain text; store them accordingly");
    output::tally(
        summary.successful_tables as usize,
        outcome.failed_tables.len(),
        0,
    );
}
