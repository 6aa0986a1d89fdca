//! Verify command
//!
//! Without a name this lists the repository; with a name it deep-verifies
//! one document and exits non-zero unless the document is valid.

use anyhow::{bail, Result};
use clap::Args;
use creel_backup::{BackupVerifier, Tier, VerificationReport};

use super::list::{load_catalog, print_catalog};
use super::Globals;
use crate::cli::TierArg;
use crate::output;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Backup to verify: <name>, <tier>/<name> or a path to a .json file
    pub name: Option<String>,

    /// Tier to search for <name>, or to list
    #[arg(short, long, value_enum)]
    pub tier: Option<TierArg>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: VerifyArgs, globals: &Globals<'_>) -> Result<()> {
    let tier = args.tier.map(Tier::from);

    let Some(name) = args.name else {
        let catalog = load_catalog(tier, globals)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&catalog)?);
        } else if !catalog.is_empty() {
            print_catalog(&catalog);
        }
        if catalog.is_empty() {
            bail!("No backups found");
        }
        return Ok(());
    };

    let config = globals.load_config()?;
    let repository = globals.repository(&config);
    let report = BackupVerifier::new(&repository).verify(&name, tier)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.valid {
        bail!("Backup {} failed verification", name);
    }
    Ok(())
}

fn print_report(report: &VerificationReport) {
    output::header(&format!("Verifying {}", report.path));

    if let Some(error) = &report.error {
        output::error(error);
        return;
    }

    if let Some(meta) = &report.metadata {
        output::kv("Name", &meta.backup_name);
        output::kv("Created", &meta.created_at.to_rfc3339());
        output::kv("Format", &meta.version);
        if let Some(tier) = meta.tier {
            output::kv("Tier", tier.as_str());
        }
        if let Some(reason) = &meta.reason {
            output::kv("Reason", reason);
        }
    }
    if let (Some(stored), Some(recomputed)) = (&report.stored, &report.recomputed) {
        output::kv(
            "Tables",
            &format!(
                "{}/{} (recomputed {}/{})",
                stored.successful_tables,
                stored.total_tables,
                recomputed.successful_tables,
                recomputed.total_tables
            ),
        );
        output::kv(
            "Records",
            &format!(
                "{} (recomputed {})",
                stored.total_records, recomputed.total_records
            ),
        );
    }

    println!();
    for table in &report.tables {
        match &table.error {
            Some(error) => output::error(&format!("{}: {}", table.name, error)),
            None => output::success(&format!("{}: {} records", table.name, table.records)),
        }
    }
    for bucket in &report.buckets {
        match &bucket.error {
            Some(error) => output::warning(&format!("bucket {}: {}", bucket.name, error)),
            None => output::info(&format!("bucket {}: {} files", bucket.name, bucket.files)),
        }
    }

    for detail in report.consistency_details() {
        output::error(&detail);
    }
    for note in &report.notes {
        output::info(note);
    }

    let failed = report.tables.iter().filter(|t| t.error.is_some()).count();
    output::tally(report.tables.len() - failed, failed, 0);

    if report.valid {
        output::success("Backup is valid");
    } else {
        output::error("Backup is not valid");
    }
}
