//! Prune command

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use creel_backup::{prune, RetentionPolicy, Tier};
use tabled::{settings::Style, Table, Tabled};

use super::Globals;
use crate::output;

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Show what would be removed without deleting anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Tabled)]
struct RemovalRow {
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub fn run(args: PruneArgs, globals: &Globals<'_>) -> Result<()> {
    let config = globals.load_config()?;
    let repository = globals.repository(&config);
    let policy = RetentionPolicy::from_config(&config.retention);

    output::header("Retention");
    for tier in Tier::ALL {
        let bounds = policy.for_tier(tier);
        let mut limits = Vec::new();
        if let Some(days) = bounds.max_age_days {
            limits.push(format!("{} day(s)", days));
        }
        if let Some(count) = bounds.max_count {
            limits.push(format!("{} backup(s)", count));
        }
        if limits.is_empty() {
            limits.push("keep all".to_string());
        }
        output::kv(tier.as_str(), &limits.join(", "));
    }
    if args.dry_run {
        output::warning("DRY RUN MODE - nothing will be deleted");
    }
    println!();

    let report = prune(&repository, &policy, Utc::now(), args.dry_run)
        .with_context(|| format!("Failed to prune {}", repository.root()))?;

    if report.removed.is_empty() && report.failed.is_empty() {
        output::success("Nothing to prune");
    } else if !report.removed.is_empty() {
        let rows: Vec<RemovalRow> = report
            .removed
            .iter()
            .map(|c| RemovalRow {
                tier: c.entry.tier.to_string(),
                name: c.entry.name.clone(),
                modified: c.entry.modified.format("%Y-%m-%d %H:%M").to_string(),
                size: output::format_bytes(c.entry.size_bytes),
                reason: c.reason.to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        println!("{}", table);
    }

    for (entry, error) in &report.failed {
        output::error(&format!("Could not remove {}: {}", entry.path, error));
    }

    let verb = if report.dry_run { "Would free" } else { "Freed" };
    output::kv(verb, &output::format_bytes(report.freed_bytes));
    output::kv("Kept", &report.kept.to_string());
    output::tally(report.removed.len(), report.failed.len(), report.kept);
    Ok(())
}
