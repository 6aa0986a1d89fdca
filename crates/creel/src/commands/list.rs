//! List command

use anyhow::Result;
use clap::Args;
use creel_backup::{BackupVerifier, Catalog, Tier};
use tabled::{settings::Style, Table, Tabled};

use super::Globals;
use crate::cli::TierArg;
use crate::output;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list this tier
    #[arg(short, long, value_enum)]
    pub tier: Option<TierArg>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Tables")]
    tables: String,
    #[tabled(rename = "Records")]
    records: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Health")]
    health: String,
}

pub fn run(args: ListArgs, globals: &Globals<'_>) -> Result<()> {
    let catalog = load_catalog(args.tier.map(Tier::from), globals)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    if catalog.is_empty() {
        output::warning("No backups found");
        return Ok(());
    }
    print_catalog(&catalog);
    Ok(())
}

pub(crate) fn load_catalog(tier: Option<Tier>, globals: &Globals<'_>) -> Result<Catalog> {
    let config = globals.load_config()?;
    let repository = globals.repository(&config);
    output::header(&format!("Backups in {}", repository.root()));
    Ok(BackupVerifier::new(&repository).catalog(tier)?)
}

pub(crate) fn print_catalog(catalog: &Catalog) {
    let rows: Vec<BackupRow> = catalog
        .backups
        .iter()
        .map(|b| BackupRow {
            tier: b.tier.to_string(),
            name: b.name.clone(),
            created: b
                .created_at
                .unwrap_or(b.modified)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            tables: b
                .summary
                .as_ref()
                .map(|s| format!("{}/{}", s.successful_tables, s.total_tables))
                .unwrap_or_else(|| "-".to_string()),
            records: b
                .summary
                .as_ref()
                .map(|s| s.total_records.to_string())
                .unwrap_or_else(|| "-".to_string()),
            size: output::format_bytes(b.size_bytes),
            health: b.health.label(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);

    println!();
    for (tier, bytes) in &catalog.bytes_per_tier {
        output::kv(tier.as_str(), &output::format_bytes(*bytes));
    }
    output::kv("Total", &output::format_bytes(catalog.total_bytes));
    if let (Some(newest), Some(oldest)) = (catalog.newest(), catalog.oldest()) {
        output::kv("Newest", &format!("{}/{}", newest.tier, newest.name));
        output::kv("Oldest", &format!("{}/{}", oldest.tier, oldest.name));
    }

    if catalog.unhealthy > 0 {
        output::warning(&format!(
            "{} backup(s) could not be read; run `creel verify <name>` for details",
            catalog.unhealthy
        ));
    }
    output::tally(catalog.healthy, catalog.unhealthy, 0);
}
