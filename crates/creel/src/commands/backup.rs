//! Backup command

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use creel_backup::{BackupProducer, BackupRequest, ProducerSettings, Tier};

use super::{connect, print_backup_outcome, Globals};
use crate::cli::ManualTier;
use crate::output;

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Backup name (defaults to backup-<date>-<millis>)
    pub name: Option<String>,

    /// Retention tier
    #[arg(short, long, value_enum, default_value = "daily")]
    pub tier: ManualTier,
}

pub async fn run(args: BackupArgs, globals: &Globals<'_>) -> Result<()> {
    let tier = Tier::from(args.tier);
    let request = match args.name {
        Some(name) => BackupRequest::named(name, tier),
        None => BackupRequest::new(tier),
    };
    produce(request, globals).await
}

/// Run the producer for `request` and print the outcome
pub(crate) async fn produce(request: BackupRequest, globals: &Globals<'_>) -> Result<()> {
    let config = globals.load_config()?;
    let store = connect(&config)?;
    let repository = globals.repository(&config);
    let settings = ProducerSettings::from_config(&config);

    output::header(&format!("{} backup", capitalize(request.tier.as_str())));
    output::kv("Project", config.store.url.as_deref().unwrap_or_default());
    output::kv("Repository", repository.root().as_str());
    output::kv("Tables", &settings.tables.len().to_string());
    output::kv("Buckets", &settings.buckets.len().to_string());
    println!();

    let total = (settings.tables.len() + settings.buckets.len()) as u64;
    let outcome = BackupProducer::new(&store, &store, &repository, &settings)
        .with_progress(globals.progress(total, "Capturing"))
        .produce(&request, Utc::now())
        .await
        .context("Backup failed")?;

    print_backup_outcome(&outcome);
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
