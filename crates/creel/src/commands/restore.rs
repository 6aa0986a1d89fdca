//! Restore command
//!
//! Connects the terminal confirmation UI to the creel-backup restore executor.

use anyhow::{bail, Context, Result};
use clap::Args;
use creel_backup::{
    BackupError, ConfirmationGate, InterruptFlag, RestoreExecutor, RestoreOptions, RestorePreview,
    RestoreReport, RestoreResult, TableOutcome, Tier,
};
use dialoguer::{Confirm, Input};
use tabled::{settings::Style, Table, Tabled};

use super::{connect, Globals};
use crate::cli::TierArg;
use crate::output;

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup to restore: <name>, <tier>/<name> or a path to a .json file
    pub name: String,

    /// Tier to search for <name>
    #[arg(short, long, value_enum)]
    pub tier: Option<TierArg>,

    /// Restore a backup with failed tables, skipping those tables
    #[arg(long)]
    pub allow_partial: bool,

    /// Restore a backup that failed its consistency check (asks twice)
    #[arg(long)]
    pub override_consistency: bool,
}

#[derive(Tabled)]
struct PreviewRow {
    #[tabled(rename = "#")]
    order: usize,
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Rows")]
    rows: u64,
    #[tabled(rename = "Action")]
    action: String,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Confirmation on the controlling terminal
struct TerminalGate;

impl ConfirmationGate for TerminalGate {
    fn confirm(&mut self, preview: &RestorePreview) -> creel_backup::Result<bool> {
        print_preview(preview);

        let restoring = preview
            .tables
            .iter()
            .filter(|t| t.skip_reason.is_none())
            .count();
        Confirm::new()
            .with_prompt(format!(
                "Replace the contents of {} table(s) with backup {}?",
                restoring, preview.backup_name
            ))
            .default(false)
            .interact()
            .map_err(prompt_error)
    }

    fn confirm_override(
        &mut self,
        backup_name: &str,
        problems: &[String],
    ) -> creel_backup::Result<bool> {
        output::header("Consistency check failed");
        for problem in problems {
            output::error(problem);
        }
        output::warning("The stored summary does not match the captured rows.");
        output::warning("Restoring this backup may load incomplete or altered data.");

        let typed: String = Input::new()
            .with_prompt(format!("Type '{}' to restore it anyway", backup_name))
            .allow_empty(true)
            .interact_text()
            .map_err(prompt_error)?;
        Ok(typed.trim() == backup_name)
    }
}

fn prompt_error(e: dialoguer::Error) -> BackupError {
    BackupError::Io(std::io::Error::other(e.to_string()))
}

pub async fn run(args: RestoreArgs, globals: &Globals<'_>) -> Result<()> {
    let config = globals.load_config()?;
    let store = connect(&config)?;
    let repository = globals.repository(&config);
    let options = RestoreOptions {
        allow_partial: args.allow_partial,
        override_consistency: args.override_consistency,
    };

    output::header("Restore");
    output::kv("Backup", &args.name);
    output::kv("Project", config.store.url.as_deref().unwrap_or_default());

    let spinner = output::spinner("Verifying backup...");
    let executor = RestoreExecutor::new(&store, &repository).with_retry(config.retry.clone());
    let prepared = executor
        .prepare(&args.name, args.tier.map(Tier::from), options)
        .await;
    spinner.finish_and_clear();
    let prepared = match prepared {
        Ok(p) => p,
        Err(e) => {
            explain_refusal(&e);
            return Err(e).context("Restore refused");
        }
    };
    output::success(&format!("Backup {} passed preflight", prepared.name));

    let total = prepared.document.tables.len() as u64;
    let mut executor = executor.with_progress(globals.progress(total, "Restoring"));

    let interrupt = InterruptFlag::new();
    interrupt.listen_for_ctrl_c();

    let mut gate = TerminalGate;
    let result = executor
        .execute(prepared, &mut gate, &interrupt)
        .await
        .context("Restore failed")?;

    let report = match result {
        RestoreResult::Aborted => {
            output::info("Restore cancelled, nothing was changed");
            return Ok(());
        }
        RestoreResult::Completed(report) => report,
    };

    print_report(&report);
    if !report.is_success() {
        if report.interrupted {
            bail!("Restore of {} was interrupted", report.backup_name);
        }
        bail!(
            "Restore of {} finished with {} failed table(s)",
            report.backup_name,
            report.failed()
        );
    }
    Ok(())
}

fn explain_refusal(error: &BackupError) {
    match error {
        BackupError::PartialBackup { tables, .. } => {
            output::error(&format!("Backup has failed tables: {}", tables.join(", ")));
            output::info("Re-run with --allow-partial to restore the other tables");
        }
        BackupError::ConsistencyMismatch { details, .. } => {
            for detail in details {
                output::error(detail);
            }
            output::info("Re-run with --override-consistency to restore it anyway");
        }
        BackupError::AmbiguousBackup { candidates, .. } => {
            output::info(&format!("Candidates: {}", candidates.join(", ")));
            output::info("Qualify the name as <tier>/<name> or pass --tier");
        }
        _ => {}
    }
}

fn print_preview(preview: &RestorePreview) {
    output::header(&format!("Restore plan for {}", preview.backup_name));
    output::kv("File", preview.path.as_str());
    output::kv(
        "Tables",
        &format!(
            "{}/{}",
            preview.summary.successful_tables, preview.summary.total_tables
        ),
    );
    output::kv("Records", &preview.summary.total_records.to_string());

    let rows: Vec<PreviewRow> = preview
        .tables
        .iter()
        .enumerate()
        .map(|(i, t)| PreviewRow {
            order: i + 1,
            table: t.name.clone(),
            rows: t.rows,
            action: match &t.skip_reason {
                Some(reason) => format!("skip ({})", reason),
                None => "replace".to_string(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);

    for note in &preview.notes {
        output::info(note);
    }
    if !preview.buckets.is_empty() {
        output::info(&format!(
            "Storage buckets ({}) are listed only; object contents are not restored",
            preview.buckets.join(", ")
        ));
    }

    println!();
    output::warning("Every listed table is emptied and reloaded. Rows added since the backup are lost.");
    output::warning("Backup documents contain personal data; handle the file accordingly.");
    output::warning("Ctrl-C stops after the table in progress. A second Ctrl-C quits at once and can leave that table half restored.");
}

fn print_report(report: &RestoreReport) {
    output::header(&format!("Restore of {}", report.backup_name));

    let rows: Vec<OutcomeRow> = report
        .tables
        .iter()
        .map(|t| {
            let (result, detail) = match &t.outcome {
                TableOutcome::Success { rows } => ("restored", format!("{} rows", rows)),
                TableOutcome::Failed { error, rolled_back } => (
                    "failed",
                    if *rolled_back {
                        format!("{} (previous rows kept)", error)
                    } else {
                        format!("{} (table may be incomplete)", error)
                    },
                ),
                TableOutcome::Skipped { reason } => ("skipped", reason.clone()),
            };
            OutcomeRow {
                table: t.table.clone(),
                result: result.to_string(),
                detail,
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);

    for notice in &report.storage {
        match &notice.error {
            Some(error) => output::warning(&format!(
                "Bucket {} was not listed in the backup: {}",
                notice.bucket, error
            )),
            None => output::info(&format!(
                "Bucket {}: {} file(s) recorded; re-upload object contents manually",
                notice.bucket, notice.files
            )),
        }
    }

    output::kv("Records restored", &report.restored_records().to_string());
    output::kv(
        "Duration",
        &format!("{:.1}s", report.duration_ms as f64 / 1000.0),
    );
    if report.interrupted {
        output::warning("Restore was interrupted; skipped tables were not changed");
    }
    output::tally(report.succeeded(), report.failed(), report.skipped());
}
