//! Schedule command

use anyhow::Result;
use clap::Args;
use creel_backup::{
    InterruptFlag, ProducerSettings, RetentionPolicy, Scheduler, TierPlanner,
};
use std::time::Duration;

use super::{connect, Globals};
use crate::output;

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Minutes between backups (overrides schedule.interval-minutes)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_minutes: Option<u64>,

    /// Never promote runs to the weekly or monthly tier
    #[arg(long)]
    pub no_promote: bool,
}

pub async fn run(args: ScheduleArgs, globals: &Globals<'_>) -> Result<()> {
    let config = globals.load_config()?;
    let store = connect(&config)?;
    let repository = globals.repository(&config);
    let settings = ProducerSettings::from_config(&config);

    let minutes = args
        .interval_minutes
        .unwrap_or(config.schedule.interval_minutes);
    let promote = config.schedule.promote_tiers && !args.no_promote;

    output::header("Scheduled backups");
    output::kv("Repository", repository.root().as_str());
    output::kv("Interval", &format!("{} minute(s)", minutes));
    output::kv("Tier promotion", if promote { "on" } else { "off" });
    output::info("Press Ctrl-C to stop after the current run, twice to quit now");
    println!();

    let scheduler = Scheduler::new(
        &store,
        &store,
        &repository,
        &settings,
        RetentionPolicy::from_config(&config.retention),
        TierPlanner::new(promote),
        Duration::from_secs(minutes * 60),
    );

    let interrupt = InterruptFlag::new();
    interrupt.listen_for_ctrl_c();
    let stats = scheduler.run(interrupt.triggered()).await;

    println!();
    output::kv("Runs", &stats.runs.to_string());
    output::kv("Pruned", &stats.pruned.to_string());
    output::tally(stats.succeeded, stats.failed, 0);
    Ok(())
}
