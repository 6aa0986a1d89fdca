//! Timed backups
//!
//! One backup runs immediately, then one per interval. Every run plans its
//! tier, produces a document and prunes afterwards. A failed run is logged
//! and the loop keeps going; shutdown is only observed between runs.

use chrono::{DateTime, Utc};
use creel_store::{ObjectStore, TableStore};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::{prune, RetentionPolicy, TierPlanner};
use crate::error::Result;
use crate::layout::BackupRepository;
use crate::producer::{BackupProducer, BackupRequest, ProducerSettings};
use crate::tier::Tier;

/// Result of one scheduled run
#[derive(Debug, Clone, PartialEq)]
pub enum RunRecord {
    Completed {
        tier: Tier,
        name: String,
        /// Tables that failed to back up; the document was still written
        failed_tables: usize,
        pruned: usize,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub runs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pruned: usize,
}

impl SchedulerStats {
    fn record(&mut self, run: &RunRecord) {
        self.runs += 1;
        match run {
            RunRecord::Completed { pruned, .. } => {
                self.succeeded += 1;
                self.pruned += pruned;
            }
            RunRecord::Failed { .. } => self.failed += 1,
        }
    }
}

pub struct Scheduler<'a> {
    tables: &'a dyn TableStore,
    objects: &'a dyn ObjectStore,
    repository: &'a BackupRepository,
    settings: &'a ProducerSettings,
    policy: RetentionPolicy,
    planner: TierPlanner,
    interval: Duration,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        tables: &'a dyn TableStore,
        objects: &'a dyn ObjectStore,
        repository: &'a BackupRepository,
        settings: &'a ProducerSettings,
        policy: RetentionPolicy,
        planner: TierPlanner,
        interval: Duration,
    ) -> Self {
        Self {
            tables,
            objects,
            repository,
            settings,
            policy,
            planner,
            interval,
        }
    }

    /// One planned backup followed by a prune
    pub async fn run_once(&self, now: DateTime<Utc>) -> RunRecord {
        match self.try_run(now).await {
            Ok(record) => record,
            Err(e) => {
                error!("Scheduled backup failed: {}", e);
                RunRecord::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn try_run(&self, now: DateTime<Utc>) -> Result<RunRecord> {
        let tier = self.planner.plan(&self.repository.entries(None)?, now);
        info!("Scheduled backup into tier {}", tier);

        let producer =
            BackupProducer::new(self.tables, self.objects, self.repository, self.settings);
        let outcome = producer.produce(&BackupRequest::new(tier), now).await?;

        let pruned = match prune(self.repository, &self.policy, now, false) {
            Ok(report) => report.removed.len(),
            Err(e) => {
                warn!("Prune after scheduled backup failed: {}", e);
                0
            }
        };

        Ok(RunRecord::Completed {
            tier,
            name: outcome.name,
            failed_tables: outcome.failed_tables.len(),
            pruned,
        })
    }

    /// Run until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> SchedulerStats
    where
        F: Future<Output = ()>,
    {
        let mut stats = SchedulerStats::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Scheduler stopping after {} run(s)", stats.runs);
                    break;
                }
                _ = ticker.tick() => {
                    let record = self.run_once(Utc::now()).await;
                    stats.record(&record);
                }
            }
        }

        stats
    }
}
