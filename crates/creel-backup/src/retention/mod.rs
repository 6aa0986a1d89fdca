//! Retention policy
//!
//! Decides which stored documents are pruned, and which tier a scheduled
//! backup belongs to. Both are pure functions of the catalog and a clock;
//! only [`prune`] touches the filesystem.

use chrono::{DateTime, Datelike, Duration, Utc};
use creel_core::config::{RetentionConfig, TierRetention};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub mod scheduler;

pub use scheduler::{RunRecord, Scheduler, SchedulerStats};

use crate::error::Result;
use crate::layout::{BackupRepository, CatalogEntry};
use crate::tier::Tier;

/// Retention bounds per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    config: RetentionConfig,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&RetentionConfig::default())
    }
}

impl RetentionPolicy {
    pub fn from_config(config: &RetentionConfig) -> Self {
        Self { config: *config }
    }

    pub fn for_tier(&self, tier: Tier) -> TierRetention {
        match tier {
            Tier::Emergency => self.config.emergency,
            Tier::Daily => self.config.daily,
            Tier::Weekly => self.config.weekly,
            Tier::Monthly => self.config.monthly,
        }
    }

    /// Split `entries` into kept and removable documents.
    ///
    /// Per tier, newest first: the newest document is always kept; any other
    /// is removed once its index reaches `max_count` or its age exceeds
    /// `max_age_days`.
    pub fn plan_prune(&self, entries: &[CatalogEntry], now: DateTime<Utc>) -> PrunePlan {
        let mut by_tier: BTreeMap<Tier, Vec<&CatalogEntry>> = BTreeMap::new();
        for entry in entries {
            by_tier.entry(entry.tier).or_default().push(entry);
        }

        let mut plan = PrunePlan::default();
        for (tier, mut tier_entries) in by_tier {
            tier_entries
                .sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
            let bounds = self.for_tier(tier);

            for (index, entry) in tier_entries.into_iter().enumerate() {
                let reason = if index == 0 {
                    None
                } else if bounds.max_count.is_some_and(|max| index >= max) {
                    Some(PruneReason::OverCount)
                } else if bounds
                    .max_age_days
                    .is_some_and(|days| now - entry.modified > Duration::days(i64::from(days)))
                {
                    Some(PruneReason::OverAge)
                } else {
                    None
                };

                match reason {
                    Some(reason) => plan.remove.push(PruneCandidate {
                        entry: entry.clone(),
                        reason,
                    }),
                    None => plan.keep.push(entry.clone()),
                }
            }
        }
        plan
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PruneReason {
    OverCount,
    OverAge,
}

impl std::fmt::Display for PruneReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OverCount => write!(f, "over count"),
            Self::OverAge => write!(f, "over age"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PruneCandidate {
    pub entry: CatalogEntry,
    pub reason: PruneReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrunePlan {
    pub keep: Vec<CatalogEntry>,
    pub remove: Vec<PruneCandidate>,
}

/// What a prune run did, or would do with `dry_run`
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub dry_run: bool,
    pub kept: usize,
    pub removed: Vec<PruneCandidate>,
    /// Documents that could not be deleted, with the error
    pub failed: Vec<(CatalogEntry, String)>,
    pub freed_bytes: u64,
}

/// Apply `policy` to the repository
pub fn prune(
    repository: &BackupRepository,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<PruneReport> {
    let entries = repository.entries(None)?;
    let plan = policy.plan_prune(&entries, now);
    debug!(
        "Prune plan: keep {}, remove {}",
        plan.keep.len(),
        plan.remove.len()
    );

    let mut report = PruneReport {
        dry_run,
        kept: plan.keep.len(),
        ..PruneReport::default()
    };

    for candidate in plan.remove {
        let entry = &candidate.entry;
        if dry_run {
            info!("Would remove {}/{} ({})", entry.tier, entry.name, candidate.reason);
            report.freed_bytes += entry.size_bytes;
            report.removed.push(candidate);
            continue;
        }

        match repository.remove(entry) {
            Ok(()) => {
                info!("Removed {}/{} ({})", entry.tier, entry.name, candidate.reason);
                report.freed_bytes += entry.size_bytes;
                report.removed.push(candidate);
            }
            Err(e) => {
                warn!("Failed to remove {}: {}", entry.path, e);
                report.failed.push((candidate.entry, e.to_string()));
            }
        }
    }

    Ok(report)
}

/// Picks the tier of a scheduled backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPlanner {
    pub promote: bool,
}

impl Default for TierPlanner {
    fn default() -> Self {
        Self { promote: true }
    }
}

impl TierPlanner {
    pub fn new(promote: bool) -> Self {
        Self { promote }
    }

    /// `monthly` when none exists this calendar month, else `weekly` when none
    /// exists this ISO week, else `daily`
    pub fn plan(&self, entries: &[CatalogEntry], now: DateTime<Utc>) -> Tier {
        if !self.promote {
            return Tier::Daily;
        }

        let has = |tier: Tier, same_period: &dyn Fn(DateTime<Utc>) -> bool| {
            entries
                .iter()
                .any(|e| e.tier == tier && same_period(e.modified))
        };

        if !has(Tier::Monthly, &|t| {
            t.year() == now.year() && t.month() == now.month()
        }) {
            Tier::Monthly
        } else if !has(Tier::Weekly, &|t| t.iso_week() == now.iso_week()) {
            Tier::Weekly
        } else {
            Tier::Daily
        }
    }
}
