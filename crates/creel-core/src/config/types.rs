//! Configuration types
//!
//! Every section has serde defaults so a partial `creel.yaml` only needs to
//! name the settings it changes.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Complete creel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreelConfig {
    /// Connection settings for the relational and object stores
    #[serde(default)]
    pub store: StoreConfig,

    /// Tables captured by every backup, in capture order
    #[serde(default = "default_tables")]
    pub tables: Vec<String>,

    /// Storage buckets listed by every backup
    #[serde(default = "default_buckets")]
    pub buckets: Vec<BucketSpec>,

    /// Backup repository settings
    #[serde(default)]
    pub backup: BackupSettings,

    /// Per-tier retention bounds
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Timed backup settings
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Retry policy for idempotent store reads
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for CreelConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            tables: default_tables(),
            buckets: default_buckets(),
            backup: BackupSettings::default(),
            retention: RetentionConfig::default(),
            schedule: ScheduleConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_tables() -> Vec<String> {
    [
        "profiles",
        "fishing_locations",
        "fish_species",
        "records",
        "record_images",
        "record_videos",
        "fishing_shops",
        "parking_spots",
        "educational_content",
        "analytics_events",
        "user_sessions",
        "admin_actions",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

fn default_buckets() -> Vec<BucketSpec> {
    vec![BucketSpec::new("avatars"), BucketSpec::new("thumbnails")]
}

/// Store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    /// Project base URL (e.g. https://xyz.supabase.co)
    #[serde(default)]
    pub url: Option<String>,

    /// Service role key. Read from the environment or the config file,
    /// never written back out.
    #[serde(default, skip_serializing)]
    pub service_key: Option<String>,

    /// Rows requested per page when reading a table
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Rows sent per insert request during restore
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Column used to express the full-table delete filter
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// User agent string for HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            page_size: default_page_size(),
            insert_batch_size: default_insert_batch_size(),
            timeout_secs: default_timeout_secs(),
            key_column: default_key_column(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_page_size() -> usize {
    1000
}
fn default_insert_batch_size() -> usize {
    500
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_key_column() -> String {
    "id".to_string()
}
fn default_user_agent() -> String {
    format!(
        "creel/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// A storage bucket to list, optionally scoped to a prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BucketSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl BucketSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

/// Backup repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackupSettings {
    /// Root directory holding one subdirectory per tier
    #[serde(default = "default_backup_root")]
    pub root: Utf8PathBuf,

    /// Maximum number of tables/buckets fetched at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Description stored in every document's metadata
    #[serde(default = "default_description")]
    pub description: String,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            root: default_backup_root(),
            concurrency: default_concurrency(),
            description: default_description(),
        }
    }
}

fn default_backup_root() -> Utf8PathBuf {
    Utf8PathBuf::from("database-backups")
}
fn default_concurrency() -> usize {
    4
}
fn default_description() -> String {
    "Full backup of the Fish Trophy database".to_string()
}

/// Retention bounds for a single tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TierRetention {
    /// Backups older than this many days are pruned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,

    /// Only this many of the newest backups are kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<usize>,
}

impl TierRetention {
    pub fn days(days: u32) -> Self {
        Self {
            max_age_days: Some(days),
            max_count: None,
        }
    }

    pub fn count(count: usize) -> Self {
        Self {
            max_age_days: None,
            max_count: Some(count),
        }
    }
}

/// Retention bounds for every tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetentionConfig {
    #[serde(default = "default_emergency_retention")]
    pub emergency: TierRetention,

    #[serde(default = "default_daily_retention")]
    pub daily: TierRetention,

    #[serde(default = "default_weekly_retention")]
    pub weekly: TierRetention,

    #[serde(default = "default_monthly_retention")]
    pub monthly: TierRetention,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            emergency: default_emergency_retention(),
            daily: default_daily_retention(),
            weekly: default_weekly_retention(),
            monthly: default_monthly_retention(),
        }
    }
}

fn default_emergency_retention() -> TierRetention {
    TierRetention::days(1)
}
fn default_daily_retention() -> TierRetention {
    TierRetention::days(7)
}
fn default_weekly_retention() -> TierRetention {
    TierRetention::count(4)
}
fn default_monthly_retention() -> TierRetention {
    TierRetention::count(12)
}

/// Timed backup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScheduleConfig {
    /// Minutes between scheduled backups
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Promote scheduled runs to the weekly/monthly tiers when those are due
    #[serde(default = "default_promote_tiers")]
    pub promote_tiers: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            promote_tiers: default_promote_tiers(),
        }
    }
}

fn default_interval_minutes() -> u64 {
    60
}
fn default_promote_tiers() -> bool {
    true
}
