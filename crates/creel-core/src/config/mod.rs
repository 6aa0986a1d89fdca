//! Configuration loading and types

mod loader;
mod types;

pub use loader::{ConfigLoader, CONFIG_FILE_NAMES};
pub use types::{
    BackupSettings, BucketSpec, CreelConfig, RetentionConfig, ScheduleConfig, StoreConfig,
    TierRetention,
};
