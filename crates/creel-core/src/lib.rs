//! # creel-core
//!
//! Core library for creel providing:
//! - Configuration file parsing (creel.yaml) with environment overrides
//! - Retry policy and execution for idempotent store reads

pub mod config;
pub mod error;
pub mod retry;
pub mod utils;

pub use config::{ConfigLoader, CreelConfig};
pub use error::{Error, Result};
pub use retry::{calculate_delay, retry_with_policy, RetryPolicy, RetryStrategy};
pub use utils::get_home_dir;
