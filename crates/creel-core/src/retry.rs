//! Retry policy and execution for idempotent store operations
//!
//! Only reads are retried. Writes during restore are never replayed because a
//! partially applied batch cannot be told apart from one that never landed.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy for an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            strategy: RetryStrategy::None,
            ..Self::default()
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    10000
}

/// Retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// No delay between attempts
    None,

    /// Fixed delay between retries
    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,

    /// Linear backoff
    LinearBackoff,
}

/// Calculate the delay before the next attempt
///
/// `attempt` is 1-indexed: the delay after the first failure is
/// `calculate_delay(policy, 1, ..)`. Jitter adds up to 25% on top of the
/// capped delay.
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::FixedDelay => policy.initial_delay_ms,
        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.backoff_multiplier.powf(attempt_index as f64);
            (policy.initial_delay_ms as f64 * multiplier) as u64
        }
        RetryStrategy::LinearBackoff => policy.initial_delay_ms * (attempt_index as u64 + 1),
    };

    let capped_delay_ms = base_delay_ms.min(policy.max_delay_ms);

    let final_delay_ms = if jitter && capped_delay_ms > 0 {
        let jitter_range = capped_delay_ms / 4;
        capped_delay_ms + rand::rng().random_range(0..=jitter_range)
    } else {
        capped_delay_ms
    };

    Duration::from_millis(final_delay_ms)
}

/// Run `op` until it succeeds, the error is not retryable, or the policy's
/// attempts are used up. The last error is returned unchanged.
pub async fn retry_with_policy<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = calculate_delay(policy, attempt, true);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {}ms",
                    operation,
                    attempt,
                    max_attempts,
                    err,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            strategy: RetryStrategy::FixedDelay,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_exponential_delay_without_jitter() {
        let policy = RetryPolicy::default();
        assert_eq!(calculate_delay(&policy, 1, false).as_millis(), 500);
        assert_eq!(calculate_delay(&policy, 2, false).as_millis(), 1000);
        assert_eq!(calculate_delay(&policy, 3, false).as_millis(), 2000);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(calculate_delay(&policy, 20, false).as_millis(), 10000);
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::FixedDelay,
            initial_delay_ms: 1000,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let ms = calculate_delay(&policy, 1, true).as_millis();
            assert!((1000..=1250).contains(&ms), "delay {} out of range", ms);
        }
    }

    #[test]
    fn test_linear_and_none() {
        let mut policy = RetryPolicy {
            strategy: RetryStrategy::LinearBackoff,
            initial_delay_ms: 100,
            ..RetryPolicy::default()
        };
        assert_eq!(calculate_delay(&policy, 3, false).as_millis(), 300);
        policy.strategy = RetryStrategy::None;
        assert_eq!(calculate_delay(&policy, 3, false).as_millis(), 0);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> =
            retry_with_policy(&fast_policy(3), "fetch", |_| true, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("transient {}", n))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> =
            retry_with_policy(&fast_policy(5), "fetch", |_| false, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("permanent".to_string())
            })
            .await;
        assert_eq!(result, Err("permanent".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> =
            retry_with_policy(&fast_policy(2), "fetch", |_| true, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {}", n))
            })
            .await;
        assert_eq!(result, Err("failure 2".to_string()));
    }

    #[test]
    fn test_policy_yaml_kebab_case() {
        let policy: RetryPolicy =
            serde_yaml_ng::from_str("max-attempts: 5\nstrategy: linear-backoff\n").unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.strategy, RetryStrategy::LinearBackoff);
        assert_eq!(policy.initial_delay_ms, 500);
    }
}
