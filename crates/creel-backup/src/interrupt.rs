//! Operator interrupt handling
//!
//! Restore and the scheduler only look at the flag at safe points (between
//! tables, between runs), so a first Ctrl-C never cuts a table in half.
//! A second Ctrl-C exits the process immediately.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// Exit status used when the operator forces a quit
pub const FORCED_EXIT_CODE: i32 = 130;

/// What a received interrupt signal should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: stop at the next safe point
    StopAtSafePoint,
    /// Repeated signal: leave now
    ForceQuit,
}

/// Shared flag set when the operator asks to stop
#[derive(Debug, Clone)]
pub struct InterruptFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for InterruptFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptFlag {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record a received signal and report what the caller should do with it
    pub fn on_signal(&self) -> SignalAction {
        if self.tx.send_replace(true) {
            SignalAction::ForceQuit
        } else {
            SignalAction::StopAtSafePoint
        }
    }

    /// Set the flag on the first Ctrl-C and exit the process on the second.
    /// Must be called inside a tokio runtime.
    pub fn listen_for_ctrl_c(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match flag.on_signal() {
                    SignalAction::StopAtSafePoint => {
                        warn!("Interrupt received, stopping at the next safe point (Ctrl-C again to force quit)");
                    }
                    SignalAction::ForceQuit => {
                        warn!("Second interrupt received, exiting now");
                        std::process::exit(FORCED_EXIT_CODE);
                    }
                }
            }
        });
    }

    /// Resolves once the flag is set
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so this only returns once set.
        let _ = rx.wait_for(|set| *set).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_triggered_resolves_after_trigger() {
        let flag = InterruptFlag::new();
        assert!(!flag.is_triggered());
        let clone = flag.clone();
        clone.trigger();
        flag.triggered().await;
        assert!(flag.is_triggered());
    }

    #[tokio::test]
    async fn test_waiter_is_woken_by_trigger() {
        let flag = InterruptFlag::new();
        let waiter = tokio::spawn({
            let flag = flag.clone();
            async move { flag.triggered().await }
        });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        flag.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter was not woken")
            .unwrap();
    }

    #[test]
    fn test_second_signal_forces_quit() {
        let flag = InterruptFlag::new();
        assert_eq!(flag.on_signal(), SignalAction::StopAtSafePoint);
        assert!(flag.is_triggered());
        assert_eq!(flag.on_signal(), SignalAction::ForceQuit);
        assert_eq!(flag.on_signal(), SignalAction::ForceQuit);
    }
}
