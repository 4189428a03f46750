//! Quiescence tracking for mailboxes and asynchronous deliveries.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Counts work in flight and wakes waiters when it drops to zero.
#[derive(Debug, Default)]
pub(crate) struct IdleTracker {
    pending: AtomicUsize,
    started: AtomicU64,
    notify: Notify,
}

impl IdleTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Units of work ever begun.
    pub(crate) fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub(crate) async fn wait_idle(&self) {
        loop {
            // Registered before the check so a concurrent `end` cannot be missed.
            let notified = self.notify.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Wait until idle; `false` when `timeout` elapsed first.
    pub(crate) async fn wait_idle_for(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_pending_work() {
        let tracker = IdleTracker::new();
        assert!(tracker.is_idle());

        tracker.begin();
        tracker.begin();
        assert_eq!(tracker.pending(), 2);

        tracker.end();
        tracker.end();
        assert!(tracker.is_idle());
        assert_eq!(tracker.started(), 2);
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_idle() {
        let tracker = IdleTracker::new();
        assert!(tracker.wait_idle_for(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn wait_times_out_while_busy() {
        let tracker = IdleTracker::new();
        tracker.begin();
        assert!(!tracker.wait_idle_for(Duration::from_millis(20)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn wait_wakes_when_work_ends() {
        let tracker = Arc::new(IdleTracker::new());
        tracker.begin();

        let worker = Arc::clone(&tracker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            worker.end();
        });

        assert!(tracker.wait_idle_for(Duration::from_secs(5)).await);
    }
}
