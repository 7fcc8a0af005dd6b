//! Load tracking for a work ticker
//!
//! Lock-free counters shared by the dispatcher, the ticker and every worker.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::Notify;

/// Point-in-time view of a pool's activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Number of workers in the pool
    pub num_workers: usize,
    /// Handlers running right now
    pub active: usize,
    /// Highest number of handlers ever running at once
    pub peak_active: usize,
    /// Items queued or running that have not been settled yet
    pub outstanding: usize,
    /// Items successfully retrieved by the ticker
    pub retrieved: u64,
    /// Items handed to a worker
    pub dispatched: u64,
    /// Handler invocations that returned `Ok`
    pub succeeded: u64,
    /// Handler invocations that returned `Err` or panicked
    pub failed: u64,
    /// Items rejected because no worker became idle in time
    pub rejected: u64,
    /// Retrieval attempts that failed
    pub retrieval_errors: u64,
    /// Errors that could not be delivered on the error channel
    pub dropped_errors: u64,
}

/// Shared activity counters
///
/// Uses atomic operations for thread-safe access without locks.
#[derive(Debug)]
pub(crate) struct LoadTracker {
    num_workers: usize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    outstanding: AtomicUsize,
    settled: Notify,
    retrieved: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    retrieval_errors: AtomicU64,
    dropped_errors: AtomicU64,
}

impl LoadTracker {
    pub(crate) fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
            settled: Notify::new(),
            retrieved: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            retrieval_errors: AtomicU64::new(0),
            dropped_errors: AtomicU64::new(0),
        }
    }

    /// Record that a handler has started
    pub(crate) fn task_started(&self) {
        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_active.fetch_max(active, Ordering::Relaxed);
    }

    /// Record that a handler has returned
    pub(crate) fn task_completed(&self, succeeded: bool) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        if succeeded {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record that an item entered the job queue
    pub(crate) fn work_queued(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// Record that an item left the pool: handled, rejected or discarded
    pub(crate) fn work_settled(&self) {
        let previous = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or_else(|previous| previous);
        if previous <= 1 {
            self.settled.notify_waiters();
        }
    }

    /// Forget every outstanding item and wake all waiters
    pub(crate) fn clear_outstanding(&self) {
        self.outstanding.store(0, Ordering::SeqCst);
        self.settled.notify_waiters();
    }

    /// Wait until no item is queued or running
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            // Register before checking so a settle in between is not missed
            notified.as_mut().enable();

            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn record_retrieved(&self) {
        self.retrieved.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retrieval_error(&self) {
        self.retrieval_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_error(&self) {
        self.dropped_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Handlers running right now
    pub(crate) fn current_load(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Take a snapshot of every counter
    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            num_workers: self.num_workers,
            active: self.active.load(Ordering::Relaxed),
            peak_active: self.peak_active.load(Ordering::Relaxed),
            outstanding: self.outstanding.load(Ordering::SeqCst),
            retrieved: self.retrieved.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            retrieval_errors: self.retrieval_errors.load(Ordering::Relaxed),
            dropped_errors: self.dropped_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tracks_active_and_peak() {
        let load = LoadTracker::new(4);

        load.task_started();
        load.task_started();
        load.task_started();
        assert_eq!(load.current_load(), 3);

        load.task_completed(true);
        load.task_completed(false);
        load.task_started();

        let stats = load.snapshot();
        assert_eq!(stats.num_workers, 4);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.peak_active, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_counters() {
        let load = LoadTracker::new(1);

        load.record_retrieved();
        load.record_retrieved();
        load.record_dispatched();
        load.record_rejected();
        load.record_retrieval_error();
        load.record_dropped_error();

        assert_eq!(
            load.snapshot(),
            PoolStats {
                num_workers: 1,
                retrieved: 2,
                dispatched: 1,
                rejected: 1,
                retrieval_errors: 1,
                dropped_errors: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_wait_idle_returns_once_everything_settles() {
        let load = Arc::new(LoadTracker::new(1));

        // Nothing outstanding
        load.wait_idle().await;

        load.work_queued();
        load.work_queued();
        assert_eq!(load.snapshot().outstanding, 2);

        let waiter = tokio::spawn({
            let load = Arc::clone(&load);
            async move { load.wait_idle().await }
        });

        load.work_settled();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        load.work_settled();
        waiter.await.unwrap();
        assert_eq!(load.snapshot().outstanding, 0);
    }

    #[test]
    fn test_settle_never_underflows() {
        let load = LoadTracker::new(1);
        load.work_queued();
        load.clear_outstanding();
        load.work_settled();
        assert_eq!(load.snapshot().outstanding, 0);
    }
}
