//! Delivery of work errors to the caller's error channel
//!
//! Sends are non-blocking: a full or closed channel never stalls a worker,
//! the dispatcher or the ticker. Undeliverable errors are logged and counted
//! in [`PoolStats::dropped_errors`](super::PoolStats::dropped_errors). With
//! no channel configured every error is dropped this way.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::load::LoadTracker;
use crate::error::WorkError;

pub(crate) struct ErrorReporter<T> {
    tx: Option<mpsc::Sender<WorkError<T>>>,
    load: Arc<LoadTracker>,
}

impl<T> ErrorReporter<T> {
    pub(crate) fn new(tx: Option<mpsc::Sender<WorkError<T>>>, load: Arc<LoadTracker>) -> Self {
        Self { tx, load }
    }

    /// Best-effort delivery of `err`
    pub(crate) fn report(&self, err: WorkError<T>) {
        let Some(tx) = &self.tx else {
            debug!(error = %err, "No error channel configured, dropping error");
            self.load.record_dropped_error();
            return;
        };

        match tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                warn!(error = %err, "Error channel full, dropping error");
                self.load.record_dropped_error();
            }
            Err(TrySendError::Closed(err)) => {
                warn!(error = %err, "Error channel closed, dropping error");
                self.load.record_dropped_error();
            }
        }
    }
}

impl<T> Clone for ErrorReporter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            load: Arc::clone(&self.load),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieval_error(message: &str) -> WorkError<u32> {
        WorkError::Retrieval {
            source_name: "test".into(),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn test_delivers_to_channel() {
        let load = Arc::new(LoadTracker::new(1));
        let (tx, mut rx) = mpsc::channel(4);
        let reporter = ErrorReporter::new(Some(tx), Arc::clone(&load));

        reporter.report(retrieval_error("boom"));

        let err = rx.recv().await.unwrap();
        assert_eq!(err.to_string(), "[test] error retrieving work: boom");
        assert_eq!(load.snapshot().dropped_errors, 0);
    }

    #[test]
    fn test_drops_when_full_or_missing() {
        let load = Arc::new(LoadTracker::new(1));
        let (tx, _rx) = mpsc::channel(1);
        let reporter = ErrorReporter::new(Some(tx), Arc::clone(&load));

        reporter.report(retrieval_error("first"));
        reporter.report(retrieval_error("second"));
        assert_eq!(load.snapshot().dropped_errors, 1);

        let reporter = ErrorReporter::<u32>::new(None, Arc::clone(&load));
        reporter.report(retrieval_error("third"));
        assert_eq!(load.snapshot().dropped_errors, 2);
    }

    #[test]
    fn test_drops_when_closed() {
        let load = Arc::new(LoadTracker::new(1));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let reporter = ErrorReporter::new(Some(tx), Arc::clone(&load));

        reporter.report(retrieval_error("late"));
        assert_eq!(load.snapshot().dropped_errors, 1);
    }
}
