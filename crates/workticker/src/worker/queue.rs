//! External access to the job queue
//!
//! The ticker is the pool's own producer; a [`WorkSubmitter`] lets anything
//! else queue items onto the same bounded channel.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use super::load::LoadTracker;
use crate::error::SubmitError;
use crate::work::WorkItem;

/// Cloneable handle for queueing work directly onto a pool
///
/// Obtained from [`WorkTicker::submitter`](super::WorkTicker::submitter).
/// Items go through the same dispatcher as retrieved ones, so the dispatch
/// policy and the concurrency bound apply to them too.
pub struct WorkSubmitter<T> {
    tx: mpsc::Sender<WorkItem<T>>,
    shutdown: CancellationToken,
    load: Arc<LoadTracker>,
}

impl<T> WorkSubmitter<T> {
    pub(crate) fn new(
        tx: mpsc::Sender<WorkItem<T>>,
        shutdown: CancellationToken,
        load: Arc<LoadTracker>,
    ) -> Self {
        Self { tx, shutdown, load }
    }

    /// Queue `item`, waiting for room in the job queue
    ///
    /// Returns the item inside [`SubmitError::ShuttingDown`] once the pool
    /// has begun draining, or [`SubmitError::Closed`] once it has stopped.
    ///
    /// Only a running pool empties the queue. On a pool that has not been
    /// started yet this waits until [`run`](super::WorkTicker::run) begins,
    /// forever if it never does; use [`try_submit`](Self::try_submit) or
    /// wrap the call in a timeout when that matters.
    pub async fn submit(&self, item: WorkItem<T>) -> Result<(), SubmitError<T>> {
        if self.shutdown.is_cancelled() {
            return Err(self.refusal(item));
        }

        let permit = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(self.refusal(item)),
            permit = self.tx.reserve() => permit,
        };

        match permit {
            Ok(permit) => {
                self.load.work_queued();
                permit.send(item);
                Ok(())
            }
            Err(_) => Err(SubmitError::Closed(item)),
        }
    }

    /// Queue `item` only if there is room right now
    pub fn try_submit(&self, item: WorkItem<T>) -> Result<(), SubmitError<T>> {
        if self.shutdown.is_cancelled() {
            return Err(self.refusal(item));
        }

        self.load.work_queued();
        self.tx.try_send(item).map_err(|err| {
            self.load.work_settled();
            match err {
                TrySendError::Full(item) => SubmitError::Full(item),
                TrySendError::Closed(item) => SubmitError::Closed(item),
            }
        })
    }

    /// Whether the pool has stopped accepting work
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.tx.is_closed()
    }

    fn refusal(&self, item: WorkItem<T>) -> SubmitError<T> {
        if self.tx.is_closed() {
            SubmitError::Closed(item)
        } else {
            SubmitError::ShuttingDown(item)
        }
    }
}

impl<T> Clone for WorkSubmitter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shutdown: self.shutdown.clone(),
            load: Arc::clone(&self.load),
        }
    }
}

impl<T> std::fmt::Debug for WorkSubmitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkSubmitter")
            .field("closed", &self.is_closed())
            .finish()
    }
}
