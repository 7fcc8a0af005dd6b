//! Workers and the availability queue
//!
//! Each worker is a long-lived task with a one-slot inbox. An idle worker is
//! represented by its [`WorkerHandle`] sitting in the availability queue; the
//! dispatcher takes a handle out, drops one item into that worker's inbox,
//! and the worker puts a fresh handle back once the handler has returned.
//! Since a worker only rejoins after finishing, the queue never holds more
//! than `num_workers` handles and at most `num_workers` handlers run at once.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::load::LoadTracker;
use super::panic_message;
use super::report::ErrorReporter;
use crate::error::{HandleWorkError, WorkError};
use crate::limiter::RateLimiter;
use crate::work::{WorkItem, WorkerId};

/// An idle worker, ready to take exactly one item
pub(crate) struct WorkerHandle<T> {
    id: WorkerId,
    inbox: mpsc::Sender<WorkItem<T>>,
}

impl<T> WorkerHandle<T> {
    pub(crate) fn new(id: WorkerId, inbox: mpsc::Sender<WorkItem<T>>) -> Self {
        Self { id, inbox }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Hand `item` to this worker
    ///
    /// Never waits: an idle worker's inbox is always empty. Gives the item
    /// back if the worker has already exited.
    pub(crate) fn do_job(self, item: WorkItem<T>) -> Result<(), WorkItem<T>> {
        self.inbox.try_send(item).map_err(|err| err.into_inner())
    }
}

/// Everything a worker shares with the rest of the pool
pub(crate) struct WorkerContext<T> {
    pub(crate) source_name: Arc<str>,
    pub(crate) idle_tx: mpsc::Sender<WorkerHandle<T>>,
    pub(crate) limiter: RateLimiter,
    pub(crate) reporter: ErrorReporter<T>,
    pub(crate) load: Arc<LoadTracker>,
}

impl<T> Clone for WorkerContext<T> {
    fn clone(&self) -> Self {
        Self {
            source_name: Arc::clone(&self.source_name),
            idle_tx: self.idle_tx.clone(),
            limiter: self.limiter.clone(),
            reporter: self.reporter.clone(),
            load: Arc::clone(&self.load),
        }
    }
}

/// A single execution unit of the pool
pub(crate) struct Worker<T> {
    id: WorkerId,
    inbox_tx: mpsc::Sender<WorkItem<T>>,
    inbox: mpsc::Receiver<WorkItem<T>>,
    ctx: WorkerContext<T>,
}

impl<T> Worker<T>
where
    T: Clone + Send + 'static,
{
    /// Create a worker; it joins the availability queue once run
    pub(crate) fn hire(id: WorkerId, ctx: WorkerContext<T>) -> Self {
        let (inbox_tx, inbox) = mpsc::channel(1);
        Self {
            id,
            inbox_tx,
            inbox,
            ctx,
        }
    }

    /// Process items until cancelled
    ///
    /// An item already in the inbox when cancellation fires is still run, so
    /// nothing the dispatcher handed over is lost.
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        debug!(worker_id = self.id, pool = %self.ctx.source_name, "Starting worker");
        self.rejoin().await;

        loop {
            let item = tokio::select! {
                biased;
                item = self.inbox.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
                _ = cancel.cancelled() => {
                    debug!(worker_id = self.id, "Worker: shutdown requested");
                    break;
                }
            };

            self.execute(item).await;
            self.ctx.load.work_settled();
            self.rejoin().await;
        }

        debug!(worker_id = self.id, "Worker exited");
    }

    /// Run one item's handler to completion and report a failure
    async fn execute(&self, item: WorkItem<T>) {
        let WorkItem { data, handler } = item;
        let retained = data.clone();

        trace!(worker_id = self.id, "Received work item, calling handler");
        self.ctx.load.task_started();

        // Calling the handler runs its synchronous part, so the call itself
        // goes inside the unwind boundary too.
        let (id, limiter) = (self.id, self.ctx.limiter.clone());
        let outcome = AssertUnwindSafe(async move { handler(id, data, limiter).await })
            .catch_unwind()
            .await;

        let message = match outcome {
            Ok(Ok(())) => {
                self.ctx.load.task_completed(true);
                return;
            }
            Ok(Err(err)) => format!("{err:#}"),
            Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
        };

        self.ctx.load.task_completed(false);
        error!(
            worker_id = self.id,
            pool = %self.ctx.source_name,
            error = %message,
            "Error handling work item"
        );

        self.ctx.reporter.report(WorkError::Handler(HandleWorkError::new(
            message,
            self.id,
            retained,
            self.ctx.source_name.as_ref(),
        )));
    }

    /// Put this worker back in the availability queue
    async fn rejoin(&self) {
        let handle = WorkerHandle::new(self.id, self.inbox_tx.clone());

        // The queue has room for every worker, so this only fails once the
        // dispatcher is gone.
        if self.ctx.idle_tx.send(handle).await.is_err() {
            trace!(worker_id = self.id, "Availability queue closed");
        }
    }
}
