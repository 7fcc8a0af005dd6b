//! Dispatch loop
//!
//! Pulls items off the job queue and assigns each to an idle worker. How long
//! it waits for a worker is governed by the pool's [`DispatchPolicy`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::executor::WorkerHandle;
use super::load::LoadTracker;
use super::report::ErrorReporter;
use crate::config::DispatchPolicy;
use crate::error::WorkError;
use crate::work::WorkItem;

pub(crate) struct Dispatcher<T> {
    source_name: Arc<str>,
    policy: DispatchPolicy,
    idle_rx: mpsc::Receiver<WorkerHandle<T>>,
    reporter: ErrorReporter<T>,
    load: Arc<LoadTracker>,
}

impl<T> Dispatcher<T>
where
    T: Send + 'static,
{
    pub(crate) fn new(
        source_name: Arc<str>,
        policy: DispatchPolicy,
        idle_rx: mpsc::Receiver<WorkerHandle<T>>,
        reporter: ErrorReporter<T>,
        load: Arc<LoadTracker>,
    ) -> Self {
        Self {
            source_name,
            policy,
            idle_rx,
            reporter,
            load,
        }
    }

    /// Dispatch until cancelled or the job queue closes
    ///
    /// Hands the job queue receiver back so the caller can close and drain it
    /// once every producer has stopped.
    pub(crate) async fn run(
        mut self,
        mut jobs: mpsc::Receiver<WorkItem<T>>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<WorkItem<T>> {
        debug!(pool = %self.source_name, policy = ?self.policy, "Starting dispatcher");

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(pool = %self.source_name, "Dispatcher: shutdown requested");
                    break;
                }
                item = jobs.recv() => match item {
                    Some(item) => item,
                    None => {
                        debug!(pool = %self.source_name, "Dispatcher: job queue closed");
                        break;
                    }
                },
            };

            let acquired = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(
                        pool = %self.source_name,
                        "Dispatcher: shutdown requested while waiting for a worker, dropping item"
                    );
                    self.load.work_settled();
                    break;
                }
                acquired = self.acquire_worker() => acquired,
            };

            match acquired {
                Some(worker) => {
                    let worker_id = worker.id();
                    match worker.do_job(item) {
                        Ok(()) => {
                            trace!(worker_id, "Dispatched work item");
                            self.load.record_dispatched();
                        }
                        Err(item) => {
                            warn!(worker_id, "Worker exited before taking its job");
                            self.reject(item);
                        }
                    }
                }
                None => self.reject(item),
            }
        }

        debug!(pool = %self.source_name, "Dispatcher exited");
        jobs
    }

    /// Wait for an idle worker as the dispatch policy allows
    async fn acquire_worker(&mut self) -> Option<WorkerHandle<T>> {
        match self.policy {
            DispatchPolicy::WaitForever => self.idle_rx.recv().await,
            DispatchPolicy::BoundedWait { max_worker_wait } => {
                self.acquire_within(max_worker_wait).await
            }
        }
    }

    async fn acquire_within(&mut self, max_worker_wait: Duration) -> Option<WorkerHandle<T>> {
        match tokio::time::timeout(max_worker_wait, self.idle_rx.recv()).await {
            Ok(worker) => worker,
            Err(_) => {
                warn!(
                    pool = %self.source_name,
                    waited_ms = max_worker_wait.as_millis() as u64,
                    "No workers available"
                );
                None
            }
        }
    }

    /// Give an unexecuted item back to the caller via the error channel
    fn reject(&self, item: WorkItem<T>) {
        self.load.record_rejected();
        self.load.work_settled();
        self.reporter.report(WorkError::NoAvailableWorkers {
            source_name: self.source_name.to_string(),
            item,
        });
    }
}
