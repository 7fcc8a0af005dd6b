//! Periodic work retrieval
//!
//! On every tick each registered [`WorkConfiguration`] is asked for one item,
//! in registration order. Items go onto the job queue; sending may wait while
//! the dispatcher is busy, which throttles retrieval to dispatch capacity.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::load::LoadTracker;
use super::panic_message;
use super::report::ErrorReporter;
use crate::error::{RetrieveError, WorkError};
use crate::work::{WorkConfiguration, WorkItem};

pub(crate) struct Ticker<T> {
    source_name: Arc<str>,
    tick_frequency: Duration,
    configs: Vec<WorkConfiguration<T>>,
    jobs: mpsc::Sender<WorkItem<T>>,
    reporter: ErrorReporter<T>,
    load: Arc<LoadTracker>,
}

impl<T> Ticker<T>
where
    T: Send + 'static,
{
    pub(crate) fn new(
        source_name: Arc<str>,
        tick_frequency: Duration,
        configs: Vec<WorkConfiguration<T>>,
        jobs: mpsc::Sender<WorkItem<T>>,
        reporter: ErrorReporter<T>,
        load: Arc<LoadTracker>,
    ) -> Self {
        Self {
            source_name,
            tick_frequency,
            configs,
            jobs,
            reporter,
            load,
        }
    }

    /// Tick until cancelled
    pub(crate) async fn run(self, cancel: CancellationToken) {
        debug!(
            pool = %self.source_name,
            tick_ms = self.tick_frequency.as_millis() as u64,
            configurations = self.configs.len(),
            "Starting ticker"
        );

        let mut interval = interval_at(Instant::now() + self.tick_frequency, self.tick_frequency);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'ticks: loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            for config in &self.configs {
                // The retriever's synchronous part runs when it is called,
                // so the call happens inside the unwind boundary.
                let retrieval = AssertUnwindSafe(async { config.retrieve().await }).catch_unwind();
                let retrieved = tokio::select! {
                    _ = cancel.cancelled() => break 'ticks,
                    retrieved = retrieval => retrieved,
                };

                let item = match retrieved {
                    Ok(Ok(item)) => item,
                    Ok(Err(RetrieveError::NoWorkAvailable)) => {
                        trace!(pool = %self.source_name, "No work available");
                        continue;
                    }
                    Ok(Err(err)) => {
                        self.retrieval_failed(format!("{err:#}"));
                        continue;
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        self.retrieval_failed(format!("retriever panicked: {message}"));
                        continue;
                    }
                };

                self.load.work_queued();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.load.work_settled();
                        break 'ticks;
                    }
                    sent = self.jobs.send(item) => {
                        if sent.is_err() {
                            self.load.work_settled();
                            debug!(pool = %self.source_name, "Ticker: job queue closed");
                            break 'ticks;
                        }
                        self.load.record_retrieved();
                    }
                }
            }
        }

        debug!(pool = %self.source_name, "Ticker exited");
    }

    fn retrieval_failed(&self, message: String) {
        self.load.record_retrieval_error();
        error!(pool = %self.source_name, error = %message, "Error retrieving work");
        self.reporter.report(WorkError::Retrieval {
            source_name: self.source_name.to_string(),
            message,
        });
    }
}
