//! Work ticker orchestration
//!
//! [`WorkTicker`] owns the configuration, the shared rate limiter and the job
//! queue, and wires workers, the dispatcher and the ticker together for the
//! duration of [`WorkTicker::run`].

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::dispatcher::Dispatcher;
use super::executor::{Worker, WorkerContext};
use super::load::{LoadTracker, PoolStats};
use super::queue::WorkSubmitter;
use super::report::ErrorReporter;
use super::ticker::Ticker;
use crate::config::PoolConfig;
use crate::error::{PoolError, WorkError};
use crate::limiter::RateLimiter;
use crate::work::{WorkConfiguration, WorkItem};

/// Work ticker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    /// Built, accepting work configurations, not yet running
    Created,
    /// Ticking and dispatching
    Running,
    /// Cancelled; waiting for in-flight handlers to return
    Draining,
    /// Every task has exited
    Stopped,
}

/// A bounded worker pool fed by periodic work retrieval
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use workticker::prelude::*;
///
/// # async fn example() -> Result<(), PoolError> {
/// let pool = Arc::new(WorkTicker::<u64>::new(
///     PoolConfig::new("orders").with_num_workers(4),
/// ));
///
/// pool.add_work_configuration(WorkConfiguration::new(
///     work_retriever(|_handler| async move {
///         // Ask the upstream source for the next order
///         Err(RetrieveError::NoWorkAvailable)
///     }),
///     work_handler(|worker_id, order_id, limiter| async move {
///         limiter.take().await;
///         println!("worker {worker_id} handling order {order_id}");
///         Ok(())
///     }),
/// ))?;
///
/// let cancel = CancellationToken::new();
/// let running = tokio::spawn({
///     let pool = Arc::clone(&pool);
///     let cancel = cancel.clone();
///     async move { pool.run(cancel).await }
/// });
///
/// // ... later
/// cancel.cancel();
/// # let _ = running.await;
/// # Ok(())
/// # }
/// ```
pub struct WorkTicker<T> {
    config: PoolConfig,
    name: Arc<str>,
    limiter: RateLimiter,
    error_tx: Option<mpsc::Sender<WorkError<T>>>,
    configs: RwLock<Vec<WorkConfiguration<T>>>,
    status: RwLock<PoolStatus>,
    jobs_tx: mpsc::Sender<WorkItem<T>>,
    jobs_rx: Mutex<Option<mpsc::Receiver<WorkItem<T>>>>,
    shutdown: CancellationToken,
    load: Arc<LoadTracker>,
}

impl<T> WorkTicker<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a pool; nothing runs until [`run`](Self::run)
    pub fn new(config: PoolConfig) -> Self {
        // A zero capacity is rejected by `run`; the channel itself needs one slot.
        let (jobs_tx, jobs_rx) = mpsc::channel(config.job_queue_capacity.max(1));

        Self {
            name: Arc::from(config.name.as_str()),
            limiter: RateLimiter::new(config.rate_limit_per_second),
            load: Arc::new(LoadTracker::new(config.num_workers)),
            config,
            error_tx: None,
            configs: RwLock::new(Vec::new()),
            status: RwLock::new(PoolStatus::Created),
            jobs_tx,
            jobs_rx: Mutex::new(Some(jobs_rx)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Deliver work errors on `tx`
    ///
    /// Sends never block; errors that do not fit are logged and counted in
    /// [`PoolStats::dropped_errors`].
    pub fn with_error_channel(mut self, tx: mpsc::Sender<WorkError<T>>) -> Self {
        self.error_tx = Some(tx);
        self
    }

    /// Share an existing rate limiter, e.g. one used by several pools
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Register a retriever and its handler
    ///
    /// Only allowed before the pool starts.
    pub fn add_work_configuration(&self, config: WorkConfiguration<T>) -> Result<(), PoolError> {
        let status = self.status.read();
        if *status != PoolStatus::Created {
            return Err(PoolError::AlreadyStarted);
        }
        self.configs.write().push(config);
        Ok(())
    }

    /// Handle for queueing items directly, bypassing retrieval
    ///
    /// Can be taken before the pool starts. Until [`run`](Self::run) is
    /// called nothing drains the job queue, so once `job_queue_capacity`
    /// items are waiting [`WorkSubmitter::submit`] blocks, forever if the
    /// pool never runs.
    pub fn submitter(&self) -> WorkSubmitter<T> {
        WorkSubmitter::new(
            self.jobs_tx.clone(),
            self.shutdown.clone(),
            Arc::clone(&self.load),
        )
    }

    /// Wait until every queued and running item has been handled
    ///
    /// Counts items from the ticker and from submitters. Rejected and
    /// discarded items count as handled. The pool keeps running; a ticker
    /// that keeps finding work keeps it busy.
    pub async fn wait_idle(&self) {
        self.load.wait_idle().await;
    }

    /// Run the pool until `cancel` fires
    ///
    /// Returns once every worker has finished its in-flight handler. A pool
    /// runs at most once.
    ///
    /// Dropping the returned future instead of cancelling stops the ticker
    /// and dispatcher and aborts handlers that are still running. The pool
    /// is marked [`PoolStatus::Stopped`] either way.
    #[instrument(skip(self, cancel), fields(pool = %self.name))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PoolError> {
        self.config.validate()?;

        let jobs_rx = {
            let mut status = self.status.write();
            if *status != PoolStatus::Created {
                return Err(PoolError::AlreadyStarted);
            }
            let jobs_rx = self.jobs_rx.lock().take().ok_or(PoolError::AlreadyStarted)?;
            *status = PoolStatus::Running;
            jobs_rx
        };
        let configs = self.configs.read().clone();

        info!(
            pool = %self.name,
            num_workers = self.config.num_workers,
            rate_limit_per_second = self.config.rate_limit_per_second,
            tick_ms = self.config.tick_frequency.as_millis() as u64,
            configurations = configs.len(),
            "Starting work ticker"
        );

        // Both guards act if this future is dropped mid-run: the first stops
        // the ticker and dispatcher, the second marks the pool stopped.
        let _stopped_guard = StoppedGuard {
            status: &self.status,
            load: &self.load,
        };
        let _shutdown_guard = self.shutdown.clone().drop_guard();
        let workers_cancel = CancellationToken::new();
        let reporter = ErrorReporter::new(self.error_tx.clone(), Arc::clone(&self.load));

        let (idle_tx, idle_rx) = mpsc::channel(self.config.num_workers);
        let ctx = WorkerContext {
            source_name: Arc::clone(&self.name),
            idle_tx,
            limiter: self.limiter.clone(),
            reporter: reporter.clone(),
            load: Arc::clone(&self.load),
        };

        let mut workers = JoinSet::new();
        for id in 0..self.config.num_workers {
            workers.spawn(Worker::hire(id, ctx.clone()).run(workers_cancel.clone()));
        }
        drop(ctx);

        let dispatcher = tokio::spawn(
            Dispatcher::new(
                Arc::clone(&self.name),
                self.config.dispatch,
                idle_rx,
                reporter.clone(),
                Arc::clone(&self.load),
            )
            .run(jobs_rx, self.shutdown.clone()),
        );

        let ticker = tokio::spawn(
            Ticker::new(
                Arc::clone(&self.name),
                self.config.tick_frequency,
                configs,
                self.jobs_tx.clone(),
                reporter,
                Arc::clone(&self.load),
            )
            .run(self.shutdown.clone()),
        );

        cancel.cancelled().await;

        info!(
            pool = %self.name,
            in_flight = self.load.current_load(),
            "Initiating graceful shutdown"
        );
        *self.status.write() = PoolStatus::Draining;
        self.shutdown.cancel();

        if let Err(e) = ticker.await {
            error!(pool = %self.name, error = %e, "Ticker task failed");
        }

        let jobs_rx = match dispatcher.await {
            Ok(jobs_rx) => Some(jobs_rx),
            Err(e) => {
                error!(pool = %self.name, error = %e, "Dispatcher task failed");
                None
            }
        };

        workers_cancel.cancel();
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(pool = %self.name, error = %e, "Worker task failed");
            }
        }

        // The ticker has stopped, so nothing internal still sends on the queue.
        // Closing it turns later submissions into `SubmitError::Closed`.
        if let Some(mut jobs_rx) = jobs_rx {
            jobs_rx.close();
            let mut discarded = 0usize;
            while jobs_rx.try_recv().is_ok() {
                self.load.work_settled();
                discarded += 1;
            }
            if discarded > 0 {
                debug!(pool = %self.name, discarded, "Discarded undispatched work items");
            }
        }

        *self.status.write() = PoolStatus::Stopped;
        info!(pool = %self.name, stats = ?self.load.snapshot(), "Work ticker stopped");

        Ok(())
    }

    /// Current lifecycle state
    pub fn status(&self) -> PoolStatus {
        *self.status.read()
    }

    /// Snapshot of the pool's counters
    pub fn stats(&self) -> PoolStats {
        self.load.snapshot()
    }

    /// Handlers running right now
    pub fn current_load(&self) -> usize {
        self.load.current_load()
    }

    /// Whether the pool is running and taking new work
    pub fn is_accepting(&self) -> bool {
        self.status() == PoolStatus::Running
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rate limiter handed to every handler
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Configuration the pool was built with
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

/// Marks a pool stopped when `run` ends, including when it is dropped
struct StoppedGuard<'a> {
    status: &'a RwLock<PoolStatus>,
    load: &'a LoadTracker,
}

impl Drop for StoppedGuard<'_> {
    fn drop(&mut self) {
        *self.status.write() = PoolStatus::Stopped;
        // Aborted handlers never settle their items
        self.load.clear_outstanding();
    }
}

impl<T> std::fmt::Debug for WorkTicker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkTicker")
            .field("name", &self.name)
            .field("status", &*self.status.read())
            .field("configurations", &self.configs.read().len())
            .finish_non_exhaustive()
    }
}
