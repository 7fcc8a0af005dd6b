//! # Work Ticker
//!
//! A bounded worker pool fed by periodic, pluggable work retrieval.
//!
//! ## Features
//!
//! - **Bounded concurrency**: a fixed set of workers; at most `num_workers` handlers run at once
//! - **Periodic retrieval**: every tick, each registered retriever is asked for one item
//! - **Bounded-wait dispatch**: items no worker can take in time come back on the error channel
//! - **Shared rate limiting**: one smoothed, FIFO limiter paces handler calls across the pool
//! - **Graceful drain**: cancellation stops retrieval and waits for in-flight handlers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Ticker  /  WorkSubmitter                      │
//! │  (retrievers polled every tick, or items queued directly)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                            │
//! │  (assigns each item to an idle worker, bounded wait)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Workers                              │
//! │  (run handlers, share the RateLimiter, report errors)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use workticker::prelude::*;
//!
//! # async fn example() -> Result<(), PoolError> {
//! let (errors_tx, mut errors_rx) = tokio::sync::mpsc::channel(64);
//! let pool = Arc::new(
//!     WorkTicker::<String>::new(
//!         PoolConfig::new("emails")
//!             .with_num_workers(4)
//!             .with_rate_limit_per_second(20)
//!             .with_tick_frequency(Duration::from_secs(1)),
//!     )
//!     .with_error_channel(errors_tx),
//! );
//!
//! pool.add_work_configuration(WorkConfiguration::new(
//!     work_retriever(|handler| async move {
//!         Ok(WorkItem::new("hello@example.com".to_string(), handler))
//!     }),
//!     work_handler(|_worker_id, address: String, limiter| async move {
//!         limiter.take().await;
//!         println!("sending to {address}");
//!         Ok(())
//!     }),
//! ))?;
//!
//! tokio::spawn(async move {
//!     while let Some(err) = errors_rx.recv().await {
//!         eprintln!("{err}");
//!     }
//! });
//!
//! let cancel = CancellationToken::new();
//! pool.run(cancel).await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod limiter;
pub mod telemetry;
pub mod work;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{DispatchPolicy, PoolConfig};
    pub use crate::error::{
        ConfigError, HandleWorkError, PoolError, RetrieveError, SubmitError, WorkError,
    };
    pub use crate::limiter::RateLimiter;
    pub use crate::work::{
        work_handler, work_retriever, WorkConfiguration, WorkHandler, WorkItem, WorkRetriever,
        WorkerId,
    };
    pub use crate::worker::{PoolStats, PoolStatus, WorkSubmitter, WorkTicker};
    pub use tokio_util::sync::CancellationToken;
}

// Re-export key types at crate root
pub use config::{DispatchPolicy, PoolConfig};
pub use error::{ConfigError, HandleWorkError, PoolError, RetrieveError, SubmitError, WorkError};
pub use limiter::RateLimiter;
pub use work::{
    work_handler, work_retriever, HandlerResult, WorkConfiguration, WorkHandler, WorkItem,
    WorkRetriever, WorkerId,
};
pub use worker::{PoolStats, PoolStatus, WorkSubmitter, WorkTicker};
