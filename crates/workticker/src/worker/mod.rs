//! Worker pool with periodic work retrieval
//!
//! This module provides:
//! - [`WorkTicker`] - Pool orchestrator and lifecycle
//! - [`WorkSubmitter`] - Direct access to the job queue for external producers
//! - [`PoolStats`] - Load and outcome counters
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         WorkTicker                           │
//! │  ┌──────────────┐                  ┌──────────────────────┐  │
//! │  │    Ticker    │                  │   WorkSubmitter(s)   │  │
//! │  │ (every tick, │                  │  (external producers)│  │
//! │  │  retrievers) │                  └──────────┬───────────┘  │
//! │  └──────┬───────┘                             │              │
//! │         ▼                                     ▼              │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │            Job queue (bounded, capacity 1)           │    │
//! │  └──────────────────────────┬───────────────────────────┘    │
//! │                             ▼                                │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │   Dispatcher  (bounded wait or wait forever)         │◄─┐ │
//! │  └──────────────────────────┬───────────────────────────┘  │ │
//! │                             ▼                              │ │
//! │  ┌──────────────────────────────────────────────────────┐  │ │
//! │  │  Workers  [0] [1] [2] ... [N-1]   ── RateLimiter      │  │ │
//! │  └──────────────────────────┬───────────────────────────┘  │ │
//! │                             └── availability queue ────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handler and retrieval failures, and items no worker could take in time,
//! are delivered on the optional error channel as [`WorkError`](crate::WorkError).

mod dispatcher;
mod executor;
mod load;
mod pool;
mod queue;
mod report;
mod ticker;

pub use load::PoolStats;
pub use pool::{PoolStatus, WorkTicker};
pub use queue::WorkSubmitter;

/// Text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
