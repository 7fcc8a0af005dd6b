//! Error types
//!
//! Two families live here:
//! - lifecycle errors returned directly to the caller ([`PoolError`],
//!   [`ConfigError`], [`SubmitError`])
//! - work errors surfaced asynchronously on the pool's error channel
//!   ([`WorkError`], [`HandleWorkError`])
//!
//! [`RetrieveError`] is what a retriever returns; its `NoWorkAvailable`
//! variant is not a failure and never reaches the error channel.

use std::fmt;

use crate::work::{WorkItem, WorkerId};

/// Errors returned by a work retriever
#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    /// Nothing to do this tick. Swallowed by the ticker.
    #[error("no work available")]
    NoWorkAvailable,

    /// Retrieval failed for any other reason
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl RetrieveError {
    /// Build a retrieval failure from any displayable message
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(anyhow::anyhow!("{message}"))
    }

    /// Whether this is the "nothing to do" outcome
    pub fn is_no_work(&self) -> bool {
        matches!(self, Self::NoWorkAvailable)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A count or duration that must be positive was zero
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    /// The pool name was empty
    #[error("pool name must not be empty")]
    EmptyName,

    /// An environment variable could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
}

/// Pool lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// `run` was already called, or a configuration was added after it
    #[error("work ticker has already been started")]
    AlreadyStarted,

    /// The pool configuration is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// A handler invocation failed
///
/// Carries everything needed to retry the unit externally: the worker that
/// ran it, the payload, the failure message, and the name of the
/// pool it ran in. Never retried internally.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{source_name}] error handling work in worker ID {worker_id}: {message}")]
pub struct HandleWorkError<T> {
    /// Worker that executed the handler
    pub worker_id: WorkerId,
    /// Payload the handler was given
    pub data: T,
    /// Rendered handler error
    pub message: String,
    /// Name of the pool that ran the work
    pub source_name: String,
}

impl<T> HandleWorkError<T> {
    /// Create a new handler error
    pub fn new(
        message: impl Into<String>,
        worker_id: WorkerId,
        data: T,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            worker_id,
            data,
            message: message.into(),
            source_name: source_name.into(),
        }
    }
}

/// Errors delivered on the pool's error channel
///
/// None of these stop the pool.
#[derive(Debug, thiserror::Error)]
pub enum WorkError<T> {
    /// A retriever failed with something other than "no work"
    #[error("[{source_name}] error retrieving work: {message}")]
    Retrieval {
        /// Name of the pool whose retriever failed
        source_name: String,
        /// Rendered retrieval error
        message: String,
    },

    /// No worker became idle within the bounded wait; the item was not run
    #[error("[{source_name}] no workers available")]
    NoAvailableWorkers {
        /// Name of the pool that rejected the item
        source_name: String,
        /// The unexecuted item, ready to be resubmitted
        item: WorkItem<T>,
    },

    /// A handler returned an error or panicked
    #[error(transparent)]
    Handler(#[from] HandleWorkError<T>),
}

impl<T> WorkError<T> {
    /// Name of the pool that produced this error
    pub fn source_name(&self) -> &str {
        match self {
            Self::Retrieval { source_name, .. } => source_name,
            Self::NoAvailableWorkers { source_name, .. } => source_name,
            Self::Handler(err) => &err.source_name,
        }
    }

    /// Payload attached to this error, if any
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Retrieval { .. } => None,
            Self::NoAvailableWorkers { item, .. } => Some(&item.data),
            Self::Handler(err) => Some(&err.data),
        }
    }
}

/// Errors returned by [`WorkSubmitter`](crate::WorkSubmitter)
///
/// Every variant hands the item back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError<T> {
    /// The job queue is full (only from `try_submit`)
    #[error("job queue is full")]
    Full(WorkItem<T>),

    /// The pool is draining
    #[error("work ticker is shutting down")]
    ShuttingDown(WorkItem<T>),

    /// The pool has stopped and the job queue is closed
    #[error("job queue is closed")]
    Closed(WorkItem<T>),
}

impl<T> SubmitError<T> {
    /// Recover the rejected item
    pub fn into_item(self) -> WorkItem<T> {
        match self {
            Self::Full(item) | Self::ShuttingDown(item) | Self::Closed(item) => item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::work_handler;

    fn noop_item(data: u32) -> WorkItem<u32> {
        WorkItem::new(data, work_handler(|_, _: u32, _| async { Ok(()) }))
    }

    #[test]
    fn test_handle_work_error_display() {
        let err = HandleWorkError::new("boom", 3, 42u32, "orders");
        assert_eq!(
            err.to_string(),
            "[orders] error handling work in worker ID 3: boom"
        );
        assert_eq!(err.data, 42);
    }

    #[test]
    fn test_retrieve_error_no_work() {
        assert!(RetrieveError::NoWorkAvailable.is_no_work());
        assert!(!RetrieveError::failed("db down").is_no_work());
        assert_eq!(RetrieveError::failed("db down").to_string(), "db down");
    }

    #[test]
    fn test_work_error_accessors() {
        let err: WorkError<u32> = WorkError::NoAvailableWorkers {
            source_name: "orders".into(),
            item: noop_item(7),
        };
        assert_eq!(err.source_name(), "orders");
        assert_eq!(err.data(), Some(&7));
        assert_eq!(err.to_string(), "[orders] no workers available");

        let err: WorkError<u32> = WorkError::Retrieval {
            source_name: "orders".into(),
            message: "timeout".into(),
        };
        assert_eq!(err.data(), None);
        assert_eq!(err.to_string(), "[orders] error retrieving work: timeout");

        let err: WorkError<u32> = HandleWorkError::new("boom", 1, 9u32, "orders").into();
        assert_eq!(err.data(), Some(&9));
    }

    #[test]
    fn test_payload_needs_no_display() {
        #[derive(Debug, Clone)]
        struct Order {
            id: u32,
        }

        let err: WorkError<Order> =
            HandleWorkError::new("card declined", 2, Order { id: 17 }, "orders").into();
        assert_eq!(
            err.to_string(),
            "[orders] error handling work in worker ID 2: card declined"
        );
        assert_eq!(err.data().map(|order| order.id), Some(17));

        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_submit_error_returns_item() {
        let err = SubmitError::Closed(noop_item(5));
        assert_eq!(err.to_string(), "job queue is closed");
        assert_eq!(err.into_item().data, 5);
    }

    #[test]
    fn test_pool_error_from_config() {
        let err: PoolError = ConfigError::Zero {
            field: "num_workers",
        }
        .into();
        assert_eq!(
            err.to_string(),
            "invalid configuration: num_workers must be greater than zero"
        );
    }
}
