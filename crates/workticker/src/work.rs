//! Units of work and the collaborator contracts that produce and consume them

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::RetrieveError;
use crate::limiter::RateLimiter;

/// Identifier of a worker, unique within one pool (`0..num_workers`)
pub type WorkerId = usize;

/// Result of a single handler invocation
pub type HandlerResult = anyhow::Result<()>;

/// Handles a single unit of work
///
/// Invoked with the id of the worker running it, the payload, and the pool's
/// shared rate limiter. An `Err` is reported on the pool's error channel.
pub type WorkHandler<T> =
    Arc<dyn Fn(WorkerId, T, RateLimiter) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Retrieves the next unit of work on each tick
///
/// Receives the handler of its [`WorkConfiguration`] so the returned item can
/// be bound to it. Returns [`RetrieveError::NoWorkAvailable`] when there is
/// legitimately nothing to do.
pub type WorkRetriever<T> = Arc<
    dyn Fn(WorkHandler<T>) -> BoxFuture<'static, Result<WorkItem<T>, RetrieveError>>
        + Send
        + Sync,
>;

/// Wrap an async closure as a [`WorkHandler`]
///
/// # Example
///
/// ```
/// use workticker::work_handler;
///
/// let handler = work_handler(|worker_id, order_id: u64, limiter| async move {
///     limiter.take().await;
///     println!("worker {worker_id} processing order {order_id}");
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn work_handler<T, F, Fut>(handler: F) -> WorkHandler<T>
where
    F: Fn(WorkerId, T, RateLimiter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(
        move |worker_id: WorkerId, data: T, limiter: RateLimiter| -> BoxFuture<'static, HandlerResult> {
            handler(worker_id, data, limiter).boxed()
        },
    )
}

/// Wrap an async closure as a [`WorkRetriever`]
pub fn work_retriever<T, F, Fut>(retriever: F) -> WorkRetriever<T>
where
    F: Fn(WorkHandler<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WorkItem<T>, RetrieveError>> + Send + 'static,
{
    Arc::new(
        move |handler: WorkHandler<T>| -> BoxFuture<'static, Result<WorkItem<T>, RetrieveError>> {
            retriever(handler).boxed()
        },
    )
}

/// A single unit of work: a payload bound to the handler that processes it
pub struct WorkItem<T> {
    /// Payload
    pub data: T,
    /// Handler that will process the payload
    pub handler: WorkHandler<T>,
}

impl<T> WorkItem<T> {
    /// Bind a payload to a handler
    pub fn new(data: T, handler: WorkHandler<T>) -> Self {
        Self { data, handler }
    }
}

impl<T: Clone> Clone for WorkItem<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for WorkItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Pairs one retriever with the handler for the work it retrieves
///
/// Registered on a pool before it starts; every registered configuration is
/// polled on each tick.
pub struct WorkConfiguration<T> {
    /// Handler bound to every retrieved item
    pub handler: WorkHandler<T>,
    /// Source polled on each tick
    pub retriever: WorkRetriever<T>,
}

impl<T> WorkConfiguration<T> {
    /// Create a configuration from a retriever and a handler
    pub fn new(retriever: WorkRetriever<T>, handler: WorkHandler<T>) -> Self {
        Self { handler, retriever }
    }

    /// Poll the retriever once, binding results to this configuration's handler
    pub(crate) fn retrieve(&self) -> BoxFuture<'static, Result<WorkItem<T>, RetrieveError>> {
        (self.retriever)(Arc::clone(&self.handler))
    }
}

impl<T> Clone for WorkConfiguration<T> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            retriever: Arc::clone(&self.retriever),
        }
    }
}

impl<T> fmt::Debug for WorkConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkConfiguration").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_handler_receives_arguments() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);

        let handler = work_handler(move |worker_id, data: usize, _limiter| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.store(worker_id * 100 + data, Ordering::SeqCst);
                Ok(())
            }
        });

        handler(2, 7, RateLimiter::unlimited()).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 207);
    }

    #[tokio::test]
    async fn test_configuration_binds_handler() {
        let handler = work_handler(|_, data: u32, _| async move {
            if data == 0 {
                anyhow::bail!("zero is not allowed");
            }
            Ok(())
        });
        let retriever = work_retriever(|handler| async move { Ok(WorkItem::new(0u32, handler)) });
        let config = WorkConfiguration::new(retriever, handler);

        let item = config.retrieve().await.unwrap();
        assert_eq!(item.data, 0);

        let err = (item.handler)(0, item.data, RateLimiter::unlimited())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "zero is not allowed");
    }

    #[tokio::test]
    async fn test_retriever_no_work() {
        let retriever: WorkRetriever<u32> =
            work_retriever(|_| async { Err(RetrieveError::NoWorkAvailable) });
        let config = WorkConfiguration::new(retriever, work_handler(|_, _: u32, _| async { Ok(()) }));

        let err = config.retrieve().await.unwrap_err();
        assert!(err.is_no_work());
    }

    #[test]
    fn test_work_item_debug_hides_handler() {
        let item = WorkItem::new(5u8, work_handler(|_, _: u8, _| async { Ok(()) }));
        assert_eq!(format!("{item:?}"), "WorkItem { data: 5, .. }");
    }
}
