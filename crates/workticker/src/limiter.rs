//! Shared rate limiter for handler sub-operations
//!
//! Built on `governor`'s GCRA limiter with a burst of one, so permits are
//! spaced `1s / rate` apart and calls never burst above the configured rate.
//! Waiters queue on a fair mutex and are released first-in first-out.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;

type Gcra = governor::RateLimiter<
    NotKeyed,
    InMemoryState,
    TokioClock,
    NoOpMiddleware<<TokioClock as Clock>::Instant>,
>;

/// `governor` clock reading tokio time, so pacing follows a paused test clock
#[derive(Debug, Clone, Copy, Default)]
struct TokioClock;

impl Clock for TokioClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Pool-wide rate limiter
///
/// Cloning is cheap and every clone paces against the same schedule. The
/// limiter has no notion of which handler or worker calls it.
///
/// # Example
///
/// ```
/// use workticker::RateLimiter;
///
/// # async fn call_api() {}
/// # async fn run() {
/// let limiter = RateLimiter::new(10); // 10 calls per second
///
/// for _ in 0..3 {
///     limiter.take().await;
///     call_api().await;
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterState>,
}

struct LimiterState {
    per_second: u32,
    /// `None` when unlimited
    gcra: Option<Gcra>,
    /// Held by the caller currently waiting for a permit
    queue: tokio::sync::Mutex<()>,
}

impl RateLimiter {
    /// Create a limiter allowing `per_second` operations per second
    ///
    /// A rate of zero disables limiting.
    pub fn new(per_second: u32) -> Self {
        let gcra = NonZeroU32::new(per_second).map(|rate| {
            let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
            Gcra::direct_with_clock(quota, &TokioClock)
        });

        Self {
            inner: Arc::new(LimiterState {
                per_second,
                gcra,
                queue: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Create a limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Configured rate, `None` when unlimited
    pub fn per_second(&self) -> Option<u32> {
        self.inner.gcra.as_ref().map(|_| self.inner.per_second)
    }

    /// Whether this limiter never waits
    pub fn is_unlimited(&self) -> bool {
        self.inner.gcra.is_none()
    }

    /// Wait for the next permit
    ///
    /// Dropping the returned future before it completes gives up its place
    /// in line without consuming a permit.
    pub async fn take(&self) {
        let Some(gcra) = &self.inner.gcra else {
            return;
        };

        let _turn = self.inner.queue.lock().await;
        while let Err(not_until) = gcra.check() {
            tokio::time::sleep(not_until.wait_time_from(TokioClock.now())).await;
        }
    }

    /// Take a permit only if one is free right now and nobody is waiting
    pub fn try_take(&self) -> bool {
        let Some(gcra) = &self.inner.gcra else {
            return true;
        };

        match self.inner.queue.try_lock() {
            Ok(_turn) => gcra.check().is_ok(),
            Err(_) => false,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("per_second", &self.per_second())
            .finish()
    }
}
