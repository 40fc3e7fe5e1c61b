//! Environment abstraction for time.
//!
//! State machines never read the clock themselves. The runtime passes a
//! monotonic instant into every transition that arms or fires a timer, and
//! token expiry checks read the wall clock through the same [`Environment`]
//! so tests can pin it.

use std::{
    future::Future,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Source of time for the runtime.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic time used for reconnect deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock seconds since the Unix epoch, compared against JWT `exp`.
    fn unix_time(&self) -> u64;

    /// Sleep for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Production environment backed by tokio's clock.
///
/// Monotonic time comes from `tokio::time::Instant` so that tests running
/// with a paused runtime see virtual time advance consistently with timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn unix_time(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
