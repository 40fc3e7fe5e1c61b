//! Environment whose wall clock follows tokio's virtual clock.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::{Duration, Instant},
};

use tether_core::Environment;

/// Unix time [`SimEnv`] reports at its creation by default.
pub const DEFAULT_EPOCH: u64 = 1_700_000_000;

/// Simulated environment.
///
/// Wall-clock time starts at a fixed epoch and advances with tokio's clock,
/// so sleeping on a paused runtime ages tokens too. [`shift_wall_clock`]
/// moves wall time independently to expire tokens without firing timers.
///
/// [`shift_wall_clock`]: SimEnv::shift_wall_clock
#[derive(Debug, Clone)]
pub struct SimEnv {
    origin: tokio::time::Instant,
    epoch: u64,
    skew: Arc<AtomicI64>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment starting at [`DEFAULT_EPOCH`].
    pub fn new() -> Self {
        Self::starting_at(DEFAULT_EPOCH)
    }

    /// Environment whose wall clock reads `epoch` now.
    pub fn starting_at(epoch: u64) -> Self {
        Self { origin: tokio::time::Instant::now(), epoch, skew: Arc::new(AtomicI64::new(0)) }
    }

    /// Move the wall clock by `seconds` (negative moves it back). Shared by
    /// all clones.
    pub fn shift_wall_clock(&self, seconds: i64) {
        self.skew.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn unix_time(&self) -> u64 {
        let elapsed = tokio::time::Instant::now().duration_since(self.origin).as_secs();
        let base = self.epoch.saturating_add(elapsed);
        base.saturating_add_signed(self.skew.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
