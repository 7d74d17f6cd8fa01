//! Core environment context trait for ARNav sessions.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The central interface for environment interaction.
///
/// This trait abstracts the host clock and task scheduler so that the
/// intelligence layer can run both on a real device (tokio) and inside the
/// deterministic replay harness.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `tokio::spawn`
/// - **Simulation**: `SimContext` (in `arnav_sim`) - a manually advanced virtual clock
///
/// # Determinism
///
/// Every estimator timestamp is taken from `now()`, never from the OS clock
/// directly, so a replay with a virtual clock reproduces the same hysteresis
/// windows and dead-reckoning intervals.
#[async_trait]
pub trait NavContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// Used for hysteresis windows and dead-reckoning intervals.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used to stamp tick outputs.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (0 when not seeded).
    fn seed(&self) -> u64;

    /// Monotonic time in whole milliseconds.
    fn now_ms(&self) -> u64 {
        self.now().as_millis() as u64
    }

    /// Wall-clock time in milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
