//! Simulation context with a manually advanced virtual clock.

use arnav_env::NavContext;
use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Deterministic context for replaying sessions.
///
/// Time only moves when the runner calls `advance_time` or the tick loop
/// sleeps. Every source of randomness is a ChaCha8 stream derived from the
/// master seed, so a seed fully determines a run.
pub struct SimContext {
    /// Master seed for all randomness
    seed: u64,

    /// Virtual time in nanoseconds, shared by clones
    virtual_time_ns: Arc<AtomicU64>,

    /// Wall-clock value of virtual time zero (2024-01-01T00:00:00Z)
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new simulation context with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1_704_067_200),
        }
    }

    /// Creates an Arc-wrapped context for sharing with an orchestrator.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Sets virtual time to a specific value.
    pub fn set_time(&self, time: Duration) {
        self.virtual_time_ns
            .store(time.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Returns current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }

    /// Independent RNG stream for one noise source.
    ///
    /// Streams with different ids never overlap, so adding a new noise
    /// source does not perturb the others.
    pub fn rng_stream(&self, stream: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(stream);
        rng
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: self.virtual_time_ns.clone(),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl NavContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        // Sleeping is instantaneous in virtual time; yield so the stop
        // signal and other tasks still get polled
        self.advance_time(duration);
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "Spawning simulated task");
        tokio::spawn(future);
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
        assert_eq!(ctx.now_ms(), 1500);
    }

    #[test]
    fn test_sim_context_set_time() {
        let ctx = SimContext::new(1);
        ctx.set_time(Duration::from_millis(250));
        assert_eq!(ctx.now_ms(), 250);
    }

    #[test]
    fn test_sim_context_epoch() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.epoch_ms(), 1_704_067_200_000);

        ctx.advance_time(Duration::from_millis(40));
        assert_eq!(ctx.epoch_ms(), 1_704_067_200_040);
    }

    #[test]
    fn test_sim_context_deterministic_streams() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);

        let a: u64 = ctx1.rng_stream(1).gen();
        let b: u64 = ctx2.rng_stream(1).gen();
        assert_eq!(a, b);

        let c: u64 = ctx1.rng_stream(2).gen();
        assert_ne!(a, c);
    }

    #[test]
    fn test_sim_context_seed() {
        let ctx = SimContext::new(12345);
        assert_eq!(ctx.seed(), 12345);
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        assert_eq!(ctx1.now(), ctx2.now());
    }

    #[tokio::test]
    async fn test_sleep_advances_virtual_time() {
        let ctx = SimContext::new(7);
        ctx.sleep(Duration::from_millis(200)).await;
        assert_eq!(ctx.now_ms(), 200);
    }
}
