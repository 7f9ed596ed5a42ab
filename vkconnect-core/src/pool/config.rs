use std::time::Duration;

/// Pool sizing and backpressure knobs (spec §6, "pool:" configuration
/// surface). Deliberately minimal — eviction order and LIFO/FIFO policy are
/// a non-goal; this crate only needs a pool to exist, not to be tuned.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min: usize,
    pub soft_limit: usize,
    pub hard_limit: usize,
    pub idle_timeout: Duration,
    pub circuit_breaker_trip_after: u32,
    pub max_concurrent_connection_requests: usize,
    pub keep_alive_frequency: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 1,
            soft_limit: 8,
            hard_limit: 16,
            idle_timeout: Duration::from_secs(5 * 60),
            circuit_breaker_trip_after: 3,
            max_concurrent_connection_requests: 64,
            keep_alive_frequency: Duration::from_secs(30),
        }
    }
}
