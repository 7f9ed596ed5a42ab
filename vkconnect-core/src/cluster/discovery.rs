//! Discovery circuit breaker (spec §4.6, "Discovery state machine").
//!
//! Three states: `Discovering` (initial, or re-armed after a refresh is
//! kicked off), `Healthy` (a topology won the last election), `CircuitOpen`
//! (the circuit-breaker timer fired with no winner). `wait_for_healthy`
//! suspends callers until the state leaves `Discovering`; `CircuitOpen`
//! fails them fast rather than waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::time::Duration;

use crate::error::{VkError, VkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Discovering,
    Healthy,
    CircuitOpen,
}

/// Shared discovery status plus the circuit-breaker timer's epoch counter,
/// so a stale timer from a superseded discovery attempt can recognize it's
/// no longer current and no-op instead of wrongly opening the circuit.
pub struct Discovery {
    state: Mutex<DiscoveryState>,
    notify: Notify,
    epoch: AtomicU64,
    circuit_breaker_duration: Duration,
}

impl Discovery {
    pub fn new(circuit_breaker_duration: Duration) -> Arc<Self> {
        let discovery = Arc::new(Self {
            state: Mutex::new(DiscoveryState::Discovering),
            notify: Notify::new(),
            epoch: AtomicU64::new(0),
            circuit_breaker_duration,
        });
        discovery.clone().arm_circuit_breaker();
        discovery
    }

    /// Starts a fresh discovery attempt: resets to `Discovering` and arms a
    /// new circuit-breaker timer, invalidating any timer from a previous
    /// attempt via the epoch counter.
    pub async fn start_attempt(self: &Arc<Self>) {
        *self.state.lock().await = DiscoveryState::Discovering;
        self.clone().arm_circuit_breaker();
    }

    fn arm_circuit_breaker(self: Arc<Self>) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let duration = self.circuit_breaker_duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return; // a newer attempt (or a winner) superseded this timer
            }
            let mut state = self.state.lock().await;
            if *state == DiscoveryState::Discovering {
                *state = DiscoveryState::CircuitOpen;
                drop(state);
                self.notify.notify_waiters();
            }
        });
    }

    /// A topology won its election: open the circuit (mark healthy) and
    /// bump the epoch so any still-pending breaker timer is ignored.
    pub async fn mark_healthy(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().await = DiscoveryState::Healthy;
        self.notify.notify_waiters();
    }

    /// Suspends until discovery succeeds, or fails fast if the circuit is
    /// already open (spec §4.6).
    ///
    /// The `Notified` future is created before the state check so a
    /// `notify_waiters()` call racing with this call is still observed —
    /// `Notify` only guarantees delivery to futures that exist at the time
    /// of the call, not ones created afterward.
    pub async fn wait_for_healthy(&self) -> VkResult<()> {
        loop {
            let notified = self.notify.notified();
            match *self.state.lock().await {
                DiscoveryState::Healthy => return Ok(()),
                DiscoveryState::CircuitOpen => {
                    return Err(VkError::NoConsensusReachedCircuitBreakerOpen)
                }
                DiscoveryState::Discovering => {}
            }
            notified.await;
        }
    }

    pub async fn state(&self) -> DiscoveryState {
        *self.state.lock().await
    }
}
