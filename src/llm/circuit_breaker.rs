// src/llm/circuit_breaker.rs
// Circuit breaker for the LM endpoint — cuts off calls to a failing
// upstream for a cooldown window, then admits a single probe.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit state.
#[derive(Debug, Clone)]
enum State {
    /// Normal operation — counting consecutive failures.
    Closed { failures: u32 },
    /// Tripped — all requests are rejected until cooldown expires.
    Open { tripped_at: Instant },
    /// Cooldown expired — exactly one probe request is in flight.
    HalfOpen,
}

/// What a caller should do with its pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// Circuit closed (or this caller won the half-open probe slot).
    Proceed,
    /// Circuit open; fail fast, do not retry.
    RejectOpen,
    /// A probe is already in flight; fail fast, retryable shortly.
    RejectProbeInFlight,
}

/// Thread-safe three-state breaker for a single endpoint.
pub struct CircuitBreaker {
    state: Mutex<State>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(State::Closed { failures: 0 }),
            failure_threshold,
            cooldown,
        }
    }

    /// Decide whether a request may go out. Transitions Open → HalfOpen
    /// once the cooldown has elapsed, granting the probe to this caller.
    pub fn check(&self) -> BreakerDecision {
        let mut state = self.state.lock();

        match &*state {
            State::Closed { .. } => BreakerDecision::Proceed,
            State::Open { tripped_at } => {
                if tripped_at.elapsed() >= self.cooldown {
                    info!("Circuit half-open, allowing probe request");
                    *state = State::HalfOpen;
                    BreakerDecision::Proceed
                } else {
                    BreakerDecision::RejectOpen
                }
            }
            State::HalfOpen => BreakerDecision::RejectProbeInFlight,
        }
    }

    /// Record a successful request — closes the circuit.
    pub fn record_success(&self) {
        let mut state = self.state.lock();

        if matches!(*state, State::HalfOpen) {
            info!("Circuit recovered (half-open probe succeeded)");
        }

        *state = State::Closed { failures: 0 };
    }

    /// Record a failed request — may trip the circuit.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();

        match &mut *state {
            State::Closed { failures } => {
                *failures += 1;

                if *failures >= self.failure_threshold {
                    warn!(
                        failures = *failures,
                        "Circuit tripped — LM calls rejected for {}s",
                        self.cooldown.as_secs()
                    );
                    *state = State::Open { tripped_at: now };
                }
            }
            State::HalfOpen => {
                warn!("Half-open probe failed — circuit re-tripped");
                *state = State::Open { tripped_at: now };
            }
            State::Open { .. } => {}
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), State::Open { .. })
    }
}
