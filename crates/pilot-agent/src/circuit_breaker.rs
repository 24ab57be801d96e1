//! Circuit breaker for oracle endpoint protection
//!
//! After repeated hard failures the breaker stops sending requests for a
//! cool-down period, so a dead endpoint fails fast instead of stalling every
//! step of every running command.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests allowed
    Closed,
    /// Too many failures - reject requests immediately
    Open,
    /// Cool-down elapsed - let a request through to test recovery
    HalfOpen,
}

/// Circuit breaker shared by all calls to one oracle endpoint
///
/// # Example
///
/// ```
/// use pilot_agent::CircuitBreaker;
///
/// let cb = CircuitBreaker::default();
/// cb.record_failure();
/// cb.record_failure();
/// cb.record_failure();
///
/// assert!(!cb.can_execute());
/// ```
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    last_failure: Mutex<Option<Instant>>,
    threshold: u32,
    cool_down: Duration,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `threshold` consecutive failures
    /// and half-opens once `cool_down` has passed since the last one
    pub fn new(threshold: u32, cool_down: Duration) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            last_failure: Mutex::new(None),
            threshold,
            cool_down,
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        if self.failure_count.load(Ordering::Relaxed) < self.threshold {
            return CircuitState::Closed;
        }

        match self.since_last_failure() {
            Some(elapsed) if elapsed < self.cool_down => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    /// Record a successful call (closes the circuit)
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }

    /// Record a hard failure
    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_failure.lock() {
            *last = Some(Instant::now());
        }
    }

    /// `false` only while the circuit is open
    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Time left before the circuit half-opens, zero unless open
    pub fn time_until_retry(&self) -> Duration {
        match (self.state(), self.since_last_failure()) {
            (CircuitState::Open, Some(elapsed)) => self.cool_down.saturating_sub(elapsed),
            _ => Duration::ZERO,
        }
    }

    fn since_last_failure(&self) -> Option<Duration> {
        self.last_failure
            .lock()
            .ok()
            .and_then(|last| last.map(|at| at.elapsed()))
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        // 3 failures, 60 second cool-down
        Self::new(3, Duration::from_secs(60))
    }
}
