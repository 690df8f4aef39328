//! Circuit breaker guarding transport creation

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Successes needed in half-open state before the circuit closes again
const HALF_OPEN_SUCCESSES: usize = 3;

/// Circuit breaker state
///
/// # Examples
///
/// ```
/// use esox_invokerpool::{CircuitBreaker, CircuitBreakerState};
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
/// assert_eq!(breaker.state(), CircuitBreakerState::Closed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    /// Circuit is closed - factory calls go through
    Closed,

    /// Circuit is open - rentals needing a new transport fail fast
    Open,

    /// Circuit is half-open - probing whether the factory recovered
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    failures: usize,
    successes: usize,
    opened_at: Option<Instant>,
}

/// Circuit breaker that stops hammering a failing transport factory
///
/// # Examples
///
/// ```
/// use esox_invokerpool::CircuitBreaker;
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
///
/// breaker.record_failure();
/// breaker.record_failure();
/// breaker.record_failure();
///
/// assert!(!breaker.allow_request());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: usize,
    timeout: Duration,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(failure_threshold: usize, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitBreakerState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            }),
            failure_threshold: failure_threshold.max(1),
            timeout,
        }
    }

    /// Get the current state
    pub fn state(&self) -> CircuitBreakerState {
        self.inner.lock().state
    }

    /// Check if a factory call may proceed
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() > self.timeout);
                if cooled_down {
                    inner.state = CircuitBreakerState::HalfOpen;
                    inner.successes = 0;
                }
                cooled_down
            }
        }
    }

    /// Record a successful factory call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitBreakerState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= HALF_OPEN_SUCCESSES {
                    inner.state = CircuitBreakerState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitBreakerState::Closed => inner.failures = 0,
            CircuitBreakerState::Open => {}
        }
    }

    /// Record a failed factory call
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        let state = inner.state;
        let trip = match state {
            CircuitBreakerState::Closed => inner.failures >= self.failure_threshold,
            CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => false,
        };
        if trip {
            tracing::warn!(failures = inner.failures, "transport factory circuit opened");
            inner.state = CircuitBreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Reset the circuit breaker
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitBreakerState::Closed;
        inner.failures = 0;
        inner.successes = 0;
        inner.opened_at = None;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}
