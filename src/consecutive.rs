//! A breaker that trips on consecutive failures and backs off exponentially.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::BreakerOpen;
use crate::guard::Breaker;
use crate::state::{State, StateManager};

/// Default number of consecutive failures that trip the circuit.
pub const DEFAULT_THRESHOLD: u64 = 5;

/// Default length of the first open window.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(60);

/// Default cap on the open window.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Default growth factor between successive open windows.
pub const DEFAULT_MULTIPLIER: f64 = 1.5;

struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    window: Duration,
    next: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            multiplier,
            window: initial,
            next: initial,
        }
    }

    /// Opens the next window, growing the one after it.
    fn advance(&mut self) {
        self.window = self.next;
        // Saturates at `max` when the product no longer fits in a `Duration`.
        self.next = Duration::try_from_secs_f64(self.next.as_secs_f64() * self.multiplier)
            .map_or(self.max, |next| next.min(self.max));
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }
}

struct BreakerInner {
    state: StateManager,
    threshold: u64,
    consecutive_failures: AtomicU64,
    backoff: Mutex<Backoff>,
}

/// Trips open after a run of consecutive failures.
///
/// While open, calls are rejected until the current window elapses. The next
/// call is then admitted as a single probe: success closes the circuit and
/// resets the backoff, failure reopens it for a longer window (multiplied by
/// the growth factor, capped at the maximum).
///
/// Cloning is cheap and clones share state.
///
/// ```rust
/// use guardgroup_rs::{Breaker, ConsecutiveBreaker, State};
/// use std::time::Duration;
///
/// let breaker = ConsecutiveBreaker::builder()
///     .threshold(2)
///     .initial_backoff(Duration::from_secs(10))
///     .build();
///
/// breaker.mark_failed();
/// breaker.mark_failed();
/// assert_eq!(breaker.state(), State::Open);
/// assert!(breaker.allow().is_err());
/// ```
#[derive(Clone)]
pub struct ConsecutiveBreaker {
    inner: Arc<BreakerInner>,
}

impl Default for ConsecutiveBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsecutiveBreaker {
    /// Creates a breaker with the default threshold and backoff.
    pub fn new() -> Self {
        ConsecutiveBreakerBuilder::new().build()
    }

    /// Creates a new builder for customizing a breaker.
    pub fn builder() -> ConsecutiveBreakerBuilder {
        ConsecutiveBreakerBuilder::new()
    }

    /// Gets the current state of the circuit.
    pub fn state(&self) -> State {
        self.inner.state.current()
    }

    /// Failures recorded since the last success or trip.
    pub fn consecutive_failures(&self) -> u64 {
        self.inner.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Length of the most recent open window.
    pub fn current_window(&self) -> Duration {
        self.inner.backoff.lock().window
    }

    fn trip(&self, from: State) {
        let mut backoff = self.inner.backoff.lock();
        if self.inner.state.transition(from, State::Open) {
            backoff.advance();
            self.inner.consecutive_failures.store(0, Ordering::Relaxed);

            #[cfg(feature = "tracing")]
            tracing::debug!(from = %from, window = ?backoff.window, "circuit opened");
        }
    }
}

impl Breaker for ConsecutiveBreaker {
    fn allow(&self) -> Result<(), BreakerOpen> {
        match self.inner.state.current() {
            State::Closed => Ok(()),
            State::Open => {
                let window = self.inner.backoff.lock().window;
                if self.inner.state.time_in_state() >= window
                    && self.inner.state.transition(State::Open, State::HalfOpen)
                {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("circuit half-open, admitting probe");
                    return Ok(());
                }
                Err(BreakerOpen)
            }
            // The probe is already out.
            State::HalfOpen => Err(BreakerOpen),
        }
    }

    fn mark_success(&self) {
        match self.inner.state.current() {
            State::Closed => {
                self.inner.consecutive_failures.store(0, Ordering::Relaxed);
            }
            State::HalfOpen => {
                let mut backoff = self.inner.backoff.lock();
                if self.inner.state.transition(State::HalfOpen, State::Closed) {
                    backoff.reset();
                    self.inner.consecutive_failures.store(0, Ordering::Relaxed);

                    #[cfg(feature = "tracing")]
                    tracing::debug!("circuit closed");
                }
            }
            State::Open => {}
        }
    }

    fn mark_failed(&self) {
        match self.inner.state.current() {
            State::Closed => {
                let failures = self.inner.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.inner.threshold {
                    self.trip(State::Closed);
                }
            }
            State::HalfOpen => self.trip(State::HalfOpen),
            State::Open => {}
        }
    }
}

/// Builder for [`ConsecutiveBreaker`].
pub struct ConsecutiveBreakerBuilder {
    threshold: u64,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl Default for ConsecutiveBreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsecutiveBreakerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }

    /// Sets the number of consecutive failures that trip the circuit (at least 1).
    pub fn threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    /// Sets the length of the first open window.
    pub fn initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    /// Sets the cap on the open window.
    pub fn max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff = duration;
        self
    }

    /// Sets the growth factor between windows. Values below 1.0 are raised to 1.0.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            DEFAULT_MULTIPLIER
        };
        self
    }

    /// Builds the breaker.
    pub fn build(self) -> ConsecutiveBreaker {
        ConsecutiveBreaker {
            inner: Arc::new(BreakerInner {
                state: StateManager::new(),
                threshold: self.threshold,
                consecutive_failures: AtomicU64::new(0),
                backoff: Mutex::new(Backoff::new(
                    self.initial_backoff,
                    self.max_backoff,
                    self.multiplier,
                )),
            }),
        }
    }
}
