//! Lock-free circuit state used by [`ConsecutiveBreaker`](crate::ConsecutiveBreaker).

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls are admitted.
    Closed = 0,

    /// Calls are rejected until the backoff window elapses.
    Open = 1,

    /// A single probe call is in flight to test recovery.
    HalfOpen = 2,
}

impl State {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => State::Open,
            2 => State::HalfOpen,
            _ => State::Closed,
        }
    }

    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state plus the instant it was entered.
///
/// Transitions are compare-and-swap, so only one of several racing callers
/// wins a given transition.
pub(crate) struct StateManager {
    state: AtomicU8,
    entered_at: Mutex<Instant>,
}

impl StateManager {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(State::Closed as u8),
            entered_at: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn current(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn time_in_state(&self) -> Duration {
        self.entered_at.lock().elapsed()
    }

    /// Moves from `from` to `to`. Returns `false` if the state was not `from`.
    pub(crate) fn transition(&self, from: State, to: State) -> bool {
        let won = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if won {
            *self.entered_at.lock() = Instant::now();
        }

        won
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_matching_transition_wins() {
        let state = StateManager::new();
        assert_eq!(state.current(), State::Closed);

        assert!(!state.transition(State::Open, State::HalfOpen));
        assert!(state.transition(State::Closed, State::Open));
        assert!(!state.transition(State::Closed, State::Open));
        assert_eq!(state.current(), State::Open);
    }

    #[test]
    fn transition_resets_clock() {
        let state = StateManager::new();
        std::thread::sleep(Duration::from_millis(20));
        assert!(state.time_in_state() >= Duration::from_millis(20));

        state.transition(State::Closed, State::Open);
        assert!(state.time_in_state() < Duration::from_millis(20));
    }
}
