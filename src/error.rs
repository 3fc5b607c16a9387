//! Error types for the guard group.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::guard::GuardKind;

/// Result type for group operations.
pub type GroupResult<T> = Result<T, GroupError>;

/// Error type for get-or-create operations on a [`Group`](crate::Group).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// The factory declined to build an instance for the key.
    ///
    /// Nothing was stored; calling again with the same key runs the factory again.
    CreateUnavailable {
        /// Which map the lookup targeted.
        kind: GuardKind,
        /// The key that was requested.
        key: String,
    },

    /// No factory was configured for this kind of guard.
    FactoryMissing {
        /// The kind that has no factory.
        kind: GuardKind,
    },
}

impl GroupError {
    /// Returns the kind of guard the failed operation targeted.
    pub fn kind(&self) -> GuardKind {
        match self {
            GroupError::CreateUnavailable { kind, .. } => *kind,
            GroupError::FactoryMissing { kind } => *kind,
        }
    }
}

impl Display for GroupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GroupError::CreateUnavailable { kind, key } => {
                write!(f, "{} factory returned no instance for key {:?}", kind, key)
            }
            GroupError::FactoryMissing { kind } => {
                write!(f, "no {} factory configured", kind)
            }
        }
    }
}

impl Error for GroupError {}

/// Returned by [`Breaker::allow`](crate::Breaker::allow) when a call is not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BreakerOpen;

impl Display for BreakerOpen {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "circuit breaker is open")
    }
}

impl Error for BreakerOpen {}

/// Error type for calls gated through a breaker with [`call`](crate::call).
#[derive(Debug)]
pub enum CallError<E> {
    /// The breaker refused the call; the operation was not run.
    Open,

    /// The operation ran and failed.
    Operation(E),
}

impl<E> From<BreakerOpen> for CallError<E> {
    fn from(_: BreakerOpen) -> Self {
        CallError::Open
    }
}

impl<E> Display for CallError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Open => write!(f, "Circuit breaker is open"),
            CallError::Operation(e) => write!(f, "Operation error: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for CallError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CallError::Open => None,
            CallError::Operation(e) => Some(e),
        }
    }
}

/// Error returned by [`Subscription::try_recv`](crate::Subscription::try_recv).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// No event is queued right now.
    Empty,

    /// The queue is empty and the group has gone away.
    Closed,
}

impl Display for TryRecvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "no event queued"),
            TryRecvError::Closed => write!(f, "event stream closed"),
        }
    }
}

impl Error for TryRecvError {}

/// Error returned by [`Subscription::recv_timeout`](crate::Subscription::recv_timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    /// No event arrived before the deadline.
    Timeout,

    /// The queue is empty and the group has gone away.
    Closed,
}

impl Display for RecvTimeoutError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "timed out waiting for an event"),
            RecvTimeoutError::Closed => write!(f, "event stream closed"),
        }
    }
}

impl Error for RecvTimeoutError {}
