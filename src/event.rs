//! Creation events broadcast by a group.

use std::fmt;
use std::sync::Arc;

use crate::guard::{Breaker, Cache, GuardKind};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A breaker was created and stored for a new key.
    BreakerAdded,

    /// A cache was created and stored for a new key.
    CacheAdded,
}

impl EventKind {
    /// The guard kind this event reports on.
    pub fn guard_kind(&self) -> GuardKind {
        match self {
            EventKind::BreakerAdded => GuardKind::Breaker,
            EventKind::CacheAdded => GuardKind::Cache,
        }
    }

    /// Short label, suitable for log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BreakerAdded => "breaker_added",
            EventKind::CacheAdded => "cache_added",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The guard instance carried by an event.
///
/// This is the same `Arc` the group stored, not a copy.
#[derive(Clone)]
pub enum Member {
    /// A newly created breaker.
    Breaker(Arc<dyn Breaker>),

    /// A newly created cache.
    Cache(Arc<dyn Cache>),
}

impl Member {
    /// Returns the breaker, if this member is one.
    pub fn as_breaker(&self) -> Option<&Arc<dyn Breaker>> {
        match self {
            Member::Breaker(b) => Some(b),
            Member::Cache(_) => None,
        }
    }

    /// Returns the cache, if this member is one.
    pub fn as_cache(&self) -> Option<&Arc<dyn Cache>> {
        match self {
            Member::Cache(c) => Some(c),
            Member::Breaker(_) => None,
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Breaker(b) => write!(f, "Breaker({:p})", Arc::as_ptr(b)),
            Member::Cache(c) => write!(f, "Cache({:p})", Arc::as_ptr(c)),
        }
    }
}

/// A creation notification delivered to subscribers.
#[derive(Debug, Clone)]
pub struct GroupEvent {
    kind: EventKind,
    key: Arc<str>,
    member: Member,
}

impl GroupEvent {
    pub(crate) fn breaker_added(key: &str, breaker: Arc<dyn Breaker>) -> Self {
        Self {
            kind: EventKind::BreakerAdded,
            key: Arc::from(key),
            member: Member::Breaker(breaker),
        }
    }

    pub(crate) fn cache_added(key: &str, cache: Arc<dyn Cache>) -> Self {
        Self {
            kind: EventKind::CacheAdded,
            key: Arc::from(key),
            member: Member::Cache(cache),
        }
    }

    /// The kind of event.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The key the guard was created for.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The created guard.
    pub fn member(&self) -> &Member {
        &self.member
    }

    /// Consumes the event, returning the created guard.
    pub fn into_member(self) -> Member {
        self.member
    }
}
