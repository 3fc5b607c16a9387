//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust
//! use guardgroup_rs::prelude::*;
//!
//! let group = Group::new().with_breaker(|_key| Some(ConsecutiveBreaker::new()));
//! let breaker = group.get_or_new_breaker("/health").unwrap();
//! assert!(breaker.allow().is_ok());
//! ```

pub use crate::{
    call, Breaker, Cache, CacheValue, CallError, ConsecutiveBreaker, EventKind, Group,
    GroupError, GroupEvent, Member, MemoryCache, Subscription,
};
