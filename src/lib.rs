//! # guardgroup-rs
//!
//! A per-key registry of circuit breakers and caches, created lazily on first
//! use and broadcast to observers when they appear.
//!
//! A service that talks to many downstream endpoints usually wants one
//! breaker (and perhaps one cache) per endpoint, without listing every
//! endpoint up front. A [`Group`] does this: you give it factories, it builds
//! a guard the first time a key is asked for and hands out that same instance
//! afterwards.
//!
//! ## Basic Usage
//!
//! ```rust
//! use guardgroup_rs::{call, CallError, ConsecutiveBreaker, Group, MemoryCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let group = Arc::new(
//!     Group::new()
//!         .with_breaker(|_route| Some(ConsecutiveBreaker::builder().threshold(5).build()))
//!         .with_cache(|_route| Some(MemoryCache::new())),
//! );
//!
//! // First lookup builds the breaker; later lookups return the same one.
//! let breaker = group.get_or_new_breaker("/api/liveChnList").unwrap();
//!
//! match call(breaker.as_ref(), || -> Result<&str, std::io::Error> { Ok("payload") }) {
//!     Ok(body) => println!("got {}", body),
//!     Err(CallError::Open) => println!("endpoint is cooling down"),
//!     Err(CallError::Operation(err)) => println!("call failed: {}", err),
//! }
//!
//! let cache = group.get_or_new_cache("/api/liveChnList").unwrap();
//! cache.set("page-1", Arc::new(String::from("cached")), Duration::from_secs(30));
//! assert_eq!(cache.get_as::<String>("page-1").as_deref().map(String::as_str), Some("cached"));
//! ```
//!
//! ## Observing creations
//!
//! [`Group::subscribe`] returns a [`Subscription`] that receives a
//! [`GroupEvent`] for every guard created after it subscribed. Each
//! subscription buffers a bounded number of events (100 by default); when a
//! slow subscriber's buffer is full the oldest event is discarded, so the
//! group never waits on a subscriber.
//!
//! ## Features
//!
//! - `async` - `Subscription::recv_async` and `Subscription::into_stream`
//! - `prometheus` - Prometheus metrics integration
//! - `tracing` - Tracing integration

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod channel;
mod config;
mod consecutive;
mod dispatch;
mod error;
mod event;
mod group;
mod guard;
mod memory;
mod metrics;
pub mod prelude;
mod state;

// Re-exports
pub use channel::{IntoIter, Iter, Subscription};
pub use config::{GroupBuilder, DEFAULT_DISPATCHER_NAME, DEFAULT_SUBSCRIPTION_CAPACITY};
pub use consecutive::{ConsecutiveBreaker, ConsecutiveBreakerBuilder};
pub use error::{BreakerOpen, CallError, GroupError, GroupResult, RecvTimeoutError, TryRecvError};
pub use event::{EventKind, GroupEvent, Member};
pub use group::{BreakerFactory, CacheFactory, Group};
pub use guard::{call, Breaker, Cache, CacheValue, GuardKind};
pub use memory::MemoryCache;
#[cfg(feature = "prometheus")]
pub use metrics::PrometheusSink;
pub use metrics::{GroupStats, MetricSink, NullMetricSink};
pub use state::State;
