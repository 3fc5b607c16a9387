//! Configuration for guard groups.

use std::sync::Arc;

use crate::group::{erase_breaker, erase_cache, BreakerFactory, CacheFactory, Group};
use crate::guard::{Breaker, Cache};
use crate::metrics::{MetricSink, NullMetricSink};

/// Default number of events a subscription holds before dropping the oldest.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 100;

/// Default name of the event dispatcher thread.
pub const DEFAULT_DISPATCHER_NAME: &str = "guardgroup-dispatch";

pub(crate) struct BuilderConfig {
    pub(crate) breaker_factory: Option<BreakerFactory>,
    pub(crate) cache_factory: Option<CacheFactory>,
    pub(crate) subscription_capacity: usize,
    pub(crate) metric_sink: Arc<dyn MetricSink>,
    pub(crate) dispatcher_name: String,
}

/// Builder for creating groups with custom configurations.
///
/// ```rust
/// use guardgroup_rs::{ConsecutiveBreaker, Group, MemoryCache};
///
/// let group = Group::builder()
///     .breaker(|_key| Some(ConsecutiveBreaker::builder().threshold(3).build()))
///     .cache(|_key| Some(MemoryCache::new()))
///     .subscription_capacity(16)
///     .build();
///
/// assert!(group.get_or_new_breaker("/api/users").is_ok());
/// ```
pub struct GroupBuilder {
    config: BuilderConfig,
}

impl Default for GroupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupBuilder {
    /// Creates a new builder with default settings and no factories.
    pub fn new() -> Self {
        Self {
            config: BuilderConfig {
                breaker_factory: None,
                cache_factory: None,
                subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
                metric_sink: Arc::new(NullMetricSink),
                dispatcher_name: DEFAULT_DISPATCHER_NAME.to_string(),
            },
        }
    }

    /// Sets the factory that builds a breaker for a new key.
    ///
    /// Returning `None` makes the lookup fail with
    /// [`GroupError::CreateUnavailable`](crate::GroupError::CreateUnavailable).
    pub fn breaker<F, B>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> Option<B> + Send + Sync + 'static,
        B: Breaker,
    {
        self.config.breaker_factory = Some(erase_breaker(factory));
        self
    }

    /// Sets a breaker factory that already produces shared instances.
    pub fn breaker_factory(mut self, factory: BreakerFactory) -> Self {
        self.config.breaker_factory = Some(factory);
        self
    }

    /// Sets the factory that builds a cache for a new key.
    pub fn cache<F, C>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> Option<C> + Send + Sync + 'static,
        C: Cache,
    {
        self.config.cache_factory = Some(erase_cache(factory));
        self
    }

    /// Sets a cache factory that already produces shared instances.
    pub fn cache_factory(mut self, factory: CacheFactory) -> Self {
        self.config.cache_factory = Some(factory);
        self
    }

    /// Sets how many events each subscription buffers. Values below 1 are raised to 1.
    pub fn subscription_capacity(mut self, capacity: usize) -> Self {
        self.config.subscription_capacity = capacity.max(1);
        self
    }

    /// Sets a metric sink for the group.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.config.metric_sink = Arc::new(sink);
        self
    }

    /// Sets the name of the event dispatcher thread.
    pub fn dispatcher_name(mut self, name: impl Into<String>) -> Self {
        self.config.dispatcher_name = name.into();
        self
    }

    /// Builds the group.
    pub fn build(self) -> Group {
        Group::from_config(self.config)
    }
}
