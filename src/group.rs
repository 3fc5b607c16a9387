//! The keyed guard registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::channel::{EventSender, Subscription};
use crate::config::{BuilderConfig, GroupBuilder};
use crate::dispatch::{Dispatcher, Targets};
use crate::error::{GroupError, GroupResult};
use crate::event::GroupEvent;
use crate::guard::{Breaker, Cache, GuardKind};
use crate::metrics::MetricSink;

/// Builds a breaker for a key, or returns `None` when it cannot.
pub type BreakerFactory = Arc<dyn Fn(&str) -> Option<Arc<dyn Breaker>> + Send + Sync>;

/// Builds a cache for a key, or returns `None` when it cannot.
pub type CacheFactory = Arc<dyn Fn(&str) -> Option<Arc<dyn Cache>> + Send + Sync>;

type Factory<G> = Arc<dyn Fn(&str) -> Option<Arc<G>> + Send + Sync>;
type GuardMap<G> = HashMap<String, Arc<G>, ahash::RandomState>;

struct Members {
    breakers: GuardMap<dyn Breaker>,
    caches: GuardMap<dyn Cache>,
    observers: Vec<EventSender>,
}

/// Per-kind access used by the shared get-or-create path.
trait Guarded: Send + Sync + 'static {
    const KIND: GuardKind;

    fn map(members: &Members) -> &GuardMap<Self>;
    fn map_mut(members: &mut Members) -> &mut GuardMap<Self>;
    fn added(key: &str, guard: Arc<Self>) -> GroupEvent;
}

impl Guarded for dyn Breaker {
    const KIND: GuardKind = GuardKind::Breaker;

    fn map(members: &Members) -> &GuardMap<Self> {
        &members.breakers
    }

    fn map_mut(members: &mut Members) -> &mut GuardMap<Self> {
        &mut members.breakers
    }

    fn added(key: &str, guard: Arc<Self>) -> GroupEvent {
        GroupEvent::breaker_added(key, guard)
    }
}

impl Guarded for dyn Cache {
    const KIND: GuardKind = GuardKind::Cache;

    fn map(members: &Members) -> &GuardMap<Self> {
        &members.caches
    }

    fn map_mut(members: &mut Members) -> &mut GuardMap<Self> {
        &mut members.caches
    }

    fn added(key: &str, guard: Arc<Self>) -> GroupEvent {
        GroupEvent::cache_added(key, guard)
    }
}

pub(crate) fn erase_breaker<F, B>(factory: F) -> BreakerFactory
where
    F: Fn(&str) -> Option<B> + Send + Sync + 'static,
    B: Breaker,
{
    Arc::new(move |key: &str| factory(key).map(|b| Arc::new(b) as Arc<dyn Breaker>))
}

pub(crate) fn erase_cache<F, C>(factory: F) -> CacheFactory
where
    F: Fn(&str) -> Option<C> + Send + Sync + 'static,
    C: Cache,
{
    Arc::new(move |key: &str| factory(key).map(|c| Arc::new(c) as Arc<dyn Cache>))
}

/// A registry that creates one breaker and one cache per key on first use.
///
/// Breakers and caches live in separate maps, so the same key string can name
/// one of each. Entries are never removed; they live as long as the group.
/// Share the group with `Arc<Group>` wherever guards are needed.
///
/// ```rust
/// use guardgroup_rs::{ConsecutiveBreaker, EventKind, Group};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let group = Group::new().with_breaker(|_key| Some(ConsecutiveBreaker::new()));
/// let events = group.subscribe();
///
/// let first = group.get_or_new_breaker("/api/live").unwrap();
/// let again = group.get_or_new_breaker("/api/live").unwrap();
/// assert!(Arc::ptr_eq(&first, &again));
///
/// let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
/// assert_eq!(event.kind(), EventKind::BreakerAdded);
/// assert_eq!(event.key(), "/api/live");
/// ```
pub struct Group {
    members: RwLock<Members>,
    breaker_factory: Option<BreakerFactory>,
    cache_factory: Option<CacheFactory>,
    subscription_capacity: usize,
    metric_sink: Arc<dyn MetricSink>,
    dispatcher_name: String,
    dispatcher: OnceCell<Dispatcher>,
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl Group {
    /// Creates an empty group with no factories and default settings.
    pub fn new() -> Self {
        GroupBuilder::new().build()
    }

    /// Creates a new builder for customizing a group.
    pub fn builder() -> GroupBuilder {
        GroupBuilder::new()
    }

    pub(crate) fn from_config(config: BuilderConfig) -> Self {
        Self {
            members: RwLock::new(Members {
                breakers: GuardMap::default(),
                caches: GuardMap::default(),
                observers: Vec::new(),
            }),
            breaker_factory: config.breaker_factory,
            cache_factory: config.cache_factory,
            subscription_capacity: config.subscription_capacity,
            metric_sink: config.metric_sink,
            dispatcher_name: config.dispatcher_name,
            dispatcher: OnceCell::new(),
        }
    }

    /// Sets the breaker factory. Takes the group by value, so it can only run during setup.
    pub fn with_breaker<F, B>(self, factory: F) -> Self
    where
        F: Fn(&str) -> Option<B> + Send + Sync + 'static,
        B: Breaker,
    {
        self.with_breaker_factory(erase_breaker(factory))
    }

    /// Sets an already type-erased breaker factory, e.g. one shared between groups.
    pub fn with_breaker_factory(mut self, factory: BreakerFactory) -> Self {
        self.breaker_factory = Some(factory);
        self
    }

    /// Sets the cache factory. Takes the group by value, so it can only run during setup.
    pub fn with_cache<F, C>(self, factory: F) -> Self
    where
        F: Fn(&str) -> Option<C> + Send + Sync + 'static,
        C: Cache,
    {
        self.with_cache_factory(erase_cache(factory))
    }

    /// Sets an already type-erased cache factory.
    pub fn with_cache_factory(mut self, factory: CacheFactory) -> Self {
        self.cache_factory = Some(factory);
        self
    }

    /// Returns the breaker for `key`, creating it on first use.
    ///
    /// The factory runs at most once per stored key. If it returns `None`,
    /// nothing is stored and the next call for `key` runs it again.
    pub fn get_or_new_breaker(&self, key: &str) -> GroupResult<Arc<dyn Breaker>> {
        self.get_or_create(key, self.breaker_factory.as_ref())
    }

    /// Returns the cache for `key`, creating it on first use.
    pub fn get_or_new_cache(&self, key: &str) -> GroupResult<Arc<dyn Cache>> {
        self.get_or_create(key, self.cache_factory.as_ref())
    }

    fn get_or_create<G>(&self, key: &str, factory: Option<&Factory<G>>) -> GroupResult<Arc<G>>
    where
        G: Guarded + ?Sized,
    {
        if let Some(found) = G::map(&self.members.read()).get(key) {
            self.metric_sink.record_lookup(G::KIND, true);
            return Ok(Arc::clone(found));
        }
        self.metric_sink.record_lookup(G::KIND, false);

        let Some(factory) = factory else {
            #[cfg(feature = "tracing")]
            tracing::warn!(kind = %G::KIND, key, "get-or-create without a configured factory");
            return Err(GroupError::FactoryMissing { kind: G::KIND });
        };

        // One creator at a time. Lookups of existing keys keep going while
        // the factory runs.
        let members = self.members.upgradable_read();
        if let Some(found) = G::map(&members).get(key) {
            return Ok(Arc::clone(found));
        }

        let Some(created) = factory(key) else {
            self.metric_sink.record_create_failed(G::KIND);
            #[cfg(feature = "tracing")]
            tracing::debug!(kind = %G::KIND, key, "factory returned no instance");
            return Err(GroupError::CreateUnavailable {
                kind: G::KIND,
                key: key.to_string(),
            });
        };

        let mut members = RwLockUpgradableReadGuard::upgrade(members);
        G::map_mut(&mut members).insert(key.to_string(), Arc::clone(&created));
        self.metric_sink.record_created(G::KIND);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            kind = %G::KIND,
            key,
            subscribers = members.observers.len(),
            "created guard"
        );

        // Queued while still exclusive, so every subscriber sees creations in
        // insertion order and late subscribers see none of the earlier ones.
        if !members.observers.is_empty() {
            let targets: Targets = members.observers.iter().cloned().collect();
            self.dispatcher()
                .dispatch(G::added(key, Arc::clone(&created)), targets);
        }

        Ok(created)
    }

    /// Returns the breaker stored for `key` without creating one.
    pub fn get_breaker(&self, key: &str) -> Option<Arc<dyn Breaker>> {
        self.members.read().breakers.get(key).cloned()
    }

    /// Returns the cache stored for `key` without creating one.
    pub fn get_cache(&self, key: &str) -> Option<Arc<dyn Cache>> {
        self.members.read().caches.get(key).cloned()
    }

    /// Keys that currently have a breaker, in no particular order.
    pub fn breaker_keys(&self) -> Vec<String> {
        self.members.read().breakers.keys().cloned().collect()
    }

    /// Keys that currently have a cache, in no particular order.
    pub fn cache_keys(&self) -> Vec<String> {
        self.members.read().caches.keys().cloned().collect()
    }

    /// Number of stored breakers.
    pub fn breaker_count(&self) -> usize {
        self.members.read().breakers.len()
    }

    /// Number of stored caches.
    pub fn cache_count(&self) -> usize {
        self.members.read().caches.len()
    }

    /// Number of subscriptions ever registered. Dropped subscriptions still count.
    pub fn subscriber_count(&self) -> usize {
        self.members.read().observers.len()
    }

    /// Subscribes to creation events using the group's configured capacity.
    ///
    /// Only creations that happen after this call are delivered.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(self.subscription_capacity)
    }

    /// Subscribes with a specific queue capacity. Values below 1 are raised to 1.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        self.dispatcher();

        let (tx, subscription) = Subscription::new(capacity);
        let mut members = self.members.write();
        members.observers.push(tx);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            capacity = subscription.capacity(),
            subscribers = members.observers.len(),
            "subscribed to group events"
        );

        subscription
    }

    fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher.get_or_init(|| {
            Dispatcher::start(&self.dispatcher_name, Arc::clone(&self.metric_sink))
        })
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members = self.members.read();
        f.debug_struct("Group")
            .field("breakers", &members.breakers.len())
            .field("caches", &members.caches.len())
            .field("subscribers", &members.observers.len())
            .field("breaker_factory", &self.breaker_factory.is_some())
            .field("cache_factory", &self.cache_factory.is_some())
            .finish()
    }
}
