//! Metric sinks for group activity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::event::EventKind;
use crate::guard::GuardKind;

/// Trait for sinks that receive group activity.
///
/// Methods are called on the lookup path and on the dispatcher thread, so
/// implementations should be cheap and must not block.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a get-or-create lookup and whether the key already existed.
    fn record_lookup(&self, kind: GuardKind, hit: bool);

    /// Records a guard created and stored for a new key.
    fn record_created(&self, kind: GuardKind);

    /// Records a factory that returned no instance.
    fn record_create_failed(&self, kind: GuardKind);

    /// Records an event discarded from a full subscription queue.
    fn record_event_dropped(&self, kind: EventKind);
}

/// A null metrics sink that discards all events.
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_lookup(&self, _kind: GuardKind, _hit: bool) {}
    fn record_created(&self, _kind: GuardKind) {}
    fn record_create_failed(&self, _kind: GuardKind) {}
    fn record_event_dropped(&self, _kind: EventKind) {}
}

impl<M: MetricSink> MetricSink for Arc<M> {
    fn record_lookup(&self, kind: GuardKind, hit: bool) {
        (**self).record_lookup(kind, hit)
    }

    fn record_created(&self, kind: GuardKind) {
        (**self).record_created(kind)
    }

    fn record_create_failed(&self, kind: GuardKind) {
        (**self).record_create_failed(kind)
    }

    fn record_event_dropped(&self, kind: EventKind) {
        (**self).record_event_dropped(kind)
    }
}

#[derive(Debug, Default)]
struct KindCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    created: AtomicU64,
    failed: AtomicU64,
    dropped_events: AtomicU64,
}

/// In-process counters for group activity.
///
/// Pass an `Arc<GroupStats>` to [`GroupBuilder::metric_sink`](crate::GroupBuilder::metric_sink)
/// and keep a clone to read the counters.
#[derive(Debug, Default)]
pub struct GroupStats {
    breakers: KindCounters,
    caches: KindCounters,
}

impl GroupStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, kind: GuardKind) -> &KindCounters {
        match kind {
            GuardKind::Breaker => &self.breakers,
            GuardKind::Cache => &self.caches,
        }
    }

    /// Lookups that found an existing guard.
    pub fn hits(&self, kind: GuardKind) -> u64 {
        self.counters(kind).hits.load(Ordering::Relaxed)
    }

    /// Lookups that had to consult the factory.
    pub fn misses(&self, kind: GuardKind) -> u64 {
        self.counters(kind).misses.load(Ordering::Relaxed)
    }

    /// Guards created and stored.
    pub fn created(&self, kind: GuardKind) -> u64 {
        self.counters(kind).created.load(Ordering::Relaxed)
    }

    /// Factory calls that produced nothing.
    pub fn create_failures(&self, kind: GuardKind) -> u64 {
        self.counters(kind).failed.load(Ordering::Relaxed)
    }

    /// Events of this kind lost to full subscription queues, across all subscribers.
    pub fn dropped_events(&self, kind: GuardKind) -> u64 {
        self.counters(kind).dropped_events.load(Ordering::Relaxed)
    }

    /// Fraction of lookups that hit an existing guard.
    pub fn hit_rate(&self, kind: GuardKind) -> f64 {
        let hits = self.hits(kind);
        let total = hits + self.misses(kind);

        if total == 0 {
            return 0.0;
        }

        hits as f64 / total as f64
    }

    /// Resets all counters.
    pub fn reset(&self) {
        for c in [&self.breakers, &self.caches] {
            c.hits.store(0, Ordering::Relaxed);
            c.misses.store(0, Ordering::Relaxed);
            c.created.store(0, Ordering::Relaxed);
            c.failed.store(0, Ordering::Relaxed);
            c.dropped_events.store(0, Ordering::Relaxed);
        }
    }
}

impl MetricSink for GroupStats {
    fn record_lookup(&self, kind: GuardKind, hit: bool) {
        let c = self.counters(kind);
        if hit {
            c.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            c.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_created(&self, kind: GuardKind) {
        self.counters(kind).created.fetch_add(1, Ordering::Relaxed);
    }

    fn record_create_failed(&self, kind: GuardKind) {
        self.counters(kind).failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_event_dropped(&self, kind: EventKind) {
        self.counters(kind.guard_kind())
            .dropped_events
            .fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(feature = "prometheus")]
pub use self::prometheus::PrometheusSink;

#[cfg(feature = "prometheus")]
mod prometheus {
    use super::MetricSink;
    use crate::event::EventKind;
    use crate::guard::GuardKind;
    use prometheus_client::encoding::EncodeLabelSet;
    use prometheus_client::metrics::counter::Counter;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::registry::Registry;

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct KindLabels {
        kind: &'static str,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct LookupLabels {
        kind: &'static str,
        result: &'static str,
    }

    /// Exports group activity as Prometheus counters.
    #[cfg_attr(docsrs, doc(cfg(feature = "prometheus")))]
    pub struct PrometheusSink {
        lookups: Family<LookupLabels, Counter>,
        created: Family<KindLabels, Counter>,
        create_failures: Family<KindLabels, Counter>,
        dropped_events: Family<KindLabels, Counter>,
    }

    impl PrometheusSink {
        /// Creates the counters and registers them under `registry`.
        pub fn new(registry: &mut Registry) -> Self {
            let sink = Self {
                lookups: Family::default(),
                created: Family::default(),
                create_failures: Family::default(),
                dropped_events: Family::default(),
            };

            registry.register(
                "guardgroup_lookups",
                "Get-or-create lookups by guard kind and hit/miss",
                sink.lookups.clone(),
            );
            registry.register(
                "guardgroup_created",
                "Guards created for new keys",
                sink.created.clone(),
            );
            registry.register(
                "guardgroup_create_failures",
                "Factory calls that returned no instance",
                sink.create_failures.clone(),
            );
            registry.register(
                "guardgroup_dropped_events",
                "Creation events discarded from full subscription queues",
                sink.dropped_events.clone(),
            );

            sink
        }
    }

    impl MetricSink for PrometheusSink {
        fn record_lookup(&self, kind: GuardKind, hit: bool) {
            self.lookups
                .get_or_create(&LookupLabels {
                    kind: kind.as_str(),
                    result: if hit { "hit" } else { "miss" },
                })
                .inc();
        }

        fn record_created(&self, kind: GuardKind) {
            self.created
                .get_or_create(&KindLabels {
                    kind: kind.as_str(),
                })
                .inc();
        }

        fn record_create_failed(&self, kind: GuardKind) {
            self.create_failures
                .get_or_create(&KindLabels {
                    kind: kind.as_str(),
                })
                .inc();
        }

        fn record_event_dropped(&self, kind: EventKind) {
            self.dropped_events
                .get_or_create(&KindLabels {
                    kind: kind.guard_kind().as_str(),
                })
                .inc();
        }
    }
}
