use guardgroup_rs::{
    Breaker, BreakerOpen, EventKind, Group, GroupStats, GuardKind, MemoryCache,
    RecvTimeoutError, Subscription, TryRecvError,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

struct NopBreaker;

impl Breaker for NopBreaker {
    fn allow(&self) -> Result<(), BreakerOpen> {
        Ok(())
    }
    fn mark_success(&self) {}
    fn mark_failed(&self) {}
}

fn group() -> Group {
    Group::new()
        .with_breaker(|_| Some(NopBreaker))
        .with_cache(|_| Some(MemoryCache::new()))
}

// Waits until the dispatcher has pushed `n` events into `sub`
fn wait_for_len(sub: &Subscription, n: usize) {
    let deadline = Instant::now() + WAIT;
    while sub.len() < n {
        assert!(Instant::now() < deadline, "timed out waiting for {} events", n);
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_subscriber_receives_creation_event() {
    let group = group();
    let events = group.subscribe();

    let breaker = group.get_or_new_breaker("/api/live").unwrap();

    let event = events.recv_timeout(WAIT).unwrap();
    assert_eq!(event.kind(), EventKind::BreakerAdded);
    assert_eq!(event.key(), "/api/live");

    // The event carries the stored instance itself
    let member = event.member().as_breaker().unwrap();
    assert!(Arc::ptr_eq(member, &breaker));
}

#[test]
fn test_hits_do_not_emit() {
    let group = group();
    let events = group.subscribe();

    group.get_or_new_breaker("k").unwrap();
    group.get_or_new_breaker("k").unwrap();
    group.get_or_new_breaker("k").unwrap();

    assert_eq!(events.recv_timeout(WAIT).unwrap().key(), "k");
    assert_eq!(
        events.recv_timeout(Duration::from_millis(100)).err(),
        Some(RecvTimeoutError::Timeout)
    );
}

#[test]
fn test_failed_construction_does_not_emit() {
    let group = Group::new().with_breaker(|key: &str| (key == "ok").then_some(NopBreaker));
    let events = group.subscribe();

    assert!(group.get_or_new_breaker("nope").is_err());
    group.get_or_new_breaker("ok").unwrap();

    assert_eq!(events.recv_timeout(WAIT).unwrap().key(), "ok");
    assert_eq!(events.try_recv().err(), Some(TryRecvError::Empty));
}

#[test]
fn test_events_arrive_in_creation_order() {
    let group = group();
    let events = group.subscribe();

    let keys: Vec<String> = (0..20).map(|i| format!("/route/{}", i)).collect();
    for (i, key) in keys.iter().enumerate() {
        if i % 2 == 0 {
            group.get_or_new_breaker(key).unwrap();
        } else {
            group.get_or_new_cache(key).unwrap();
        }
    }

    for (i, key) in keys.iter().enumerate() {
        let event = events.recv_timeout(WAIT).unwrap();
        assert_eq!(event.key(), key);
        let expected = if i % 2 == 0 {
            EventKind::BreakerAdded
        } else {
            EventKind::CacheAdded
        };
        assert_eq!(event.kind(), expected);
    }
}

#[test]
fn test_cache_event_carries_cache() {
    let group = group();
    let events = group.subscribe();

    let cache = group.get_or_new_cache("c").unwrap();
    let event = events.recv_timeout(WAIT).unwrap();

    assert_eq!(event.kind(), EventKind::CacheAdded);
    assert_eq!(event.kind().guard_kind(), GuardKind::Cache);
    assert!(event.member().as_breaker().is_none());
    assert!(Arc::ptr_eq(event.member().as_cache().unwrap(), &cache));
}

#[test]
fn test_every_subscriber_gets_every_event() {
    let group = group();
    let subs: Vec<Subscription> = (0..4).map(|_| group.subscribe()).collect();
    assert_eq!(group.subscriber_count(), 4);

    group.get_or_new_breaker("a").unwrap();
    group.get_or_new_cache("a").unwrap();

    for sub in &subs {
        let first = sub.recv_timeout(WAIT).unwrap();
        let second = sub.recv_timeout(WAIT).unwrap();
        assert_eq!(first.kind(), EventKind::BreakerAdded);
        assert_eq!(second.kind(), EventKind::CacheAdded);
    }
}

#[test]
fn test_late_subscriber_isolation() {
    let group = group();
    let early = group.subscribe();

    group.get_or_new_breaker("before").unwrap();
    let late = group.subscribe();
    group.get_or_new_breaker("after").unwrap();

    assert_eq!(early.recv_timeout(WAIT).unwrap().key(), "before");
    assert_eq!(early.recv_timeout(WAIT).unwrap().key(), "after");

    assert_eq!(late.recv_timeout(WAIT).unwrap().key(), "after");
    assert_eq!(
        late.recv_timeout(Duration::from_millis(100)).err(),
        Some(RecvTimeoutError::Timeout)
    );

    // Looking up an existing key after subscribing emits nothing either
    group.get_or_new_breaker("before").unwrap();
    assert!(late.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_overflow_drops_oldest() {
    const CAPACITY: usize = 100;

    let group = group();
    let events = group.subscribe();
    assert_eq!(events.capacity(), CAPACITY);

    for i in 0..=CAPACITY {
        group.get_or_new_breaker(&format!("key-{}", i)).unwrap();
    }

    let deadline = Instant::now() + WAIT;
    while events.dropped() < 1 {
        assert!(Instant::now() < deadline, "overflow never happened");
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(events.len(), CAPACITY);
    assert_eq!(events.dropped(), 1);

    // The oldest event was discarded, so reading starts at the second one
    assert_eq!(events.try_recv().unwrap().key(), "key-1");

    let rest: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.key().to_string())
        .collect();
    assert_eq!(rest.len(), CAPACITY - 1);
    assert_eq!(rest.last().map(String::as_str), Some("key-100"));
}

#[test]
fn test_small_subscription_keeps_most_recent() {
    let stats = Arc::new(GroupStats::new());
    let group = Group::builder()
        .breaker(|_| Some(NopBreaker))
        .subscription_capacity(3)
        .metric_sink(Arc::clone(&stats))
        .build();

    let small = group.subscribe();
    let roomy = group.subscribe_with_capacity(16);

    for i in 0..8 {
        group.get_or_new_breaker(&format!("k{}", i)).unwrap();
    }
    wait_for_len(&roomy, 8);
    wait_for_len(&small, 3);

    let kept: Vec<String> = std::iter::from_fn(|| small.try_recv().ok())
        .map(|e| e.key().to_string())
        .collect();
    assert_eq!(kept, vec!["k5", "k6", "k7"]);
    assert_eq!(small.dropped(), 5);
    assert_eq!(roomy.dropped(), 0);
    assert_eq!(stats.dropped_events(GuardKind::Breaker), 5);
}

#[test]
fn test_slow_subscriber_does_not_block_creation() {
    let group = Arc::new(group());
    let _ignored = group.subscribe_with_capacity(1);

    let started = Instant::now();
    for i in 0..1_000 {
        group.get_or_new_breaker(&format!("k{}", i)).unwrap();
    }

    assert_eq!(group.breaker_count(), 1_000);
    assert!(started.elapsed() < WAIT);
}

#[test]
fn test_blocking_recv_from_another_thread() {
    let group = Arc::new(group());
    let events = group.subscribe();

    let consumer = thread::spawn(move || {
        let mut keys = Vec::new();
        for event in events.iter().take(3) {
            keys.push(event.key().to_string());
        }
        keys
    });

    for key in ["x", "y", "z"] {
        group.get_or_new_cache(key).unwrap();
    }

    assert_eq!(consumer.join().unwrap(), vec!["x", "y", "z"]);
}

#[test]
fn test_stream_ends_when_group_is_dropped() {
    let group = group();
    let events = group.subscribe();

    group.get_or_new_breaker("last").unwrap();
    drop(group);

    let keys: Vec<String> = events.into_iter().map(|e| e.key().to_string()).collect();
    assert_eq!(keys, vec!["last"]);
}

#[test]
fn test_dropped_subscription_is_tolerated() {
    let group = group();
    let gone = group.subscribe();
    let kept = group.subscribe();
    drop(gone);

    group.get_or_new_breaker("k").unwrap();

    assert_eq!(kept.recv_timeout(WAIT).unwrap().key(), "k");
    assert_eq!(group.subscriber_count(), 2);
}

#[test]
fn test_concurrent_creation_emits_once_per_key() {
    const THREADS: usize = 8;
    const KEYS: usize = 20;

    let group = Arc::new(group());
    let events = group.subscribe();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let group = Arc::clone(&group);
            thread::spawn(move || {
                for k in 0..KEYS {
                    group.get_or_new_breaker(&format!("k{}", k)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut keys: Vec<String> = (0..KEYS)
        .map(|_| events.recv_timeout(WAIT).unwrap().key().to_string())
        .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), KEYS);
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_recv_timeout_accepts_unbounded_wait() {
    let group = group();
    let events = group.subscribe();

    group.get_or_new_breaker("k").unwrap();
    let event = events.recv_timeout(Duration::MAX).unwrap();
    assert_eq!(event.key(), "k");

    drop(group);
    assert_eq!(
        events.recv_timeout(Duration::MAX).map(|e| e.kind()),
        Err(RecvTimeoutError::Closed)
    );
}
