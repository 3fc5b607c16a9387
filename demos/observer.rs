use guardgroup_rs::{ConsecutiveBreaker, EventKind, Group, GroupStats, GuardKind, MemoryCache};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let stats = Arc::new(GroupStats::new());
    let group = Arc::new(
        Group::builder()
            .breaker(|_| Some(ConsecutiveBreaker::new()))
            .cache(|_| Some(MemoryCache::new()))
            .metric_sink(Arc::clone(&stats))
            .build(),
    );

    // An observer that logs every guard the group creates
    let events = group.subscribe();
    let observer = thread::spawn(move || {
        for event in events {
            match event.kind() {
                EventKind::BreakerAdded => println!("observer: new breaker for {}", event.key()),
                EventKind::CacheAdded => println!("observer: new cache for {}", event.key()),
            }
        }
        println!("observer: group gone, stopping");
    });

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let group = Arc::clone(&group);
            thread::spawn(move || {
                for i in 0..5 {
                    let route = format!("/api/{}", (worker + i) % 6);
                    let _ = group.get_or_new_breaker(&route);
                    let _ = group.get_or_new_cache(&route);
                    thread::sleep(Duration::from_millis(10));
                }
            })
        })
        .collect();

    for worker in workers {
        let _ = worker.join();
    }

    println!(
        "breakers: {}, caches: {}, breaker hit rate: {:.2}",
        group.breaker_count(),
        group.cache_count(),
        stats.hit_rate(GuardKind::Breaker)
    );

    // Dropping the last handle closes the observer's stream
    drop(group);
    let _ = observer.join();
}
