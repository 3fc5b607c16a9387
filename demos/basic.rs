use guardgroup_rs::{call, CallError, ConsecutiveBreaker, Group};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

fn main() {
    // One breaker per route, created the first time the route is called
    let group = Arc::new(Group::new().with_breaker(|route| {
        println!("building breaker for {}", route);
        Some(
            ConsecutiveBreaker::builder()
                .threshold(3)
                .initial_backoff(Duration::from_secs(1))
                .max_backoff(Duration::from_secs(4))
                .build(),
        )
    }));

    let routes = ["/api/liveChnList", "/api/users"];

    for attempt in 1..=12 {
        for route in routes {
            let breaker = match group.get_or_new_breaker(route) {
                Ok(breaker) => breaker,
                Err(err) => {
                    println!("no breaker for {}: {}", route, err);
                    continue;
                }
            };

            // The channel list endpoint is down for the first six attempts
            let healthy = route != "/api/liveChnList" || attempt > 6;
            let result = call(breaker.as_ref(), || {
                if healthy {
                    Ok(format!("{} ok", route))
                } else {
                    Err(ServiceError(format!("{} unavailable", route)))
                }
            });

            match result {
                Ok(body) => println!("attempt {}: {}", attempt, body),
                Err(CallError::Open) => println!("attempt {}: {} is cooling down", attempt, route),
                Err(CallError::Operation(err)) => println!("attempt {}: {}", attempt, err),
            }
        }

        thread::sleep(Duration::from_millis(400));
    }

    println!("\nbreakers created: {:?}", group.breaker_keys());
}
