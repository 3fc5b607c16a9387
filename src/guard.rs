//! Capability contracts for the guards a group hands out.
//!
//! The group never looks inside a guard. Anything that implements [`Breaker`]
//! or [`Cache`] can be produced by a factory and stored.

use std::any::Any;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BreakerOpen, CallError};

/// Which of the two guard maps an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    /// Circuit breakers.
    Breaker,

    /// Caches.
    Cache,
}

impl GuardKind {
    /// Short lowercase label, suitable for log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::Breaker => "breaker",
            GuardKind::Cache => "cache",
        }
    }
}

impl Display for GuardKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A circuit breaker capability.
///
/// Implementations are shared between every caller that looks up the same
/// key, so they must do their own synchronization.
pub trait Breaker: Send + Sync + 'static {
    /// Decides whether a call may proceed. `Ok(())` admits it.
    fn allow(&self) -> Result<(), BreakerOpen>;

    /// Records that an admitted call succeeded.
    fn mark_success(&self);

    /// Records that an admitted call failed.
    fn mark_failed(&self);
}

/// Value stored in a [`Cache`].
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// A key/value cache capability with per-entry expiration.
pub trait Cache: Send + Sync + 'static {
    /// Returns the value stored under `key`, if present and not expired.
    fn get(&self, key: &str) -> Option<CacheValue>;

    /// Stores `value` under `key` for `ttl`.
    fn set(&self, key: &str, value: CacheValue, ttl: Duration);
}

impl dyn Cache {
    /// Fetches `key` and downcasts it to `T`.
    ///
    /// Returns `None` when the key is absent or holds a different type.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key)?.downcast::<T>().ok()
    }
}

/// Runs `f` behind `breaker`, recording the outcome.
///
/// Rejected calls never run `f` and are not recorded.
pub fn call<B, F, T, E>(breaker: &B, f: F) -> Result<T, CallError<E>>
where
    B: Breaker + ?Sized,
    F: FnOnce() -> Result<T, E>,
{
    breaker.allow()?;

    match f() {
        Ok(value) => {
            breaker.mark_success();
            Ok(value)
        }
        Err(e) => {
            breaker.mark_failed();
            Err(CallError::Operation(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct Recorder {
        open: AtomicBool,
        successes: AtomicU32,
        failures: AtomicU32,
    }

    impl Breaker for Recorder {
        fn allow(&self) -> Result<(), BreakerOpen> {
            if self.open.load(Ordering::SeqCst) {
                Err(BreakerOpen)
            } else {
                Ok(())
            }
        }

        fn mark_success(&self) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }

        fn mark_failed(&self) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn call_records_outcomes() {
        let breaker = Recorder::default();

        let ok: Result<u8, CallError<&str>> = call(&breaker, || Ok(7));
        assert_eq!(ok.ok(), Some(7));

        let err: Result<u8, CallError<&str>> = call(&breaker, || Err("boom"));
        assert!(matches!(err, Err(CallError::Operation("boom"))));

        assert_eq!(breaker.successes.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn call_skips_operation_when_open() {
        let breaker = Recorder::default();
        breaker.open.store(true, Ordering::SeqCst);

        let ran = AtomicBool::new(false);
        let result: Result<(), CallError<()>> = call(&breaker, || {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        });

        assert!(matches!(result, Err(CallError::Open)));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(breaker.failures.load(Ordering::SeqCst), 0);
    }

    #[derive(Default)]
    struct MapCache(Mutex<Vec<(String, CacheValue)>>);

    impl Cache for MapCache {
        fn get(&self, key: &str) -> Option<CacheValue> {
            self.0
                .lock()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| Arc::clone(v))
        }

        fn set(&self, key: &str, value: CacheValue, _ttl: Duration) {
            self.0.lock().push((key.to_string(), value));
        }
    }

    #[test]
    fn get_as_downcasts() {
        let cache: Arc<dyn Cache> = Arc::new(MapCache::default());
        cache.set("n", Arc::new(42u64), Duration::from_secs(1));

        assert_eq!(cache.get_as::<u64>("n").as_deref(), Some(&42));
        assert!(cache.get_as::<String>("n").is_none());
        assert!(cache.get_as::<u64>("missing").is_none());
    }
}
