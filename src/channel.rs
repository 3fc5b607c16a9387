//! Bounded drop-oldest event queues.
//!
//! Each subscription owns one ring buffer. Pushing never waits on the
//! consumer: when the buffer is full the oldest queued event is discarded to
//! make room for the new one. The queue closes once every sender is gone.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{RecvTimeoutError, TryRecvError};
use crate::event::GroupEvent;

struct Buffer<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    buffer: Mutex<Buffer<T>>,
    available: Condvar,
    capacity: usize,
    senders: AtomicUsize,
    dropped: AtomicU64,
    #[cfg(feature = "async")]
    notify: tokio::sync::Notify,
}

impl<T> Shared<T> {
    fn wake(&self) {
        self.available.notify_one();
        #[cfg(feature = "async")]
        self.notify.notify_one();
    }
}

/// Producer half. Cloned into dispatch jobs; the queue closes when the last clone drops.
pub(crate) struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer half of a bounded drop-oldest queue.
pub(crate) struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

pub(crate) fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        buffer: Mutex::new(Buffer {
            items: VecDeque::with_capacity(capacity),
            closed: false,
        }),
        available: Condvar::new(),
        capacity,
        senders: AtomicUsize::new(1),
        dropped: AtomicU64::new(0),
        #[cfg(feature = "async")]
        notify: tokio::sync::Notify::new(),
    });

    (
        Sender {
            shared: Arc::clone(&shared),
        },
        Receiver { shared },
    )
}

impl<T> Sender<T> {
    /// Queues `item`, evicting the oldest queued item if the buffer is full.
    ///
    /// Returns `true` when an item was evicted.
    pub(crate) fn send(&self, item: T) -> bool {
        let evicted = {
            let mut buffer = self.shared.buffer.lock();
            let evicted = if buffer.items.len() >= self.shared.capacity {
                buffer.items.pop_front().is_some()
            } else {
                false
            };
            buffer.items.push_back(item);
            evicted
        };

        if evicted {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.wake();
        evicted
    }

    /// Whether the consumer half has been dropped.
    pub(crate) fn is_orphaned(&self) -> bool {
        Arc::strong_count(&self.shared) <= self.shared.senders.load(Ordering::Acquire)
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        // Bump the Arc before the sender count so `is_orphaned` never sees
        // more senders than references.
        let shared = Arc::clone(&self.shared);
        shared.senders.fetch_add(1, Ordering::AcqRel);
        Self { shared }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.buffer.lock().closed = true;
            self.shared.available.notify_all();
            #[cfg(feature = "async")]
            {
                self.shared.notify.notify_waiters();
                self.shared.notify.notify_one();
            }
        }
    }
}

impl<T> Receiver<T> {
    fn recv(&self) -> Option<T> {
        let mut buffer = self.shared.buffer.lock();
        loop {
            if let Some(item) = buffer.items.pop_front() {
                return Some(item);
            }
            if buffer.closed {
                return None;
            }
            self.shared.available.wait(&mut buffer);
        }
    }

    fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut buffer = self.shared.buffer.lock();
        match buffer.items.pop_front() {
            Some(item) => Ok(item),
            None if buffer.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.recv().ok_or(RecvTimeoutError::Closed);
        };
        let mut buffer = self.shared.buffer.lock();
        loop {
            if let Some(item) = buffer.items.pop_front() {
                return Ok(item);
            }
            if buffer.closed {
                return Err(RecvTimeoutError::Closed);
            }
            if self
                .shared
                .available
                .wait_until(&mut buffer, deadline)
                .timed_out()
            {
                return buffer.items.pop_front().ok_or(RecvTimeoutError::Timeout);
            }
        }
    }

    #[cfg(feature = "async")]
    async fn recv_async(&self) -> Option<T> {
        loop {
            // Registered before the check so a close between the check and the
            // await still wakes every task waiting on this receiver.
            let mut notified = std::pin::pin!(self.shared.notify.notified());
            notified.as_mut().enable();
            {
                let mut buffer = self.shared.buffer.lock();
                if let Some(item) = buffer.items.pop_front() {
                    return Some(item);
                }
                if buffer.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    fn len(&self) -> usize {
        self.shared.buffer.lock().items.len()
    }

    fn is_closed(&self) -> bool {
        self.shared.buffer.lock().closed
    }

    fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Sending side of a subscription, held by the group and by dispatch jobs.
pub(crate) type EventSender = Sender<GroupEvent>;

/// A stream of [`GroupEvent`]s returned by [`Group::subscribe`](crate::Group::subscribe).
///
/// Events queue up to [`capacity`](Subscription::capacity); past that the
/// oldest undelivered event is discarded for each new one. A subscriber that
/// falls behind always sees the most recent events, never necessarily all of
/// them. Dropping the subscription is the only way to stop receiving; the
/// group keeps its sending half until the group itself goes away.
pub struct Subscription {
    rx: Receiver<GroupEvent>,
}

impl Subscription {
    pub(crate) fn new(capacity: usize) -> (EventSender, Self) {
        let (tx, rx) = bounded(capacity);
        (tx, Self { rx })
    }

    /// Blocks until an event is available.
    ///
    /// Returns `None` once the group is gone and every queued event has been read.
    pub fn recv(&self) -> Option<GroupEvent> {
        self.rx.recv()
    }

    /// Returns a queued event without blocking.
    pub fn try_recv(&self) -> Result<GroupEvent, TryRecvError> {
        self.rx.try_recv()
    }

    /// Blocks for at most `timeout` waiting for an event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<GroupEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Waits asynchronously for the next event.
    #[cfg(feature = "async")]
    #[cfg_attr(docsrs, doc(cfg(feature = "async")))]
    pub async fn recv_async(&self) -> Option<GroupEvent> {
        self.rx.recv_async().await
    }

    /// Converts the subscription into a [`futures::Stream`] of events.
    #[cfg(feature = "async")]
    #[cfg_attr(docsrs, doc(cfg(feature = "async")))]
    pub fn into_stream(self) -> impl futures::Stream<Item = GroupEvent> + Send + 'static {
        futures::stream::unfold(self, |sub| async move {
            let event = sub.recv_async().await?;
            Some((event, sub))
        })
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no events are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of events held before the oldest is discarded.
    pub fn capacity(&self) -> usize {
        self.rx.shared.capacity
    }

    /// Total events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.rx.dropped()
    }

    /// Whether the group side has gone away. Queued events can still be read.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }

    /// Blocking iterator over events, ending when the stream closes.
    pub fn iter(&self) -> Iter<'_> {
        Iter { sub: self }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Borrowing iterator returned by [`Subscription::iter`].
pub struct Iter<'a> {
    sub: &'a Subscription,
}

impl Iterator for Iter<'_> {
    type Item = GroupEvent;

    fn next(&mut self) -> Option<GroupEvent> {
        self.sub.recv()
    }
}

/// Owning iterator over a subscription's events.
pub struct IntoIter {
    sub: Subscription,
}

impl Iterator for IntoIter {
    type Item = GroupEvent;

    fn next(&mut self) -> Option<GroupEvent> {
        self.sub.recv()
    }
}

impl IntoIterator for Subscription {
    type Item = GroupEvent;
    type IntoIter = IntoIter;

    fn into_iter(self) -> IntoIter {
        IntoIter { sub: self }
    }
}

impl<'a> IntoIterator for &'a Subscription {
    type Item = GroupEvent;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    #[test]
    fn overflow_drops_oldest() {
        let (tx, rx) = bounded(3);
        for i in 0..4 {
            tx.send(i);
        }

        assert_eq!(rx.dropped(), 1);
        assert_eq!(rx.try_recv(), Ok(1));
        assert_eq!(rx.try_recv(), Ok(2));
        assert_eq!(rx.try_recv(), Ok(3));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn send_reports_eviction() {
        let (tx, _rx) = bounded(1);
        assert!(!tx.send("a"));
        assert!(tx.send("b"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (tx, rx) = bounded(0);
        tx.send(1);
        tx.send(2);
        assert_eq!(rx.try_recv(), Ok(2));
    }

    #[test]
    fn closes_after_last_sender_drops() {
        let (tx, rx) = bounded(4);
        let tx2 = tx.clone();
        tx.send(1);
        drop(tx);
        assert!(!rx.is_closed());

        drop(tx2);
        assert!(rx.is_closed());
        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.recv(), None);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn recv_wakes_on_send() {
        let (tx, rx) = bounded(4);
        let handle = thread::spawn(move || rx.recv());

        thread::sleep(Duration::from_millis(20));
        tx.send(9);

        assert_eq!(handle.join().unwrap(), Some(9));
    }

    #[test]
    fn recv_timeout_expires() {
        let (_tx, rx) = bounded::<u8>(4);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn recv_timeout_without_deadline() {
        let (tx, rx) = bounded(4);
        tx.send(3);
        assert_eq!(rx.recv_timeout(Duration::MAX), Ok(3));

        drop(tx);
        assert_eq!(
            rx.recv_timeout(Duration::MAX),
            Err(RecvTimeoutError::Closed)
        );
    }

    #[test]
    fn orphaned_after_receiver_drops() {
        let (tx, rx) = bounded::<u8>(4);
        let _tx2 = tx.clone();
        assert!(!tx.is_orphaned());
        drop(rx);
        assert!(tx.is_orphaned());
    }

    proptest! {
        #[test]
        fn keeps_most_recent_in_order(capacity in 1usize..16, items in prop::collection::vec(any::<u32>(), 0..64)) {
            let (tx, rx) = bounded(capacity);
            for item in &items {
                tx.send(*item);
            }

            let kept: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
            let skip = items.len().saturating_sub(capacity);

            prop_assert_eq!(&kept[..], &items[skip..]);
            prop_assert_eq!(rx.dropped(), skip as u64);
        }
    }
}
