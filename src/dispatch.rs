//! Background fan-out of creation events.
//!
//! The group hands each event, together with the subscribers registered at
//! that moment, to a single worker thread through an unbounded FIFO intake.
//! The worker pushes the event into every subscriber's ring buffer. Handing
//! off is a queue push, so get-or-create never waits on subscribers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::channel::EventSender;
use crate::event::GroupEvent;
use crate::metrics::MetricSink;

/// Subscribers an event is addressed to.
pub(crate) type Targets = SmallVec<[EventSender; 4]>;

struct Job {
    event: GroupEvent,
    targets: Targets,
}

struct IntakeState {
    jobs: VecDeque<Job>,
    closed: bool,
}

struct Intake {
    state: Mutex<IntakeState>,
    ready: Condvar,
}

pub(crate) struct Dispatcher {
    intake: Option<Arc<Intake>>,
    metric_sink: Arc<dyn MetricSink>,
}

impl Dispatcher {
    /// Starts the worker thread.
    ///
    /// If the thread cannot be spawned the dispatcher delivers inline
    /// instead, which still never blocks on a subscriber.
    pub(crate) fn start(name: &str, metric_sink: Arc<dyn MetricSink>) -> Self {
        let intake = Arc::new(Intake {
            state: Mutex::new(IntakeState {
                jobs: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        });

        let worker_intake = Arc::clone(&intake);
        let worker_sink = Arc::clone(&metric_sink);
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&worker_intake, worker_sink.as_ref()));

        match spawned {
            Ok(_) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(thread = name, "event dispatcher started");

                Self {
                    intake: Some(intake),
                    metric_sink,
                }
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "failed to spawn event dispatcher, delivering inline");

                Self {
                    intake: None,
                    metric_sink,
                }
            }
        }
    }

    /// Queues `event` for delivery to `targets` and returns immediately.
    pub(crate) fn dispatch(&self, event: GroupEvent, targets: Targets) {
        let job = Job { event, targets };

        match &self.intake {
            Some(intake) => {
                intake.state.lock().jobs.push_back(job);
                intake.ready.notify_one();
            }
            None => deliver(job, self.metric_sink.as_ref()),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // The worker drains what is queued, then exits. Dropping the drained
        // jobs releases their senders, which closes the subscriptions.
        if let Some(intake) = &self.intake {
            intake.state.lock().closed = true;
            intake.ready.notify_all();
        }
    }
}

fn run(intake: &Intake, metric_sink: &dyn MetricSink) {
    loop {
        let job = {
            let mut state = intake.state.lock();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                if state.closed {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("event dispatcher stopped");
                    return;
                }
                intake.ready.wait(&mut state);
            }
        };

        deliver(job, metric_sink);
    }
}

fn deliver(job: Job, metric_sink: &dyn MetricSink) {
    let Job { event, targets } = job;
    let kind = event.kind();

    for target in targets.iter().filter(|t| !t.is_orphaned()) {
        if target.send(event.clone()) {
            metric_sink.record_event_dropped(kind);

            #[cfg(feature = "tracing")]
            tracing::trace!(
                event = %kind,
                key = event.key(),
                "subscriber queue full, dropped oldest event"
            );
        }
    }
}
