//! # SubscriberSet: per-subscriber queues fed from the run's bus.
//!
//! The supervisor's forwarder hands every bus event to [`SubscriberSet::emit`],
//! which enqueues it for each subscriber that [accepts](Subscribe::accepts) its
//! kind and returns without waiting for any of them.
//!
//! ```text
//! forwarder ── emit(&Event) ──┬─ accepts? ─► [queue S1] ─► worker S1 ─► on_event()
//!                             ├─ accepts? ─► [queue S2] ─► worker S2 ─► on_event()
//!                             └─ filtered     (never queued, never counted)
//! ```
//!
//! ## Rules
//! - One queue and one worker per subscriber; events arrive in bus order.
//! - A full queue drops the event for that subscriber only; drops are counted.
//! - A panicking handler is logged and the worker moves on to the next event.
//! - No ordering between subscribers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::TaskError;
use crate::events::Event;

use super::Subscribe;

struct Queue {
    sub: Arc<dyn Subscribe>,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Per-subscriber drop counters, shared with whoever outlives the set's owner.
#[derive(Clone, Default)]
pub(crate) struct DropCounts(Arc<[(&'static str, AtomicU64)]>);

impl DropCounts {
    pub(crate) fn snapshot(&self) -> Vec<(&'static str, u64)> {
        self.0
            .iter()
            .map(|(name, n)| (*name, n.load(Ordering::Relaxed)))
            .collect()
    }

    /// Counts one more drop for the `i`-th subscriber; returns the new total.
    fn add(&self, i: usize) -> u64 {
        self.0[i].1.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Fan-out over subscribers, one bounded queue and worker each.
pub struct SubscriberSet {
    queues: Vec<Queue>,
    drops: DropCounts,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber.
    ///
    /// Must be called inside a Tokio runtime when `subs` is not empty.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut queues = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
            workers.push(tokio::spawn(drive(Arc::clone(&sub), rx)));
            queues.push(Queue { sub, tx });
        }
        let drops = DropCounts(
            queues
                .iter()
                .map(|q| (q.sub.name(), AtomicU64::new(0)))
                .collect(),
        );
        Self {
            queues,
            drops,
            workers,
        }
    }

    /// Enqueues `event` for every subscriber accepting its kind. Never waits.
    pub fn emit(&self, event: &Event) {
        let mut shared: Option<Arc<Event>> = None;
        for (i, q) in self.queues.iter().enumerate() {
            if !q.sub.accepts(event.kind) {
                continue;
            }
            let ev = shared.get_or_insert_with(|| Arc::new(event.clone()));
            if let Err(err) = q.tx.try_send(Arc::clone(ev)) {
                let total = self.drops.add(i);
                let reason = match err {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "worker gone",
                };
                tracing::warn!(
                    subscriber = q.sub.name(),
                    reason,
                    seq = event.seq,
                    dropped = total,
                    "event not delivered to subscriber"
                );
            }
        }
    }

    /// Events dropped so far, per subscriber name, in registration order.
    pub fn dropped(&self) -> Vec<(&'static str, u64)> {
        self.drops.snapshot()
    }

    /// Counters that stay readable after the set moved into its forwarder.
    pub(crate) fn drop_counts(&self) -> DropCounts {
        self.drops.clone()
    }

    /// Closes every queue and waits until the workers drained them.
    pub async fn shutdown(self) {
        drop(self.queues);
        for worker in self.workers {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "subscriber worker did not finish");
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }
}

async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev))
            .catch_unwind()
            .await;
        if let Err(panic) = handled {
            let info = TaskError::from_panic(panic);
            tracing::warn!(subscriber = sub.name(), seq = ev.seq, %info, "subscriber panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        kinds: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.kinds.lock().unwrap().push(event.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _event: &Event) {
            panic!("exporter bug");
        }
    }

    /// Only failures; a single-slot queue nobody drains until shutdown.
    struct FailuresOnly;

    #[async_trait]
    impl Subscribe for FailuresOnly {
        async fn on_event(&self, _event: &Event) {}
        fn name(&self) -> &'static str {
            "failures"
        }
        fn accepts(&self, kind: EventKind) -> bool {
            kind == EventKind::SubsystemFailed
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_starve_others() {
        let rec = Arc::new(Recorder::default());
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Panicky), rec.clone()];
        let set = SubscriberSet::new(subs);
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::RunStarting));
        set.emit(&Event::new(EventKind::AllStopped));
        set.shutdown().await;

        assert_eq!(
            *rec.kinds.lock().unwrap(),
            vec![EventKind::RunStarting, EventKind::AllStopped]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn filtered_events_are_not_counted_as_drops() {
        let set = SubscriberSet::new(vec![Arc::new(FailuresOnly) as Arc<dyn Subscribe>]);

        // The worker does not run before the next await: the queue holds one event.
        for _ in 0..10 {
            set.emit(&Event::new(EventKind::SubsystemStopping));
        }
        set.emit(&Event::new(EventKind::SubsystemFailed));
        set.emit(&Event::new(EventKind::SubsystemFailed));

        assert_eq!(set.dropped(), vec![("failures", 1)]);
        let counts = set.drop_counts();
        set.shutdown().await;
        assert_eq!(counts.snapshot(), vec![("failures", 1)]);
    }

    #[test]
    fn empty_set_needs_no_runtime() {
        let set = SubscriberSet::new(Vec::new());
        assert!(set.is_empty());
        set.emit(&Event::new(EventKind::RunStarting));
        assert!(set.dropped().is_empty());
    }
}
