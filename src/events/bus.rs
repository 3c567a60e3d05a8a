//! # Bus: where a run's lifecycle events go.
//!
//! One [`Bus`] per supervisor. The supervisor, every subsystem task and
//! [`Scope::mark_running`](crate::Scope::mark_running) publish into it; the
//! subscriber forwarder and [`Supervisor::subscribe`](crate::Supervisor::subscribe)
//! receivers read from it.
//!
//! ```text
//! SubsystemActor ─┐
//! Scope          ─┼─► Bus (tokio broadcast) ─┬─► forwarder ─► SubscriberSet
//! Supervisor     ─┘                          └─► Supervisor::subscribe() receivers
//! ```
//!
//! Publishing never waits and never fails: with no receiver the event is
//! discarded, and a receiver that falls more than `capacity` events behind
//! skips the oldest ones (`RecvError::Lagged`).

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast sender shared by everything that reports on a run.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus buffering up to `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Hands `ev` to every current receiver.
    pub fn publish(&self, ev: Event) {
        if self.tx.send(ev).is_err() {
            tracing::trace!("event published with no receiver");
        }
    }

    /// Receiver of the events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn receivers_only_see_later_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::RunStarting));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::StartupComplete));
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::StartupComplete);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn slow_receiver_lags() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        for kind in [
            EventKind::RunStarting,
            EventKind::StartupComplete,
            EventKind::ShutdownRequested,
        ] {
            bus.publish(Event::new(kind));
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(1))));
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::StartupComplete);
    }
}
