use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use crate::{
    core::SupervisorConfig,
    events::Bus,
    listener::{EventListener, TracingListener},
    subscribers::{DropCounts, Subscribe, SubscriberSet},
};
use super::supervisor::Supervisor;

/// Builder for constructing a Supervisor with optional features.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    listener: Arc<dyn EventListener>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            listener: Arc::new(TracingListener),
            subscribers: Vec::new(),
        }
    }

    /// Sets the listener receiving subsystem logs and the startup/shutdown callbacks.
    ///
    /// Defaults to [`TracingListener`].
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (subsystem lifecycle, failures, etc.)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds and returns the Supervisor instance.
    ///
    /// Must be called inside a Tokio runtime when subscribers are set: their
    /// workers and the bus forwarder are spawned here.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let mut drops = DropCounts::default();
        if !self.subscribers.is_empty() {
            let subs = SubscriberSet::new(self.subscribers);
            drops = subs.drop_counts();
            subscriber_listener(&bus, subs);
        }
        Arc::new(Supervisor::new_internal(self.cfg, bus, self.listener, drops))
    }
}

/// Forwards bus events to the subscriber set until the bus closes.
fn subscriber_listener(bus: &Bus, subs: SubscriberSet) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => subs.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged; events skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        subs.shutdown().await;
    });
}
