//! Named-event fan-out.
//!
//! The connection publishes every incoming event into an [`EventHub`];
//! consumers subscribe to the names they care about. A [`Subscription`]
//! unregisters itself when dropped, so a listener never outlives the
//! component that owns it.
//!
//! A single subscription may cover several names. Events matching any of
//! them arrive on one channel in publish order, which keeps a `created`
//! followed by a `deleted` for the same entity in that order.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

/// An event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event name.
    pub name: String,
    /// First event argument.
    pub payload: Value,
}

struct Route {
    id: u64,
    names: Vec<String>,
    tx: mpsc::UnboundedSender<Event>,
}

#[derive(Default)]
struct Routes {
    next_id: u64,
    routes: Vec<Route>,
}

/// Registry of event listeners. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<Routes>>,
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscriptions", &self.inner.lock().routes.len())
            .finish()
    }
}

impl EventHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a single event name.
    pub fn subscribe(&self, name: impl Into<String>) -> Subscription {
        self.subscribe_all([name.into()])
    }

    /// Subscribes to several event names on one ordered channel.
    pub fn subscribe_all<I, S>(&self, names: I) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut routes = self.inner.lock();
        let id = routes.next_id;
        routes.next_id += 1;
        tracing::trace!(id, ?names, "subscribed");
        routes.routes.push(Route { id, names, tx });
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers an event to every matching subscription.
    ///
    /// Returns how many subscriptions received it.
    pub fn publish(&self, name: &str, payload: Value) -> usize {
        let mut routes = self.inner.lock();
        let mut delivered = 0;
        routes.routes.retain(|route| {
            if !route.names.iter().any(|n| n == name) {
                return !route.tx.is_closed();
            }
            let event = Event {
                name: name.to_string(),
                payload: payload.clone(),
            };
            if route.tx.send(event).is_ok() {
                delivered += 1;
                true
            } else {
                false
            }
        });
        tracing::trace!(name, delivered, "event published");
        delivered
    }

    /// Number of live subscriptions covering `name`.
    #[must_use]
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .routes
            .iter()
            .filter(|r| !r.tx.is_closed() && r.names.iter().any(|n| n == name))
            .count()
    }
}

/// Receiving end of a hub subscription.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Event>,
    hub: Weak<Mutex<Routes>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    /// Waits for the next event. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Returns a queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.lock().routes.retain(|r| r.id != self.id);
        }
    }
}
