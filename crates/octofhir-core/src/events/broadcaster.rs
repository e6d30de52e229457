//! Event broadcaster for committed changes.
//!
//! The write path publishes each `ChangeEvent` once; every consumer path
//! holds its own unbounded queue and therefore sees every event, in publish
//! order. Publishing never waits on consumers and never drops an event for a
//! live subscriber.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use super::types::ChangeEvent;

type Subscribers = Vec<mpsc::UnboundedSender<Arc<ChangeEvent>>>;

/// Broadcaster for change events.
///
/// Cheap to clone; all clones publish to the same subscribers.
///
/// # Example
///
/// ```
/// use octofhir_core::events::{ChangeEvent, EventBroadcaster};
///
/// let broadcaster = EventBroadcaster::new();
/// let _receiver = broadcaster.subscribe();
///
/// let delivered = broadcaster.publish(ChangeEvent::created("Patient", "A", serde_json::json!({})));
/// assert_eq!(delivered, 1);
/// ```
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new broadcaster wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event,
    /// 0 if there are none. Subscribers whose receiver was dropped are pruned.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.publish_shared(Arc::new(event))
    }

    /// Publish an already shared event.
    pub fn publish_shared(&self, event: Arc<ChangeEvent>) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        subscribers.len()
    }

    /// Subscribe to events.
    ///
    /// Events sent before subscription are not received.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Arc<ChangeEvent>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().push(sender);
        receiver
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|s| !s.is_closed()).count()
    }

    /// Check if there are any active subscribers.
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
