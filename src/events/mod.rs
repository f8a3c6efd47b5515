//! Best-effort event delivery for secret lifecycle changes.
//!
//! Collaborators (webhook transports, cache invalidators) subscribe to a
//! broadcast channel; publishing never blocks or fails the mutating
//! operation. A subscriber that falls behind loses the oldest events.

use crate::domain::SecretEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Default broadcast channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out channel for [`SecretEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SecretEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus with the given buffered capacity per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SecretEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to current subscribers, best-effort.
    ///
    /// With no subscribers the event is dropped; either way the caller's
    /// operation proceeds unaffected.
    pub fn publish(&self, event: SecretEvent) {
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(receivers, "Secret event published");
            }
            Err(broadcast::error::SendError(event)) => {
                debug!(
                    event_type = event.event_type(),
                    secret_id = %event.secret_id,
                    "No subscribers for secret event"
                );
            }
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SecretEventKind, SecretId};

    fn event(kind: SecretEventKind) -> SecretEvent {
        SecretEvent::now(kind, SecretId::new(), "acme", "tester")
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(event(SecretEventKind::Deleted));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "deleted");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        // Must not panic or error.
        bus.publish(event(SecretEventKind::Deleted));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(event(SecretEventKind::Expired { version: 3 }));

        assert_eq!(rx1.recv().await.unwrap().event_type(), "expired");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "expired");
    }
}
