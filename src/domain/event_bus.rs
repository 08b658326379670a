//! Broadcast channel for directory events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The pool
//! directory publishes a [`DirectoryEvent`] for every mutation; monitoring
//! tasks subscribe to observe pool churn.

use tokio::sync::broadcast;

use super::DirectoryEvent;

/// Broadcast bus for [`DirectoryEvent`]s.
///
/// When the ring buffer is full, the oldest events are dropped for lagging
/// receivers. Publishing never blocks and never fails the mutation that
/// produced the event.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DirectoryEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    ///
    /// A capacity of `0` is raised to `1`, the smallest value the broadcast
    /// channel accepts.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event; `0` when
    /// nobody is listening.
    pub fn publish(&self, event: DirectoryEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::PoolId;
    use chrono::Utc;

    fn make_event(pool_id: PoolId) -> DirectoryEvent {
        DirectoryEvent::PoolCreated {
            pool_id,
            capacity: Some(2),
            pool_count: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(make_event(PoolId::new())), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let id = PoolId::new();
        bus.publish(make_event(id));

        let Ok(event) = rx.recv().await else {
            panic!("expected to receive event");
        };
        assert_eq!(event.pool_id(), id);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = EventBus::new(0);
        let _rx = bus.subscribe();
        assert_eq!(bus.publish(make_event(PoolId::new())), 1);
    }
}
