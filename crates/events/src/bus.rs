//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`PlatformEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use latchkey_core::types::{DeviceId, OwnerId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// RegistryEvent
// ---------------------------------------------------------------------------

/// A device record was deleted from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRemoved {
    pub owner_id: OwnerId,
    pub device_id: DeviceId,
}

/// Registry-side changes the relay must react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    DeviceRemoved(DeviceRemoved),
}

impl RegistryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::DeviceRemoved(_) => "device_removed",
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// A [`RegistryEvent`] stamped with the time it was published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    pub event: RegistryEvent,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(event: RegistryEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn device_removed(owner_id: impl Into<OwnerId>, device_id: impl Into<DeviceId>) -> Self {
        Self::new(RegistryEvent::DeviceRemoved(DeviceRemoved {
            owner_id: owner_id.into(),
            device_id: device_id.into(),
        }))
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`PlatformEvent`].
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is dropped.
    pub fn publish(&self, event: PlatformEvent) {
        let name = event.event.name();
        if self.sender.send(event).is_err() {
            tracing::debug!(event = name, "No subscribers for registry event");
        }
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_device_removed() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(PlatformEvent::device_removed("alice", "d1"));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(
            received.event,
            RegistryEvent::DeviceRemoved(DeviceRemoved {
                owner_id: "alice".into(),
                device_id: "d1".into(),
            })
        );
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PlatformEvent::device_removed("alice", "d1"));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.event, e2.event);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(PlatformEvent::device_removed("alice", "orphan"));
    }

    #[test]
    fn device_removed_payload_uses_camel_case() {
        let parsed: DeviceRemoved =
            serde_json::from_str(r#"{"ownerId":"alice","deviceId":"d1"}"#).unwrap();
        assert_eq!(parsed.device_id, "d1");
    }
}
