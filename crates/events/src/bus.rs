//! Event bus abstraction for interview observers.
//!
//! The coordinator publishes JSON payloads on named topics; front ends,
//! loggers and tests subscribe by implementing `EventBus`.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

/// Sink for coordinator events.
pub trait EventBus: Send + Sync {
    /// Emit an event with a JSON payload.
    ///
    /// # Arguments
    /// * `topic` - Event name (see [`crate::event_names`])
    /// * `payload` - JSON payload to emit
    fn emit(&self, topic: &str, payload: serde_json::Value);
}

/// Type alias for shared event bus reference.
pub type EventBusRef = Arc<dyn EventBus>;

/// Serialize `event` and emit it on `topic`.
///
/// Serialization failures are logged and the event is dropped.
pub fn publish<T: Serialize>(bus: &dyn EventBus, topic: &str, event: &T) {
    match serde_json::to_value(event) {
        Ok(payload) => bus.emit(topic, payload),
        Err(e) => tracing::warn!(topic, "Failed to serialize event: {}", e),
    }
}

/// A captured event from [`InMemoryEventBus`].
#[derive(Debug, Clone)]
pub struct EmittedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Event bus that keeps every event for later inspection.
#[derive(Default)]
pub struct InMemoryEventBus {
    events: Mutex<Vec<EmittedEvent>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EmittedEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> Vec<EmittedEvent> {
        self.lock().clone()
    }

    /// Payloads emitted on `topic`, in order.
    pub fn payloads_for(&self, topic: &str) -> Vec<serde_json::Value> {
        self.lock()
            .iter()
            .filter(|e| e.topic == topic)
            .map(|e| e.payload.clone())
            .collect()
    }

    pub fn count(&self, topic: &str) -> usize {
        self.lock().iter().filter(|e| e.topic == topic).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl EventBus for InMemoryEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        self.lock().push(EmittedEvent {
            topic: topic.to_string(),
            payload,
        });
    }
}

/// Event bus that writes every event to the `tracing` log at debug level.
pub struct TracingEventBus;

impl EventBus for TracingEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        tracing::debug!(target: "virtuoso::events", topic, %payload, "event");
    }
}

/// No-op event bus.
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn emit(&self, _topic: &str, _payload: serde_json::Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_memory_event_bus() {
        let bus = InMemoryEventBus::new();

        bus.emit("interview:state_changed", json!({"state": "listening"}));
        bus.emit("interview:partial_transcript", json!({"text": "I used"}));
        bus.emit("interview:state_changed", json!({"state": "processing"}));

        assert_eq!(bus.len(), 3);
        assert_eq!(bus.count("interview:state_changed"), 2);
        assert_eq!(
            bus.payloads_for("interview:state_changed")[1]["state"],
            "processing"
        );
        assert_eq!(bus.count("interview:missing"), 0);

        bus.clear();
        assert!(bus.is_empty());
    }

    #[test]
    fn test_publish_serializes_payload() {
        #[derive(Serialize)]
        struct Ping {
            seq: u32,
        }

        let bus = InMemoryEventBus::new();
        publish(&bus, "test:ping", &Ping { seq: 7 });
        assert_eq!(bus.payloads_for("test:ping"), vec![json!({"seq": 7})]);
    }

    #[test]
    fn test_null_and_tracing_buses_accept_events() {
        NullEventBus.emit("test:event", json!({"data": "ignored"}));
        TracingEventBus.emit("test:event", json!({"data": "logged"}));
    }
}
