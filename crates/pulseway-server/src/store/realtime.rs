//! In-memory realtime store with broadcast fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use pulseway_core::DispatchError;
use serde_json::Value;
use tokio::sync::broadcast;

use super::RealtimeStore;

const EVENT_BUFFER: usize = 1024;

/// A single realtime write, pre-serialized for WebSocket subscribers.
#[derive(Debug, Clone)]
pub struct RealtimeEvent {
    pub path: String,
    pub payload: Arc<str>,
}

impl RealtimeEvent {
    /// Key after the first path segment, e.g. the vehicle id in `vehicles/AMB1`.
    pub fn key(&self) -> Option<&str> {
        self.path.split_once('/').map(|(_, key)| key)
    }

    pub fn collection(&self) -> &str {
        self.path.split('/').next().unwrap_or_default()
    }
}

pub struct MemoryRealtimeStore {
    values: DashMap<String, Value>,
    tx: broadcast::Sender<RealtimeEvent>,
}

impl MemoryRealtimeStore {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            values: DashMap::new(),
            tx,
        }
    }
}

impl Default for MemoryRealtimeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeStore for MemoryRealtimeStore {
    async fn write(&self, path: &str, value: Value) -> Result<(), DispatchError> {
        let payload = serde_json::json!({ "path": path, "value": value }).to_string();
        self.values.insert(path.to_string(), value);
        // No subscribers is fine; the value is still readable.
        let _ = self.tx.send(RealtimeEvent {
            path: path.to_string(),
            payload: Arc::from(payload),
        });
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, DispatchError> {
        Ok(self.values.get(path).map(|entry| entry.value().clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn writes_are_readable_and_broadcast() {
        let store = MemoryRealtimeStore::new();
        let mut rx = store.subscribe();

        store
            .write("vehicles/AMB100123", json!({"latitude": 12.95}))
            .await
            .unwrap();

        assert_eq!(
            store.read("vehicles/AMB100123").await.unwrap(),
            Some(json!({"latitude": 12.95}))
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.collection(), "vehicles");
        assert_eq!(event.key(), Some("AMB100123"));
        let payload: Value = serde_json::from_str(&event.payload).unwrap();
        assert_eq!(payload["value"]["latitude"], 12.95);
    }
}
