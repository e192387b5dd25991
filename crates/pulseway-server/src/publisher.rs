//! Position publishing into the backing stores.
//!
//! Writes for one vehicle are serialized and compared against the stored
//! `captured_at`, so a late write of an older sample never replaces a newer
//! one no matter which detached task finishes last.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulseway_core::{DispatchError, VehiclePosition};
use serde_json::json;

use crate::keyed_lock::KeyedLocks;
use crate::store::{DocumentStore, RealtimeStore, VEHICLES};

/// Writes a full position replace to the realtime path `vehicles/<id>` and
/// merges the latest coordinate into the vehicle's document.
#[derive(Clone)]
pub struct PositionPublisher {
    documents: Arc<dyn DocumentStore>,
    realtime: Arc<dyn RealtimeStore>,
    vehicle_locks: Arc<KeyedLocks>,
}

impl PositionPublisher {
    pub fn new(documents: Arc<dyn DocumentStore>, realtime: Arc<dyn RealtimeStore>) -> Self {
        Self {
            documents,
            realtime,
            vehicle_locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Returns false when the stores already hold a newer sample.
    pub async fn publish(&self, position: &VehiclePosition) -> Result<bool, DispatchError> {
        let _guard = self.vehicle_locks.lock(&position.vehicle_id).await;

        if let Some(stored) = self.stored_captured_at(&position.vehicle_id).await? {
            if stored > position.captured_at {
                tracing::debug!(
                    "Skipping publish of older sample for {} ({} < {})",
                    position.vehicle_id,
                    position.captured_at,
                    stored
                );
                return Ok(false);
            }
        }

        self.realtime
            .write(
                &format!("{}/{}", VEHICLES, position.vehicle_id),
                serde_json::to_value(position)?,
            )
            .await?;

        self.documents
            .set_document(
                VEHICLES,
                &position.vehicle_id,
                json!({
                    "latitude": position.coordinate.latitude,
                    "longitude": position.coordinate.longitude,
                    "captured_at": position.captured_at,
                }),
                true,
            )
            .await?;
        Ok(true)
    }

    async fn stored_captured_at(&self, vehicle_id: &str) -> Result<Option<DateTime<Utc>>, DispatchError> {
        Ok(self
            .documents
            .get_document(VEHICLES, vehicle_id)
            .await?
            .and_then(|doc| doc.get("captured_at").cloned())
            .and_then(|value| serde_json::from_value(value).ok()))
    }

    /// Publish on a detached task. Failures are logged and dropped; the next
    /// sample supersedes them.
    pub fn publish_detached(&self, position: VehiclePosition) {
        let publisher = self.clone();
        tokio::spawn(async move {
            if let Err(err) = publisher.publish(&position).await {
                tracing::warn!(
                    "Position publish for {} failed: {}",
                    position.vehicle_id,
                    err
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryDocumentStore, MemoryRealtimeStore};
    use pulseway_core::Coordinate;
    use std::time::Duration;

    #[tokio::test]
    async fn publish_writes_both_stores() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let realtime = Arc::new(MemoryRealtimeStore::new());
        let publisher = PositionPublisher::new(documents.clone(), realtime.clone());

        documents
            .set_document(VEHICLES, "AMB1", json!({"status": "active"}), false)
            .await
            .unwrap();

        let position = VehiclePosition::new("AMB1", Coordinate::new(12.95, 77.65));
        assert!(publisher.publish(&position).await.unwrap());

        let live = realtime.read("vehicles/AMB1").await.unwrap().unwrap();
        assert_eq!(live["coordinate"]["latitude"], 12.95);

        let doc = documents.get_document(VEHICLES, "AMB1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "active");
        assert_eq!(doc["longitude"], 77.65);
    }

    #[tokio::test]
    async fn document_failure_is_reported() {
        let documents = Arc::new(MemoryDocumentStore::new());
        documents.set_offline(true);
        let publisher = PositionPublisher::new(documents, Arc::new(MemoryRealtimeStore::new()));

        let position = VehiclePosition::new("AMB1", Coordinate::new(0.0, 0.0));
        assert!(publisher.publish(&position).await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn older_sample_never_overwrites_newer() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let realtime = Arc::new(MemoryRealtimeStore::new());
        let publisher = PositionPublisher::new(documents.clone(), realtime.clone());
        let now = Utc::now();

        let newer = VehiclePosition::new("AMB1", Coordinate::new(2.0, 2.0)).at(now);
        let older = VehiclePosition::new("AMB1", Coordinate::new(1.0, 1.0))
            .at(now - chrono::Duration::seconds(3));

        assert!(publisher.publish(&newer).await.unwrap());
        assert!(!publisher.publish(&older).await.unwrap());

        let doc = documents.get_document(VEHICLES, "AMB1").await.unwrap().unwrap();
        assert_eq!(doc["latitude"], 2.0);
        let live = realtime.read("vehicles/AMB1").await.unwrap().unwrap();
        assert_eq!(live["coordinate"]["latitude"], 2.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn burst_of_detached_publishes_ends_on_newest() {
        let documents = Arc::new(MemoryDocumentStore::new().with_latency(Duration::from_millis(1)));
        let realtime = Arc::new(MemoryRealtimeStore::new());
        let publisher = PositionPublisher::new(documents.clone(), realtime.clone());
        let start = Utc::now();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let position = VehiclePosition::new("AMB1", Coordinate::new(i as f64, 0.0))
                .at(start + chrono::Duration::milliseconds(i));
            let publisher = publisher.clone();
            tasks.push(tokio::spawn(async move { publisher.publish(&position).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let doc = documents.get_document(VEHICLES, "AMB1").await.unwrap().unwrap();
        assert_eq!(doc["latitude"], 19.0);
        let live = realtime.read("vehicles/AMB1").await.unwrap().unwrap();
        assert_eq!(live["coordinate"]["latitude"], 19.0);
        assert!(publisher.vehicle_locks.is_empty());
    }
}
