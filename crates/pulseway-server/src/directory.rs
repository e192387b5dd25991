//! Facility directory: a read-through snapshot of registered facilities.
//!
//! The snapshot only changes on [`FacilityDirectory::register`] and explicit
//! [`FacilityDirectory::refresh`] calls. There is no auto-invalidation.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use pulseway_core::{normalize_facility_id, Coordinate, DispatchError, Facility};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::store::{DocumentStore, RealtimeStore, FACILITIES};

pub struct FacilityDirectory {
    documents: Arc<dyn DocumentStore>,
    realtime: Arc<dyn RealtimeStore>,
    /// Sorted by facility id.
    snapshot: RwLock<Arc<Vec<Facility>>>,
    registration: Mutex<()>,
}

impl FacilityDirectory {
    pub fn new(documents: Arc<dyn DocumentStore>, realtime: Arc<dyn RealtimeStore>) -> Self {
        Self {
            documents,
            realtime,
            snapshot: RwLock::new(Arc::new(Vec::new())),
            registration: Mutex::new(()),
        }
    }

    /// Register a facility from a free-text name.
    ///
    /// The id is the normalized name, so "General" and " general " collide
    /// and the second registration fails with `AlreadyRegistered`.
    pub async fn register(&self, name: &str, coordinate: Coordinate) -> Result<Facility, DispatchError> {
        let facility_id = normalize_facility_id(name)?;
        coordinate.validate()?;

        let _guard = self.registration.lock().await;

        let known = self.snapshot().iter().any(|f| f.facility_id == facility_id);
        if known
            || self
                .documents
                .get_document(FACILITIES, &facility_id)
                .await?
                .is_some()
        {
            return Err(DispatchError::AlreadyRegistered(facility_id));
        }

        let facility = Facility {
            facility_id: facility_id.clone(),
            display_name: name.trim().to_string(),
            coordinate: Some(coordinate),
        };

        self.documents
            .set_document(
                FACILITIES,
                &facility_id,
                json!({
                    "display_name": facility.display_name,
                    "location": coordinate,
                    "registered_at": Utc::now(),
                }),
                false,
            )
            .await?;

        let mirror = json!({
            "latitude": coordinate.latitude,
            "longitude": coordinate.longitude,
            "status": "active",
        });
        if let Err(err) = self
            .realtime
            .write(&format!("{}/{}", FACILITIES, facility_id), mirror)
            .await
        {
            tracing::warn!("Realtime mirror for facility {} failed: {}", facility_id, err);
        }

        self.insert_into_snapshot(facility.clone());
        tracing::info!("Registered facility '{}' ({})", facility.display_name, facility_id);
        Ok(facility)
    }

    /// Replace the snapshot with a full fetch from the document store.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<usize, DispatchError> {
        let documents = self.documents.list_documents(FACILITIES).await?;

        let mut facilities: Vec<Facility> = documents
            .into_iter()
            .filter_map(|(id, doc)| facility_from_document(&id, &doc))
            .collect();
        facilities.sort_by(|a, b| a.facility_id.cmp(&b.facility_id));
        facilities.dedup_by(|a, b| a.facility_id == b.facility_id);

        let count = facilities.len();
        if let Ok(mut snapshot) = self.snapshot.write() {
            *snapshot = Arc::new(facilities);
        }
        tracing::debug!("Facility directory refreshed: {} facilities", count);
        Ok(count)
    }

    pub fn list_facilities(&self) -> Vec<Facility> {
        self.snapshot().as_ref().clone()
    }

    /// Cheap shared view of the current snapshot.
    pub fn snapshot(&self) -> Arc<Vec<Facility>> {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.clone())
            .unwrap_or_default()
    }

    /// Case-insensitive lookup by id.
    pub fn get_facility(&self, id: &str) -> Result<Facility, DispatchError> {
        let facility_id = normalize_facility_id(id)?;
        self.snapshot()
            .iter()
            .find(|facility| facility.facility_id == facility_id)
            .cloned()
            .ok_or_else(|| DispatchError::not_found("facility", facility_id))
    }

    /// Facilities whose id or display name contains `query`, ignoring case.
    pub fn suggest(&self, query: &str) -> Vec<Facility> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.snapshot()
            .iter()
            .filter(|facility| {
                facility.facility_id.contains(&needle)
                    || facility.display_name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    fn insert_into_snapshot(&self, facility: Facility) {
        if let Ok(mut snapshot) = self.snapshot.write() {
            let mut next = snapshot.as_ref().clone();
            match next.binary_search_by(|f| f.facility_id.cmp(&facility.facility_id)) {
                Ok(index) => next[index] = facility,
                Err(index) => next.insert(index, facility),
            }
            *snapshot = Arc::new(next);
        }
    }
}

/// Build a facility from a stored document.
///
/// Ids are re-normalized so documents written with other casings still
/// resolve. A missing or out-of-range location yields `coordinate: None`.
fn facility_from_document(id: &str, doc: &Value) -> Option<Facility> {
    let facility_id = normalize_facility_id(id).ok()?;
    let display_name = doc
        .get("display_name")
        .or_else(|| doc.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| id.trim().to_string());
    let coordinate = doc
        .get("location")
        .and_then(|location| serde_json::from_value::<Coordinate>(location.clone()).ok())
        .filter(Coordinate::is_valid);

    Some(Facility {
        facility_id,
        display_name,
        coordinate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryDocumentStore, MemoryRealtimeStore};

    fn directory() -> (FacilityDirectory, Arc<MemoryDocumentStore>, Arc<MemoryRealtimeStore>) {
        let documents = Arc::new(MemoryDocumentStore::new());
        let realtime = Arc::new(MemoryRealtimeStore::new());
        (
            FacilityDirectory::new(documents.clone(), realtime.clone()),
            documents,
            realtime,
        )
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let (directory, _, _) = directory();
        directory
            .register("General", Coordinate::new(12.9, 77.6))
            .await
            .unwrap();

        let lower = directory.get_facility("general").unwrap();
        let upper = directory.get_facility("GENERAL").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.facility_id, "general");
        assert_eq!(lower.display_name, "General");
    }

    #[tokio::test]
    async fn differently_cased_registration_collides() {
        let (directory, _, _) = directory();
        directory
            .register("General", Coordinate::new(12.9, 77.6))
            .await
            .unwrap();

        let err = directory
            .register("  GENERAL ", Coordinate::new(13.0, 77.0))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::AlreadyRegistered("general".to_string()));
        assert_eq!(directory.list_facilities().len(), 1);
    }

    #[tokio::test]
    async fn registration_validates_input() {
        let (directory, _, _) = directory();
        assert!(matches!(
            directory.register("   ", Coordinate::new(0.0, 0.0)).await,
            Err(DispatchError::Validation(_))
        ));
        assert!(matches!(
            directory.register("City", Coordinate::new(95.0, 0.0)).await,
            Err(DispatchError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn registration_mirrors_into_realtime_store() {
        let (directory, _, realtime) = directory();
        directory
            .register("City Care", Coordinate::new(1.0, 2.0))
            .await
            .unwrap();

        let mirror = realtime.read("facilities/city care").await.unwrap().unwrap();
        assert_eq!(mirror["status"], "active");
        assert_eq!(mirror["latitude"], 1.0);
    }

    #[tokio::test]
    async fn refresh_is_explicit() {
        let (directory, documents, _) = directory();
        documents
            .set_document(
                FACILITIES,
                "St. Mary",
                json!({"name": "St. Mary", "location": {"latitude": 1.0, "longitude": 1.0}}),
                false,
            )
            .await
            .unwrap();
        documents
            .set_document(FACILITIES, "nowhere", json!({"display_name": "Nowhere"}), false)
            .await
            .unwrap();

        assert!(directory.list_facilities().is_empty());
        assert_eq!(directory.refresh().await.unwrap(), 2);

        let st_mary = directory.get_facility("st. mary").unwrap();
        assert_eq!(st_mary.display_name, "St. Mary");
        assert!(st_mary.coordinate.is_some());
        assert!(directory.get_facility("nowhere").unwrap().coordinate.is_none());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let (directory, documents, _) = directory();
        directory
            .register("General", Coordinate::new(12.9, 77.6))
            .await
            .unwrap();

        documents.set_offline(true);
        let err = directory.refresh().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(directory.list_facilities().len(), 1);
    }

    #[tokio::test]
    async fn missing_facility_is_not_found() {
        let (directory, _, _) = directory();
        assert!(directory.get_facility("General").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn suggestions_match_substrings() {
        let (directory, _, _) = directory();
        for name in ["General", "Generic Clinic", "City Care"] {
            directory
                .register(name, Coordinate::new(0.0, 0.0))
                .await
                .unwrap();
        }

        let ids: Vec<String> = directory
            .suggest("GEN")
            .into_iter()
            .map(|f| f.facility_id)
            .collect();
        assert_eq!(ids, vec!["general", "generic clinic"]);
        assert!(directory.suggest("  ").is_empty());
    }
}
