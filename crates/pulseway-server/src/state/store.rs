//! Explicitly constructed server context.
//!
//! Owns the store collaborators and the components built on them, plus the
//! live position cache and vehicle session tokens kept in `DashMap`s.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pulseway_core::{
    generate_vehicle_id, normalize_vehicle_id, Coordinate, DispatchError, VehiclePosition,
};
use serde_json::{json, Value};

use crate::config::Config;
use crate::directory::FacilityDirectory;
use crate::publisher::PositionPublisher;
use crate::registry::DispatchRegistry;
use crate::routing::RoutingService;
use crate::store::{
    DocumentStore, MemoryDocumentStore, MemoryRealtimeStore, RealtimeStore, SESSIONS, VEHICLES,
};

const MAX_ID_ATTEMPTS: usize = 16;

pub struct AppState {
    config: Config,
    documents: Arc<dyn DocumentStore>,
    realtime: Arc<dyn RealtimeStore>,
    directory: Arc<FacilityDirectory>,
    registry: Arc<DispatchRegistry>,
    publisher: PositionPublisher,
    positions: DashMap<String, VehiclePosition>,
    /// vehicle id -> session token
    vehicle_tokens: DashMap<String, String>,
    /// session token -> vehicle id
    token_index: DashMap<String, String>,
    router: Option<Arc<dyn RoutingService>>,
}

impl AppState {
    pub fn new(
        config: Config,
        documents: Arc<dyn DocumentStore>,
        realtime: Arc<dyn RealtimeStore>,
    ) -> Self {
        let directory = Arc::new(FacilityDirectory::new(documents.clone(), realtime.clone()));
        let registry =
            Arc::new(DispatchRegistry::new(documents.clone()).with_directory(directory.clone()));
        let publisher = PositionPublisher::new(documents.clone(), realtime.clone());
        Self {
            config,
            documents,
            realtime,
            directory,
            registry,
            publisher,
            positions: DashMap::new(),
            vehicle_tokens: DashMap::new(),
            token_index: DashMap::new(),
            router: None,
        }
    }

    /// State backed by the in-memory stores.
    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryRealtimeStore::new()),
        )
    }

    pub fn with_router(mut self, router: Arc<dyn RoutingService>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    pub fn realtime(&self) -> &Arc<dyn RealtimeStore> {
        &self.realtime
    }

    pub fn directory(&self) -> &Arc<FacilityDirectory> {
        &self.directory
    }

    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    pub fn router(&self) -> Option<&Arc<dyn RoutingService>> {
        self.router.as_ref()
    }

    /// Restore sessions and last positions, then load the facility directory.
    pub async fn load_from_store(&self) -> Result<(), DispatchError> {
        for (vehicle_id, doc) in self.documents.list_documents(SESSIONS).await? {
            if let Some(token) = doc.get("token").and_then(Value::as_str) {
                self.insert_token(&vehicle_id, token);
            }
        }

        for (vehicle_id, doc) in self.documents.list_documents(VEHICLES).await? {
            if let Some(position) = position_from_document(&vehicle_id, &doc) {
                self.positions.insert(vehicle_id, position);
            }
        }

        let facilities = self.directory.refresh().await?;
        tracing::info!(
            "Loaded {} sessions, {} positions, {} facilities",
            self.vehicle_tokens.len(),
            self.positions.len(),
            facilities
        );
        Ok(())
    }

    /// Accept a position sample if it is at least as new as the cached one.
    ///
    /// Accepted samples are published to the stores on a detached task.
    /// Returns false for a stale sample.
    pub fn update_position(&self, position: VehiclePosition) -> Result<bool, DispatchError> {
        let vehicle_id = normalize_vehicle_id(&position.vehicle_id)?;
        position.coordinate.validate()?;
        let position = VehiclePosition {
            vehicle_id: vehicle_id.clone(),
            ..position
        };

        let accepted = match self.positions.entry(vehicle_id) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if position.supersedes(entry.get()) {
                    entry.insert(position.clone());
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(position.clone());
                true
            }
        };

        if accepted {
            self.publisher.publish_detached(position);
        } else {
            tracing::debug!("Dropped stale position for {}", position.vehicle_id);
        }
        Ok(accepted)
    }

    pub fn get_position(&self, vehicle_id: &str) -> Option<VehiclePosition> {
        let vehicle_id = normalize_vehicle_id(vehicle_id).ok()?;
        self.positions.get(&vehicle_id).map(|entry| entry.value().clone())
    }

    /// Last cached coordinate, used when an inform carries no location.
    pub fn last_coordinate(&self, vehicle_id: &str) -> Option<Coordinate> {
        self.get_position(vehicle_id).map(|position| position.coordinate)
    }

    /// Issue a fresh vehicle id and session token and persist both.
    pub async fn register_vehicle(&self) -> Result<(String, String), DispatchError> {
        let vehicle_id = self.unused_vehicle_id().await?;
        let token = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        self.documents
            .set_document(
                SESSIONS,
                &vehicle_id,
                json!({ "token": token, "issued_at": now }),
                false,
            )
            .await?;
        self.documents
            .set_document(
                VEHICLES,
                &vehicle_id,
                json!({ "status": "active", "registered_at": now }),
                true,
            )
            .await?;

        self.insert_token(&vehicle_id, &token);
        tracing::info!("Registered vehicle {}", vehicle_id);
        Ok((vehicle_id, token))
    }

    async fn unused_vehicle_id(&self) -> Result<String, DispatchError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = generate_vehicle_id(&mut rand::rng());
            if self.vehicle_tokens.contains_key(&candidate) {
                continue;
            }
            if self
                .documents
                .get_document(VEHICLES, &candidate)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
        }
        Err(DispatchError::transient("Could not allocate a free vehicle id"))
    }

    fn insert_token(&self, vehicle_id: &str, token: &str) {
        if let Some(previous) = self
            .vehicle_tokens
            .insert(vehicle_id.to_string(), token.to_string())
        {
            self.token_index.remove(&previous);
        }
        self.token_index
            .insert(token.to_string(), vehicle_id.to_string());
    }

    pub fn validate_vehicle_token(&self, vehicle_id: &str, token: &str) -> bool {
        let Ok(vehicle_id) = normalize_vehicle_id(vehicle_id) else {
            return false;
        };
        self.vehicle_tokens
            .get(&vehicle_id)
            .map(|expected| expected.value() == token)
            .unwrap_or(false)
    }

    pub fn vehicle_for_token(&self, token: &str) -> Option<String> {
        self.token_index.get(token).map(|entry| entry.value().clone())
    }

    /// Drop the vehicle's links, session token and cached position.
    /// Returns how many rosters changed.
    pub async fn end_session(&self, vehicle_id: &str) -> Result<usize, DispatchError> {
        let vehicle_id = normalize_vehicle_id(vehicle_id)?;
        let removed = self.registry.end_session(&vehicle_id).await?;

        self.documents.delete_document(SESSIONS, &vehicle_id).await?;
        if let Some((_, token)) = self.vehicle_tokens.remove(&vehicle_id) {
            self.token_index.remove(&token);
        }
        self.positions.remove(&vehicle_id);
        if let Err(err) = self
            .documents
            .update_document(VEHICLES, &vehicle_id, json!({ "status": "inactive" }))
            .await
        {
            if !err.is_not_found() {
                return Err(err);
            }
        }

        tracing::info!(
            "Ended session for {} ({} links dropped)",
            vehicle_id,
            removed
        );
        Ok(removed)
    }
}

/// Rebuild a cached position from the merged fields in a vehicle document.
fn position_from_document(vehicle_id: &str, doc: &Value) -> Option<VehiclePosition> {
    let coordinate = Coordinate::new(
        doc.get("latitude")?.as_f64()?,
        doc.get("longitude")?.as_f64()?,
    );
    if !coordinate.is_valid() {
        return None;
    }
    let captured_at: DateTime<Utc> = serde_json::from_value(doc.get("captured_at")?.clone()).ok()?;
    Some(VehiclePosition::new(vehicle_id, coordinate).at(captured_at))
}
