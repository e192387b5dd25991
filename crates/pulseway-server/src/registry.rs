//! Dispatch link registry.
//!
//! One roster document per facility holds every live link to it. Each
//! roster mutation is a get-modify-put guarded by a per-facility async
//! mutex from [`KeyedLocks`], so two writers for the same facility never interleave while
//! different facilities proceed in parallel.

use std::sync::Arc;

use chrono::Utc;
use pulseway_core::{
    distance_km, normalize_facility_id, normalize_vehicle_id, Coordinate, DispatchError,
    DispatchLink, Roster,
};

use crate::directory::FacilityDirectory;
use crate::keyed_lock::KeyedLocks;
use crate::store::{DocumentStore, ROSTERS};

pub struct DispatchRegistry {
    documents: Arc<dyn DocumentStore>,
    directory: Option<Arc<FacilityDirectory>>,
    locks: KeyedLocks,
}

impl DispatchRegistry {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            documents,
            directory: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Attach a directory so new rosters carry the facility's name and location.
    pub fn with_directory(mut self, directory: Arc<FacilityDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    async fn load(&self, facility_id: &str) -> Result<Option<Roster>, DispatchError> {
        match self.documents.get_document(ROSTERS, facility_id).await? {
            Some(doc) => {
                let mut roster: Roster = serde_json::from_value(doc)?;
                roster.facility_id = facility_id.to_string();
                Ok(Some(roster))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, roster: &Roster) -> Result<(), DispatchError> {
        let body = serde_json::to_value(roster)?;
        self.documents
            .set_document(ROSTERS, &roster.facility_id, body, false)
            .await
    }

    /// Record that a vehicle is responding to a facility.
    ///
    /// Upserts: a repeated inform from the same vehicle replaces its
    /// existing entry's location and timestamp.
    pub async fn inform(
        &self,
        facility_id: &str,
        vehicle_id: &str,
        vehicle_location: Coordinate,
    ) -> Result<DispatchLink, DispatchError> {
        let facility_id = normalize_facility_id(facility_id)?;
        let vehicle_id = normalize_vehicle_id(vehicle_id)?;
        vehicle_location.validate()?;

        let link = DispatchLink {
            facility_id: facility_id.clone(),
            vehicle_id,
            vehicle_location,
            linked_at: Utc::now(),
        };

        let _guard = self.locks.lock(&facility_id).await;

        let mut roster = match self.load(&facility_id).await? {
            Some(roster) => roster,
            None => self.new_roster(&facility_id),
        };
        roster.upsert(link.clone());
        self.save(&roster).await?;

        tracing::info!(
            "Vehicle {} informed facility {} ({} linked)",
            link.vehicle_id,
            facility_id,
            roster.links.len()
        );
        Ok(link)
    }

    fn new_roster(&self, facility_id: &str) -> Roster {
        let mut roster = Roster::new(facility_id);
        if let Some(facility) = self
            .directory
            .as_ref()
            .and_then(|directory| directory.get_facility(facility_id).ok())
        {
            roster.display_name = Some(facility.display_name);
            roster.location = facility.coordinate;
        }
        roster
    }

    /// Current roster for a facility; empty when it has no roster document.
    pub async fn list_links(&self, facility_id: &str) -> Result<Vec<DispatchLink>, DispatchError> {
        let facility_id = normalize_facility_id(facility_id)?;
        Ok(self
            .load(&facility_id)
            .await?
            .map(|roster| roster.links)
            .unwrap_or_default())
    }

    /// Roster document including stored facility metadata, if any.
    pub async fn roster(&self, facility_id: &str) -> Result<Option<Roster>, DispatchError> {
        let facility_id = normalize_facility_id(facility_id)?;
        self.load(&facility_id).await
    }

    /// Drop a vehicle from a facility's roster.
    ///
    /// `NotFound` leaves the stored state untouched.
    pub async fn remove(&self, facility_id: &str, vehicle_id: &str) -> Result<(), DispatchError> {
        let facility_id = normalize_facility_id(facility_id)?;
        let vehicle_id = normalize_vehicle_id(vehicle_id)?;

        let _guard = self.locks.lock(&facility_id).await;

        let mut roster = self
            .load(&facility_id)
            .await?
            .ok_or_else(|| DispatchError::not_found("link", &vehicle_id))?;
        if !roster.remove(&vehicle_id) {
            return Err(DispatchError::not_found("link", vehicle_id));
        }
        self.save(&roster).await?;

        tracing::info!("Removed vehicle {} from facility {}", vehicle_id, facility_id);
        Ok(())
    }

    /// Live distance between a facility and the vehicle's last-informed
    /// position. `None` when the facility location is unknown.
    pub fn distance_for(facility_coordinate: Option<Coordinate>, link: &DispatchLink) -> Option<f64> {
        let facility = facility_coordinate.filter(Coordinate::is_valid)?;
        if !link.vehicle_location.is_valid() {
            return None;
        }
        Some(distance_km(facility, link.vehicle_location))
    }

    /// Every link a vehicle holds, read across all rosters.
    pub async fn links_for_vehicle(&self, vehicle_id: &str) -> Result<Vec<DispatchLink>, DispatchError> {
        let vehicle_id = normalize_vehicle_id(vehicle_id)?;
        let mut links = Vec::new();
        for (id, doc) in self.documents.list_documents(ROSTERS).await? {
            let roster: Roster = match serde_json::from_value(doc) {
                Ok(roster) => roster,
                Err(err) => {
                    tracing::warn!("Skipping unreadable roster {}: {}", id, err);
                    continue;
                }
            };
            links.extend(
                roster
                    .links
                    .into_iter()
                    .filter(|link| link.vehicle_id == vehicle_id),
            );
        }
        links.sort_by(|a, b| a.facility_id.cmp(&b.facility_id));
        Ok(links)
    }

    /// Remove the vehicle from every roster. Returns how many rosters changed.
    pub async fn end_session(&self, vehicle_id: &str) -> Result<usize, DispatchError> {
        let links = self.links_for_vehicle(vehicle_id).await?;
        let mut removed = 0;
        for link in links {
            match self.remove(&link.facility_id, &link.vehicle_id).await {
                Ok(()) => removed += 1,
                // Already gone through a concurrent remove.
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(removed)
    }
}
