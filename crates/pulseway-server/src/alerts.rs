//! Operator-facing views over the ranker and the link registry.
//!
//! Holds no state of its own. Mutations only happen through a
//! [`PendingAction`] the operator has explicitly confirmed.

use pulseway_core::{
    format_distance_km, rank, rank_within, Coordinate, DispatchError, DispatchLink, Facility,
    VehiclePosition,
};
use serde::Serialize;

use crate::registry::DispatchRegistry;

pub const NO_NEARBY_MESSAGE: &str = "No hospitals found nearby.";
pub const NO_ROSTER_MESSAGE: &str = "No ambulances found for this hospital.";
pub const UNKNOWN_DISTANCE: &str = "Unknown";

#[derive(Debug, Clone, Serialize)]
pub struct NearbyEntry {
    pub facility_id: String,
    pub display_name: String,
    pub distance_km: f64,
    pub label: String,
}

/// Nearest-first list shown to a vehicle operator.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyView {
    pub vehicle_id: String,
    pub position: VehiclePosition,
    pub entries: Vec<NearbyEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub vehicle_id: String,
    pub vehicle_location: Coordinate,
    pub linked_at: chrono::DateTime<chrono::Utc>,
    pub distance_km: Option<f64>,
    pub label: String,
}

/// A facility's inbound roster with live distances.
#[derive(Debug, Clone, Serialize)]
pub struct RosterView {
    pub facility_id: String,
    pub display_name: String,
    pub location: Option<Coordinate>,
    pub entries: Vec<RosterEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn nearby_view(
    position: &VehiclePosition,
    facilities: &[Facility],
    radius_km: Option<f64>,
) -> NearbyView {
    let ranked = match radius_km {
        Some(max_km) => rank_within(position, facilities, max_km),
        None => rank(position, facilities),
    };

    let entries: Vec<NearbyEntry> = ranked
        .into_iter()
        .map(|entry| NearbyEntry {
            label: format!("{} km away", format_distance_km(entry.distance_km)),
            facility_id: entry.facility.facility_id,
            display_name: entry.facility.display_name,
            distance_km: entry.distance_km,
        })
        .collect();

    NearbyView {
        vehicle_id: position.vehicle_id.clone(),
        position: position.clone(),
        message: entries.is_empty().then(|| NO_NEARBY_MESSAGE.to_string()),
        entries,
    }
}

pub fn roster_view(facility: &Facility, links: &[DispatchLink]) -> RosterView {
    let entries: Vec<RosterEntry> = links
        .iter()
        .map(|link| {
            let distance_km = DispatchRegistry::distance_for(facility.coordinate, link);
            RosterEntry {
                vehicle_id: link.vehicle_id.clone(),
                vehicle_location: link.vehicle_location,
                linked_at: link.linked_at,
                label: distance_km
                    .map(|d| format!("{} KM", format_distance_km(d)))
                    .unwrap_or_else(|| UNKNOWN_DISTANCE.to_string()),
                distance_km,
            }
        })
        .collect();

    RosterView {
        facility_id: facility.facility_id.clone(),
        display_name: facility.display_name.clone(),
        location: facility.coordinate,
        message: entries.is_empty().then(|| NO_ROSTER_MESSAGE.to_string()),
        entries,
    }
}

/// An inform awaiting operator confirmation. Dropping it cancels it.
#[derive(Debug, Clone)]
pub struct PendingInform {
    pub facility: Facility,
    pub vehicle_id: String,
    pub vehicle_location: Coordinate,
}

impl PendingInform {
    pub fn prompt(&self) -> String {
        format!(
            "Are you sure you want to inform {}?",
            self.facility.display_name
        )
    }

    pub async fn confirm(self, registry: &DispatchRegistry) -> Result<DispatchLink, DispatchError> {
        registry
            .inform(&self.facility.facility_id, &self.vehicle_id, self.vehicle_location)
            .await
    }
}

/// A roster removal awaiting operator confirmation.
#[derive(Debug, Clone)]
pub struct PendingRemove {
    pub facility: Facility,
    pub vehicle_id: String,
}

impl PendingRemove {
    pub fn prompt(&self) -> String {
        format!(
            "Remove ambulance {} from {}?",
            self.vehicle_id, self.facility.display_name
        )
    }

    pub async fn confirm(self, registry: &DispatchRegistry) -> Result<(), DispatchError> {
        registry
            .remove(&self.facility.facility_id, &self.vehicle_id)
            .await
    }
}

/// Either pending action, for callers that queue them together.
#[derive(Debug, Clone)]
pub enum PendingAction {
    Inform(PendingInform),
    Remove(PendingRemove),
}

/// What a confirmed action did.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Informed(DispatchLink),
    Removed { facility_id: String, vehicle_id: String },
}

impl PendingAction {
    pub fn prompt(&self) -> String {
        match self {
            Self::Inform(inform) => inform.prompt(),
            Self::Remove(remove) => remove.prompt(),
        }
    }

    pub async fn confirm(self, registry: &DispatchRegistry) -> Result<ActionOutcome, DispatchError> {
        match self {
            Self::Inform(inform) => inform.confirm(registry).await.map(ActionOutcome::Informed),
            Self::Remove(remove) => {
                let facility_id = remove.facility.facility_id.clone();
                let vehicle_id = remove.vehicle_id.clone();
                remove.confirm(registry).await?;
                Ok(ActionOutcome::Removed {
                    facility_id,
                    vehicle_id,
                })
            }
        }
    }
}
