//! Core data models for PulseWay dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Reject non-finite or out-of-range values.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(DispatchError::validation(
                "Coordinate components must be finite numbers",
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DispatchError::validation(format!(
                "Latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DispatchError::validation(format!(
                "Longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Latest sampled position of a vehicle.
///
/// Every new sample replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub vehicle_id: String,
    pub coordinate: Coordinate,
    pub captured_at: DateTime<Utc>,
}

impl VehiclePosition {
    pub fn new(vehicle_id: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            coordinate,
            captured_at: Utc::now(),
        }
    }

    pub fn at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Last-write-wins by capture time. Equal timestamps win so a repeated
    /// publish of the same sample is a no-op rather than a rejection.
    pub fn supersedes(&self, other: &VehiclePosition) -> bool {
        self.captured_at >= other.captured_at
    }
}

/// A registered destination with a fixed location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    /// Normalized (trimmed, lowercased) identifier.
    pub facility_id: String,
    pub display_name: String,
    /// Absent when the stored document carries no usable location.
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
}

/// "Vehicle X has informed facility Y it is responding."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchLink {
    pub facility_id: String,
    pub vehicle_id: String,
    pub vehicle_location: Coordinate,
    pub linked_at: DateTime<Utc>,
}

/// Derived ranking entry; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedFacility {
    pub facility: Facility,
    pub distance_km: f64,
}

/// Per-facility roster document: the single source of truth for links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub facility_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub location: Option<Coordinate>,
    #[serde(default)]
    pub links: Vec<DispatchLink>,
}

impl Roster {
    pub fn new(facility_id: impl Into<String>) -> Self {
        Self {
            facility_id: facility_id.into(),
            ..Default::default()
        }
    }

    /// Replace the vehicle's existing entry in place, or append it.
    pub fn upsert(&mut self, link: DispatchLink) {
        match self
            .links
            .iter_mut()
            .find(|existing| existing.vehicle_id == link.vehicle_id)
        {
            Some(existing) => *existing = link,
            None => self.links.push(link),
        }
    }

    /// Drop every entry for the vehicle. Returns false if none existed.
    pub fn remove(&mut self, vehicle_id: &str) -> bool {
        let before = self.links.len();
        self.links.retain(|link| link.vehicle_id != vehicle_id);
        self.links.len() != before
    }

    pub fn contains(&self, vehicle_id: &str) -> bool {
        self.links.iter().any(|link| link.vehicle_id == vehicle_id)
    }
}

// ========== API REQUESTS ==========

/// Request to register a facility from free-text input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFacilityRequest {
    pub name: String,
    pub location: Coordinate,
}

/// Request to inform a facility. Without a location the vehicle's last
/// published position is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InformRequest {
    pub vehicle_id: String,
    #[serde(default)]
    pub location: Option<Coordinate>,
}

/// A position sample sent by a vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub vehicle_id: String,
    pub coordinate: Coordinate,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl PositionReport {
    pub fn into_position(self, now: DateTime<Utc>) -> VehiclePosition {
        VehiclePosition {
            vehicle_id: self.vehicle_id,
            coordinate: self.coordinate,
            captured_at: self.captured_at.unwrap_or(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn link(vehicle_id: &str, lat: f64) -> DispatchLink {
        DispatchLink {
            facility_id: "general".to_string(),
            vehicle_id: vehicle_id.to_string(),
            vehicle_location: Coordinate::new(lat, 77.6),
            linked_at: Utc::now(),
        }
    }

    #[test]
    fn coordinate_validation_rejects_out_of_range() {
        assert!(Coordinate::new(12.9, 77.6).is_valid());
        assert!(Coordinate::new(90.0, -180.0).is_valid());
        assert!(Coordinate::new(90.5, 0.0).validate().is_err());
        assert!(Coordinate::new(0.0, 181.0).validate().is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn newer_sample_supersedes_older() {
        let now = Utc::now();
        let old = VehiclePosition::new("AMB1", Coordinate::new(0.0, 0.0)).at(now);
        let new = VehiclePosition::new("AMB1", Coordinate::new(0.0, 0.1))
            .at(now + Duration::seconds(5));
        assert!(new.supersedes(&old));
        assert!(!old.supersedes(&new));
        assert!(old.supersedes(&old.clone()));
    }

    #[test]
    fn roster_upsert_replaces_in_place() {
        let mut roster = Roster::new("general");
        roster.upsert(link("AMB1", 12.0));
        roster.upsert(link("AMB2", 13.0));
        roster.upsert(link("AMB1", 14.0));

        assert_eq!(roster.links.len(), 2);
        assert_eq!(roster.links[0].vehicle_id, "AMB1");
        assert_eq!(roster.links[0].vehicle_location.latitude, 14.0);
        assert_eq!(roster.links[1].vehicle_id, "AMB2");
    }

    #[test]
    fn roster_remove_reports_absence() {
        let mut roster = Roster::new("general");
        assert!(!roster.remove("AMB1"));
        roster.upsert(link("AMB1", 12.0));
        assert!(roster.remove("AMB1"));
        assert!(roster.links.is_empty());
    }

    #[test]
    fn roster_document_tolerates_missing_fields() {
        let roster: Roster = serde_json::from_value(serde_json::json!({
            "facility_id": "general"
        }))
        .unwrap();
        assert!(roster.links.is_empty());
        assert!(roster.location.is_none());
    }
}
