//! Identifier normalization.
//!
//! Facility ids are derived from free-text names, so every boundary that
//! produces or consumes one goes through [`normalize_facility_id`].
//! Differently-cased names always resolve to the same facility.

use rand::Rng;

use crate::error::DispatchError;

/// Trim and lowercase a facility name into its id.
pub fn normalize_facility_id(raw: &str) -> Result<String, DispatchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::validation("Facility id must not be empty"));
    }
    Ok(trimmed.to_lowercase())
}

/// Trim and uppercase a vehicle id.
pub fn normalize_vehicle_id(raw: &str) -> Result<String, DispatchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::validation("Vehicle id must not be empty"));
    }
    Ok(trimmed.to_uppercase())
}

/// Issue a fresh ambulance id of the form `AMB` + six digits.
pub fn generate_vehicle_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("AMB{}", rng.random_range(100_000..=999_999))
}
