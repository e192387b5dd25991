//! Hospital lists for seeding a fresh server.

use std::path::Path;

use anyhow::{Context, Result};
use pulseway_core::Coordinate;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedFacility {
    pub name: String,
    pub location: Coordinate,
}

impl SeedFacility {
    fn new(name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.to_string(),
            location: Coordinate::new(latitude, longitude),
        }
    }
}

/// A handful of hospitals around central Bengaluru.
pub fn default_facilities() -> Vec<SeedFacility> {
    vec![
        SeedFacility::new("General", 12.9, 77.6),
        SeedFacility::new("City Care", 12.9716, 77.5946),
        SeedFacility::new("St. Mary", 12.9352, 77.6245),
        SeedFacility::new("Lakeside Clinic", 12.9592, 77.6974),
    ]
}

/// Read a JSON array of `{"name", "location": {"latitude", "longitude"}}`.
pub fn load_seed_file(path: &Path) -> Result<Vec<SeedFacility>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    parse_seed(&text).with_context(|| format!("parsing seed file {}", path.display()))
}

fn parse_seed(text: &str) -> Result<Vec<SeedFacility>> {
    Ok(serde_json::from_str(text)?)
}
