//! Simulation helpers shared by the CLI binaries.

pub mod facilities;
pub mod paths;

pub use facilities::{default_facilities, load_seed_file, SeedFacility};
pub use paths::{DrivePath, StraightPath};
