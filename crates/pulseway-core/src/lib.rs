pub mod error;
pub mod geo;
pub mod ids;
pub mod models;
pub mod ranking;

pub use error::DispatchError;
pub use geo::{distance_km, distance_m, format_distance_km, interpolate, EARTH_RADIUS_KM};
pub use ids::{generate_vehicle_id, normalize_facility_id, normalize_vehicle_id};
pub use models::{
    Coordinate, DispatchLink, Facility, InformRequest, PositionReport, RankedFacility,
    RegisterFacilityRequest, Roster, VehiclePosition,
};
pub use ranking::{compare_ranked, rank, rank_within};
