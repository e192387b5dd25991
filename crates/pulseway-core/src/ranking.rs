//! Proximity ranking of facilities around a vehicle position.

use std::cmp::Ordering;

use crate::geo::distance_km;
use crate::models::{Facility, RankedFacility, VehiclePosition};

/// Ascending by distance, ties broken by facility id.
pub fn compare_ranked(a: &RankedFacility, b: &RankedFacility) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| a.facility.facility_id.cmp(&b.facility.facility_id))
}

/// Rank every facility that has a coordinate by distance from `position`.
///
/// Pure; callers recompute on every position update or directory refresh.
pub fn rank(position: &VehiclePosition, facilities: &[Facility]) -> Vec<RankedFacility> {
    let mut ranked: Vec<RankedFacility> = facilities
        .iter()
        .filter_map(|facility| {
            let coordinate = facility.coordinate?;
            Some(RankedFacility {
                facility: facility.clone(),
                distance_km: distance_km(position.coordinate, coordinate),
            })
        })
        .collect();

    ranked.sort_by(compare_ranked);
    ranked
}

/// [`rank`] truncated to facilities within `max_km`.
pub fn rank_within(
    position: &VehiclePosition,
    facilities: &[Facility],
    max_km: f64,
) -> Vec<RankedFacility> {
    let mut ranked = rank(position, facilities);
    ranked.retain(|entry| entry.distance_km <= max_km);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinate;

    fn facility(id: &str, coordinate: Option<(f64, f64)>) -> Facility {
        Facility {
            facility_id: id.to_string(),
            display_name: id.to_uppercase(),
            coordinate: coordinate.map(|(lat, lon)| Coordinate::new(lat, lon)),
        }
    }

    fn ids(ranked: &[RankedFacility]) -> Vec<&str> {
        ranked
            .iter()
            .map(|entry| entry.facility.facility_id.as_str())
            .collect()
    }

    #[test]
    fn ties_are_broken_by_id() {
        let facilities = vec![
            facility("c", Some((0.0, 1.0))),
            facility("b", Some((0.0, 2.0))),
            facility("a", Some((0.0, 0.0))),
        ];
        let position = VehiclePosition::new("AMB1", Coordinate::new(0.0, 0.5));

        let ranked = rank(&position, &facilities);

        // a and c are both half a degree away.
        assert_eq!(ranked[0].distance_km, ranked[1].distance_km);
        assert_eq!(ids(&ranked), vec!["a", "c", "b"]);
    }

    #[test]
    fn ranking_is_deterministic_across_input_orders() {
        let mut facilities = vec![
            facility("north", Some((1.0, 0.0))),
            facility("east", Some((0.0, 1.0))),
            facility("far", Some((5.0, 5.0))),
            facility("here", Some((0.0, 0.0))),
        ];
        let position = VehiclePosition::new("AMB1", Coordinate::new(0.0, 0.0));

        let first = rank(&position, &facilities);
        facilities.reverse();
        let second = rank(&position, &facilities);

        assert_eq!(ids(&first), ids(&second));
        assert_eq!(ids(&first), vec!["here", "east", "north", "far"]);
    }

    #[test]
    fn facilities_without_coordinates_are_skipped() {
        let facilities = vec![facility("ghost", None), facility("real", Some((0.0, 0.1)))];
        let position = VehiclePosition::new("AMB1", Coordinate::new(0.0, 0.0));

        let ranked = rank(&position, &facilities);
        assert_eq!(ids(&ranked), vec!["real"]);
    }

    #[test]
    fn rank_within_applies_radius() {
        let facilities = vec![
            facility("near", Some((0.0, 0.05))),
            facility("far", Some((0.0, 2.0))),
        ];
        let position = VehiclePosition::new("AMB1", Coordinate::new(0.0, 0.0));

        let ranked = rank_within(&position, &facilities, 50.0);
        assert_eq!(ids(&ranked), vec!["near"]);
    }

    #[test]
    fn empty_directory_ranks_to_empty() {
        let position = VehiclePosition::new("AMB1", Coordinate::new(0.0, 0.0));
        assert!(rank(&position, &[]).is_empty());
    }
}
