//! REST API routes.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use pulseway_core::{distance_km, Coordinate, DispatchError};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::{facilities, vehicles, ws};
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        // Facility directory
        .route(
            "/v1/facilities",
            post(facilities::register_facility).get(facilities::list_facilities),
        )
        .route("/v1/facilities/refresh", post(facilities::refresh_facilities))
        .route("/v1/facilities/suggest", get(facilities::suggest_facilities))
        .route("/v1/facilities/:facility_id", get(facilities::get_facility))
        // Dispatch links
        .route(
            "/v1/facilities/:facility_id/links",
            get(facilities::get_roster).post(facilities::inform_facility),
        )
        .route(
            "/v1/facilities/:facility_id/links/:vehicle_id",
            delete(facilities::remove_link),
        )
        // Vehicles
        .route("/v1/vehicles/register", post(vehicles::register_vehicle))
        .route("/v1/positions", post(vehicles::receive_position))
        .route("/v1/vehicles/:vehicle_id/position", get(vehicles::get_position))
        .route("/v1/vehicles/:vehicle_id/nearby", get(vehicles::nearby_facilities))
        .route("/v1/vehicles/:vehicle_id/links", get(vehicles::vehicle_links))
        .route("/v1/vehicles/:vehicle_id/session", delete(vehicles::end_session))
        .route("/v1/routes", get(get_route))
        // WebSocket streaming
        .route("/v1/ws", get(ws::ws_handler))
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    vehicle_id: String,
    facility_id: String,
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub vehicle_id: String,
    pub facility_id: String,
    pub straight_line_km: f64,
    pub points: Vec<Coordinate>,
}

/// Driving route from a vehicle's last position to a facility.
async fn get_route(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<RouteResponse>, ApiError> {
    let router = state.router().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Routing is not configured (set PULSEWAY_ROUTING_API_KEY)",
        )
    })?;

    let position = state
        .get_position(&query.vehicle_id)
        .ok_or_else(|| DispatchError::not_found("position", &query.vehicle_id))?;
    let facility = state.directory().get_facility(&query.facility_id)?;
    let destination = facility.coordinate.ok_or_else(|| {
        DispatchError::validation(format!(
            "Facility {} has no location",
            facility.facility_id
        ))
    })?;

    let points = router.get_route(position.coordinate, destination).await?;
    Ok(Json(RouteResponse {
        vehicle_id: position.vehicle_id,
        facility_id: facility.facility_id,
        straight_line_km: distance_km(position.coordinate, destination),
        points,
    }))
}
