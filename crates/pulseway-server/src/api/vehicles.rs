//! Vehicle registration, position ingest and vehicle-side views.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use pulseway_core::{
    normalize_vehicle_id, DispatchError, DispatchLink, PositionReport, VehiclePosition,
};
use serde::{Deserialize, Serialize};

use crate::alerts::{nearby_view, NearbyView};
use crate::api::auth;
use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RegisterVehicleResponse {
    pub vehicle_id: String,
    pub session_token: String,
    pub report_interval_ms: u64,
    pub report_distance_m: f64,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    radius_km: Option<f64>,
}

pub async fn register_vehicle(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<RegisterVehicleResponse>), ApiError> {
    let (vehicle_id, session_token) = state.register_vehicle().await?;
    let config = state.config();
    Ok((
        StatusCode::CREATED,
        Json(RegisterVehicleResponse {
            vehicle_id,
            session_token,
            report_interval_ms: config.report_interval.as_millis() as u64,
            report_distance_m: config.report_distance_m,
        }),
    ))
}

pub async fn receive_position(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(report): Json<PositionReport>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    auth::authorize_vehicle_for(&state, &report.vehicle_id, &headers)?;
    let accepted = state.update_position(report.into_position(Utc::now()))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": accepted })),
    ))
}

pub async fn get_position(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<VehiclePosition>, ApiError> {
    state
        .get_position(&vehicle_id)
        .map(Json)
        .ok_or_else(|| DispatchError::not_found("position", vehicle_id).into())
}

pub async fn nearby_facilities(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<String>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbyView>, ApiError> {
    if let Some(radius) = query.radius_km {
        if !radius.is_finite() || radius < 0.0 {
            return Err(DispatchError::validation("radius_km must be a non-negative number").into());
        }
    }
    let position = state
        .get_position(&vehicle_id)
        .ok_or_else(|| DispatchError::not_found("position", &vehicle_id))?;
    let facilities = state.directory().snapshot();
    Ok(Json(nearby_view(&position, &facilities, query.radius_km)))
}

pub async fn vehicle_links(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<Vec<DispatchLink>>, ApiError> {
    Ok(Json(state.registry().links_for_vehicle(&vehicle_id).await?))
}

pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth::authorize_vehicle_for(&state, &vehicle_id, &headers)?;
    let vehicle_id = normalize_vehicle_id(&vehicle_id)?;
    let removed = state.end_session(&vehicle_id).await?;
    Ok(Json(serde_json::json!({
        "vehicle_id": vehicle_id,
        "links_removed": removed,
    })))
}
