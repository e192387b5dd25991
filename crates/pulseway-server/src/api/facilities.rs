//! Facility directory and roster handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use pulseway_core::{
    normalize_facility_id, DispatchError, DispatchLink, Facility, InformRequest,
    RegisterFacilityRequest,
};
use serde::Deserialize;

use crate::alerts::{roster_view, PendingInform, PendingRemove, RosterView};
use crate::api::auth;
use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    #[serde(default)]
    q: String,
}

pub async fn register_facility(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterFacilityRequest>,
) -> Result<(StatusCode, Json<Facility>), ApiError> {
    let facility = state.directory().register(&req.name, req.location).await?;
    Ok((StatusCode::CREATED, Json(facility)))
}

pub async fn list_facilities(State(state): State<Arc<AppState>>) -> Json<Vec<Facility>> {
    Json(state.directory().list_facilities())
}

pub async fn refresh_facilities(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.directory().refresh().await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

pub async fn suggest_facilities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SuggestQuery>,
) -> Json<Vec<Facility>> {
    Json(state.directory().suggest(&query.q))
}

pub async fn get_facility(
    State(state): State<Arc<AppState>>,
    Path(facility_id): Path<String>,
) -> Result<Json<Facility>, ApiError> {
    Ok(Json(state.directory().get_facility(&facility_id)?))
}

pub async fn get_roster(
    State(state): State<Arc<AppState>>,
    Path(facility_id): Path<String>,
) -> Result<Json<RosterView>, ApiError> {
    let facility = resolve_facility(&state, &facility_id).await?;
    let links = state.registry().list_links(&facility.facility_id).await?;
    Ok(Json(roster_view(&facility, &links)))
}

pub async fn inform_facility(
    State(state): State<Arc<AppState>>,
    Path(facility_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<InformRequest>,
) -> Result<Json<DispatchLink>, ApiError> {
    auth::authorize_vehicle_for(&state, &req.vehicle_id, &headers)?;

    let facility = state.directory().get_facility(&facility_id)?;
    let vehicle_location = req
        .location
        .or_else(|| state.last_coordinate(&req.vehicle_id))
        .ok_or_else(|| {
            DispatchError::validation(format!(
                "No location supplied or known for vehicle {}",
                req.vehicle_id
            ))
        })?;

    let link = PendingInform {
        facility,
        vehicle_id: req.vehicle_id,
        vehicle_location,
    }
    .confirm(state.registry())
    .await?;
    Ok(Json(link))
}

pub async fn remove_link(
    State(state): State<Arc<AppState>>,
    Path((facility_id, vehicle_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let facility = resolve_facility(&state, &facility_id).await?;
    PendingRemove {
        facility,
        vehicle_id,
    }
    .confirm(state.registry())
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Directory entry, or the metadata stored on the roster when the
/// directory snapshot does not know the facility yet.
async fn resolve_facility(state: &AppState, facility_id: &str) -> Result<Facility, ApiError> {
    match state.directory().get_facility(facility_id) {
        Ok(facility) => Ok(facility),
        Err(err) if err.is_not_found() => {
            let roster = state.registry().roster(facility_id).await?.ok_or(err)?;
            let facility_id = normalize_facility_id(facility_id)?;
            Ok(Facility {
                display_name: roster.display_name.unwrap_or_else(|| facility_id.clone()),
                facility_id,
                coordinate: roster.location,
            })
        }
        Err(err) => Err(err.into()),
    }
}
