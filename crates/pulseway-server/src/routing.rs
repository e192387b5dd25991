//! Driving-route lookup through OpenRouteService.
//!
//! A black box returning a polyline. Only the API's route endpoint uses it;
//! proximity matching never does.

use std::time::Duration;

use async_trait::async_trait;
use pulseway_core::{Coordinate, DispatchError};
use reqwest::Client;
use serde::Deserialize;

pub const DEFAULT_ROUTING_URL: &str = "https://api.openrouteservice.org/v2/directions/driving-car";

#[async_trait]
pub trait RoutingService: Send + Sync {
    async fn get_route(&self, start: Coordinate, end: Coordinate)
        -> Result<Vec<Coordinate>, DispatchError>;
}

pub struct OpenRouteServiceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// GeoJSON order: [longitude, latitude].
    coordinates: Vec<[f64; 2]>,
}

impl OpenRouteServiceClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(DispatchError::transient)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

/// Convert GeoJSON `[lon, lat]` pairs into coordinates.
fn polyline_from_response(body: DirectionsResponse) -> Result<Vec<Coordinate>, DispatchError> {
    let feature = body
        .features
        .into_iter()
        .next()
        .ok_or_else(|| DispatchError::not_found("route", "driving-car"))?;
    Ok(feature
        .geometry
        .coordinates
        .into_iter()
        .map(|[lon, lat]| Coordinate::new(lat, lon))
        .collect())
}

#[async_trait]
impl RoutingService for OpenRouteServiceClient {
    async fn get_route(
        &self,
        start: Coordinate,
        end: Coordinate,
    ) -> Result<Vec<Coordinate>, DispatchError> {
        start.validate()?;
        end.validate()?;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("api_key", self.api_key.clone()),
                ("start", format!("{},{}", start.longitude, start.latitude)),
                ("end", format!("{},{}", end.longitude, end.latitude)),
            ])
            .send()
            .await
            .map_err(DispatchError::transient)?;

        if !response.status().is_success() {
            return Err(DispatchError::transient(format!(
                "routing service returned {}",
                response.status()
            )));
        }

        let body: DirectionsResponse = response.json().await.map_err(DispatchError::transient)?;
        polyline_from_response(body)
    }
}
