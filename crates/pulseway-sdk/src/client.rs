//! PulseWay client for vehicle registration and dispatch calls.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use pulseway_core::{Coordinate, DispatchError, DispatchLink, Facility, VehiclePosition};
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::reporter::PositionSink;

/// Client for connecting to the PulseWay server.
pub struct PulseClient {
    pub(crate) base_url: String,
    pub(crate) vehicle_id: Option<String>,
    pub(crate) session_token: Option<String>,
    pub(crate) client: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub vehicle_id: String,
    pub session_token: String,
    pub report_interval_ms: u64,
    pub report_distance_m: f64,
}

#[derive(Debug, Serialize)]
struct PositionRequest<'a> {
    vehicle_id: &'a str,
    coordinate: Coordinate,
    captured_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct InformBody<'a> {
    vehicle_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<Coordinate>,
}

#[derive(Debug, Serialize)]
struct RegisterFacilityBody<'a> {
    name: &'a str,
    location: Coordinate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NearbyEntry {
    pub facility_id: String,
    pub display_name: String,
    pub distance_km: f64,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NearbyView {
    pub vehicle_id: String,
    pub entries: Vec<NearbyEntry>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterEntry {
    pub vehicle_id: String,
    pub vehicle_location: Coordinate,
    pub linked_at: DateTime<Utc>,
    pub distance_km: Option<f64>,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterView {
    pub facility_id: String,
    pub display_name: String,
    pub location: Option<Coordinate>,
    pub entries: Vec<RosterEntry>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error status returned by the server, with its `{"error": ...}` message.
#[derive(Debug, Clone, Error)]
#[error("Failed to {action}: {status} {message}")]
pub struct ServerError {
    pub action: String,
    pub status: StatusCode,
    pub message: String,
}

impl ServerError {
    /// Map the status back onto the dispatch taxonomy the server used.
    pub fn to_dispatch_error(&self) -> DispatchError {
        match self.status {
            StatusCode::BAD_REQUEST => DispatchError::Validation(self.message.clone()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DispatchError::PermissionDenied,
            StatusCode::NOT_FOUND => DispatchError::not_found("resource", self.action.clone()),
            StatusCode::CONFLICT => DispatchError::AlreadyRegistered(self.message.clone()),
            _ => DispatchError::transient(self),
        }
    }
}

/// Classify a client failure. Anything that is not a server status, such
/// as a refused connection, is transient.
pub fn dispatch_error(err: &anyhow::Error) -> DispatchError {
    match err.downcast_ref::<ServerError>() {
        Some(server) => server.to_dispatch_error(),
        None => DispatchError::transient(err),
    }
}

/// Realtime frame as written by the server: `{"path": ..., "value": ...}`.
#[derive(Debug, Deserialize)]
struct RealtimeFrame {
    path: String,
    value: serde_json::Value,
}

/// WebSocket stream of published vehicle positions.
pub struct PositionStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PulseClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            vehicle_id: None,
            session_token: None,
            client: reqwest::Client::new(),
        }
    }

    /// Resume an existing session without registering again.
    pub fn with_session(mut self, vehicle_id: impl Into<String>, token: impl Into<String>) -> Self {
        self.vehicle_id = Some(vehicle_id.into());
        self.session_token = Some(token.into());
        self
    }

    pub fn vehicle_id(&self) -> Option<&str> {
        self.vehicle_id.as_deref()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    fn session(&self) -> Result<(&str, &str)> {
        match (self.vehicle_id.as_deref(), self.session_token.as_deref()) {
            (Some(vehicle_id), Some(token)) => Ok((vehicle_id, token)),
            _ => anyhow::bail!("Vehicle not registered"),
        }
    }

    /// Register this vehicle and store the issued id and session token.
    pub async fn register(&mut self) -> Result<RegisterResponse> {
        let url = format!("{}/v1/vehicles/register", self.base_url);
        let response = check(self.client.post(&url).send().await?, "register vehicle").await?;
        let body: RegisterResponse = response.json().await?;

        self.vehicle_id = Some(body.vehicle_id.clone());
        self.session_token = Some(body.session_token.clone());
        Ok(body)
    }

    /// Publish one position sample. Returns false when the server kept a
    /// newer sample.
    pub async fn send_position(&self, position: &VehiclePosition) -> Result<bool> {
        let (_, token) = self.session()?;
        let url = format!("{}/v1/positions", self.base_url);
        let request = PositionRequest {
            vehicle_id: &position.vehicle_id,
            coordinate: position.coordinate,
            captured_at: position.captured_at,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;
        let body: serde_json::Value = check(response, "send position").await?.json().await?;
        Ok(body["accepted"].as_bool().unwrap_or(false))
    }

    /// Register a facility (hospital side).
    pub async fn register_facility(&self, name: &str, location: Coordinate) -> Result<Facility> {
        let url = format!("{}/v1/facilities", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RegisterFacilityBody { name, location })
            .send()
            .await?;
        Ok(check(response, "register facility").await?.json().await?)
    }

    pub async fn list_facilities(&self) -> Result<Vec<Facility>> {
        let url = format!("{}/v1/facilities", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(check(response, "list facilities").await?.json().await?)
    }

    /// Tell a facility this vehicle is responding. Without a location the
    /// server uses the last published position.
    pub async fn inform(&self, facility_id: &str, location: Option<Coordinate>) -> Result<DispatchLink> {
        let (vehicle_id, token) = self.session()?;
        let url = self.facility_url(facility_id, &["links"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&InformBody {
                vehicle_id,
                location,
            })
            .send()
            .await?;
        Ok(check(response, "inform facility").await?.json().await?)
    }

    /// Facilities nearest-first from this vehicle's last position.
    pub async fn nearby(&self, radius_km: Option<f64>) -> Result<NearbyView> {
        let (vehicle_id, _) = self.session()?;
        let mut url = self.url_with_segments(&["v1", "vehicles", vehicle_id, "nearby"])?;
        if let Some(radius) = radius_km {
            url.query_pairs_mut()
                .append_pair("radius_km", &radius.to_string());
        }
        let response = self.client.get(url).send().await?;
        Ok(check(response, "nearby facilities").await?.json().await?)
    }

    /// A facility's inbound roster with live distances.
    pub async fn roster(&self, facility_id: &str) -> Result<RosterView> {
        let url = self.facility_url(facility_id, &["links"])?;
        let response = self.client.get(url).send().await?;
        Ok(check(response, "facility roster").await?.json().await?)
    }

    pub async fn remove_link(&self, facility_id: &str, vehicle_id: &str) -> Result<()> {
        let url = self.facility_url(facility_id, &["links", vehicle_id])?;
        let response = self.client.delete(url).send().await?;
        check(response, "remove link").await?;
        Ok(())
    }

    /// End this vehicle's session; the server drops every link it held.
    pub async fn end_session(&mut self) -> Result<usize> {
        let (vehicle_id, token) = self.session()?;
        let url = self.url_with_segments(&["v1", "vehicles", vehicle_id, "session"])?;
        let response = self.client.delete(url).bearer_auth(token).send().await?;
        let body: serde_json::Value = check(response, "end session").await?.json().await?;

        self.session_token = None;
        Ok(body["links_removed"].as_u64().unwrap_or(0) as usize)
    }

    /// Subscribe to published positions, optionally for one vehicle only.
    pub async fn connect_position_stream(&self, vehicle_id: Option<&str>) -> Result<PositionStream> {
        let url = build_ws_url(&self.base_url, "/v1/ws", vehicle_id)?;
        let (socket, _) = connect_async(url.as_str()).await?;
        Ok(PositionStream { socket })
    }

    fn facility_url(&self, facility_id: &str, rest: &[&str]) -> Result<Url> {
        let mut segments = vec!["v1", "facilities", facility_id];
        segments.extend_from_slice(rest);
        self.url_with_segments(&segments)
    }

    /// Facility names are free text, so path segments are percent-encoded.
    fn url_with_segments(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl PositionSink for PulseClient {
    async fn publish(&self, position: &VehiclePosition) -> Result<(), DispatchError> {
        self.send_position(position)
            .await
            .map(|_| ())
            .map_err(|err| dispatch_error(&err))
    }
}

impl PositionStream {
    /// Read the next position from the stream (returns None on close).
    pub async fn next_position(&mut self) -> Result<Option<VehiclePosition>> {
        while let Some(msg) = self.socket.next().await {
            let text = match msg? {
                Message::Text(text) => text,
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Message::Close(_) => return Ok(None),
                _ => continue,
            };
            let frame: RealtimeFrame = serde_json::from_str(&text)?;
            match serde_json::from_value(frame.value) {
                Ok(position) => return Ok(Some(position)),
                Err(err) => tracing::debug!("Skipping frame for {}: {}", frame.path, err),
            }
        }
        Ok(None)
    }
}

/// Turn an error status into an error carrying the server's message.
async fn check(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body["error"].as_str().map(str::to_string))
        .unwrap_or_default();
    Err(ServerError {
        action: action.to_string(),
        status,
        message,
    }
    .into())
}

fn build_ws_url(base: &str, path: &str, vehicle_id: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(base)?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => other,
    }
    .to_string();

    url.set_scheme(&scheme)
        .map_err(|_| anyhow::anyhow!("Invalid base URL scheme"))?;
    url.set_path(path);
    if let Some(vehicle_id) = vehicle_id {
        url.query_pairs_mut().append_pair("vehicle_id", vehicle_id);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_swaps_scheme_and_filters() {
        let url = build_ws_url("http://localhost:3000", "/v1/ws", Some("AMB1")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3000/v1/ws?vehicle_id=AMB1");

        let url = build_ws_url("https://pulse.example", "/v1/ws", None).unwrap();
        assert_eq!(url.as_str(), "wss://pulse.example/v1/ws");
    }

    #[test]
    fn facility_names_are_encoded_in_paths() {
        let client = PulseClient::new("http://localhost:3000/");
        let url = client.facility_url("City Care", &["links", "AMB1"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/v1/facilities/City%20Care/links/AMB1"
        );
    }

    #[test]
    fn calls_need_a_session() {
        let client = PulseClient::new("http://localhost:3000");
        assert!(client.session().is_err());

        let client = client.with_session("AMB1", "token");
        assert_eq!(client.session().unwrap(), ("AMB1", "token"));
    }

    fn server_error(status: StatusCode, message: &str) -> anyhow::Error {
        ServerError {
            action: "send position".to_string(),
            status,
            message: message.to_string(),
        }
        .into()
    }

    #[test]
    fn server_statuses_map_to_dispatch_errors() {
        let mismatch = server_error(StatusCode::FORBIDDEN, "Session token does not match vehicle");
        assert_eq!(dispatch_error(&mismatch), DispatchError::PermissionDenied);

        let missing = server_error(StatusCode::UNAUTHORIZED, "Vehicle session token required");
        assert_eq!(dispatch_error(&missing), DispatchError::PermissionDenied);

        let invalid = server_error(StatusCode::BAD_REQUEST, "Latitude 95 outside [-90, 90]");
        assert!(matches!(
            dispatch_error(&invalid),
            DispatchError::Validation(message) if message.contains("Latitude")
        ));

        let gone = server_error(StatusCode::NOT_FOUND, "");
        assert!(dispatch_error(&gone).is_not_found());

        let down = server_error(StatusCode::SERVICE_UNAVAILABLE, "down");
        assert!(dispatch_error(&down).is_transient());
    }

    #[test]
    fn connection_failures_stay_transient() {
        let err = anyhow::anyhow!("connection refused");
        assert!(dispatch_error(&err).is_transient());
    }

    #[test]
    fn server_error_message_keeps_status() {
        let err = server_error(StatusCode::CONFLICT, "Facility 'general' is already registered");
        assert_eq!(
            err.to_string(),
            "Failed to send position: 409 Conflict Facility 'general' is already registered"
        );
    }
}
