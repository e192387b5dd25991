//! Vehicle session token checks.

use axum::http::{header, HeaderMap, StatusCode};

use crate::api::error::ApiError;
use crate::state::AppState;

/// Extract a vehicle session token from headers.
/// Accepts `Authorization: Bearer <token>` or `X-Vehicle-Token: <token>`.
pub fn extract_vehicle_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|text| text.strip_prefix("Bearer "));
    let explicit = headers
        .get("X-Vehicle-Token")
        .and_then(|value| value.to_str().ok());

    bearer
        .or(explicit)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Require a valid token for a specific vehicle id.
pub fn authorize_vehicle_for(
    state: &AppState,
    vehicle_id: &str,
    headers: &HeaderMap,
) -> Result<(), ApiError> {
    let token = extract_vehicle_token(headers).ok_or_else(|| {
        ApiError::new(StatusCode::UNAUTHORIZED, "Vehicle session token required")
    })?;
    if state.validate_vehicle_token(vehicle_id, &token) {
        Ok(())
    } else {
        Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Session token does not match vehicle",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_and_custom_header_are_accepted() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_vehicle_token(&headers), None);

        headers.insert("X-Vehicle-Token", HeaderValue::from_static(" abc "));
        assert_eq!(extract_vehicle_token(&headers).as_deref(), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(extract_vehicle_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn blank_bearer_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_vehicle_token(&headers), None);
    }
}
