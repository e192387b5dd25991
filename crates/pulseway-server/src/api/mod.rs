//! API routes for the PulseWay server.

pub mod auth;
pub mod error;
pub mod facilities;
mod routes;
pub mod vehicles;
pub mod ws;

use axum::Router;

pub fn routes() -> Router<std::sync::Arc<crate::state::AppState>> {
    routes::create_router()
}
