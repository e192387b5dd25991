//! WebSocket stream of published vehicle positions.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use pulseway_core::normalize_vehicle_id;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;
use crate::store::{RealtimeEvent, VEHICLES};

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    vehicle_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQuery>,
) -> impl IntoResponse {
    let vehicle_filter = params
        .vehicle_id
        .and_then(|id| normalize_vehicle_id(&id).ok());
    ws.on_upgrade(move |socket| handle_socket(socket, state, vehicle_filter))
}

fn wanted(event: &RealtimeEvent, vehicle_filter: Option<&str>) -> bool {
    if event.collection() != VEHICLES {
        return false;
    }
    match vehicle_filter {
        Some(vehicle_id) => event.key() == Some(vehicle_id),
        None => true,
    }
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    vehicle_filter: Option<String>,
) {
    let mut rx = state.realtime().subscribe();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if !wanted(&event, vehicle_filter.as_deref()) {
                            continue;
                        }
                        if socket.send(Message::Text(event.payload.to_string())).await.is_err() {
                            break;
                        }
                    }
                    // Missed updates are superseded by the next sample.
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}
