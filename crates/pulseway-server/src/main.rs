//! PulseWay Server - dispatch backend for ambulances and hospitals

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulseway_server::config::Config;
use pulseway_server::loops::directory_refresh_loop::run_directory_refresh_loop;
use pulseway_server::routing::OpenRouteServiceClient;
use pulseway_server::state::AppState;
use pulseway_server::store::{
    init_database, DocumentStore, MemoryDocumentStore, MemoryRealtimeStore,
};
use pulseway_server::api;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pulseway_server=debug".parse()?),
        )
        .init();

    tracing::info!("Starting PulseWay Server...");

    let config = Config::from_env();
    let port = config.server_port;

    let documents: Arc<dyn DocumentStore> = match config.database_path.as_deref() {
        Some(path) => {
            tracing::info!("Using SQLite document store at {}", path);
            Arc::new(init_database(path, config.database_max_connections).await?)
        }
        None => {
            tracing::warn!("PULSEWAY_DATABASE_PATH not set; documents are kept in memory");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    let mut state = AppState::new(
        config.clone(),
        documents,
        Arc::new(MemoryRealtimeStore::new()),
    );
    if let Some(api_key) = config.routing_api_key.as_deref() {
        state = state.with_router(Arc::new(OpenRouteServiceClient::new(
            config.routing_url.clone(),
            api_key,
        )?));
    } else {
        tracing::info!("Routing disabled (PULSEWAY_ROUTING_API_KEY not set)");
    }
    let state = Arc::new(state);

    if let Err(err) = state.load_from_store().await {
        tracing::warn!("Initial load from store failed: {}", err);
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut loops = Vec::new();
    if config.directory_refresh_secs > 0 {
        loops.push(tokio::spawn(run_directory_refresh_loop(
            state.directory().clone(),
            Duration::from_secs(config.directory_refresh_secs),
            shutdown_tx.subscribe(),
        )));
    }

    let app = api::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    for handle in loops {
        if let Err(err) = handle.await {
            tracing::warn!("Background loop ended abnormally: {}", err);
        }
    }
    tracing::info!("PulseWay Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
