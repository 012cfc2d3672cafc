//! Parley server binary.

use std::sync::Arc;
use std::time::Duration;

use http::HeaderValue;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use parley::adapters::engine::{EngineSessionPool, HttpEngineFactory};
use parley::adapters::postgres::PostgresChatStore;
use parley::adapters::websocket::{websocket_router, RelayState, TransportRegistry};
use parley::application::ChatTurnService;
use parley::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    let pg_pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    let store = Arc::new(PostgresChatStore::new(pg_pool));
    let factory = Arc::new(HttpEngineFactory::new(config.engine.clone()));
    let engine_pool = Arc::new(EngineSessionPool::new(factory));
    let registry = Arc::new(TransportRegistry::new());
    let chat = Arc::new(ChatTurnService::new(store, engine_pool.clone()));

    let state = RelayState::new(registry, engine_pool, chat, config.relay.clone());

    let mut app = websocket_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )));

    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if !origins.is_empty() {
        app = app.layer(CorsLayer::new().allow_origin(origins));
    }

    let addr = config.server.socket_addr()?;
    tracing::info!(%addr, "parley relay listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
