use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod error;
mod indexer;
mod models;
mod services;
mod store;
mod utils;
mod websocket;

use config::Config;
use constants::API_VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "budokan_companion=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting Budokan companion service");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);
    tracing::info!("Indexer: {} (namespace {})", config.torii_url, config.namespace);

    let app_state = api::AppState::new(config.clone())?;

    // Start background services
    tokio::spawn(services::start_background_services(
        app_state.sql.clone(),
        app_state.store.clone(),
        app_state.queries.clone(),
        config.clone(),
    ));

    let store = app_state.store.clone();
    let app = build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Wake any confirmation waiters still parked on the store.
    store.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Tournaments
        .route(
            "/api/v1/tournaments",
            get(api::tournaments::list_tournaments),
        )
        .route(
            "/api/v1/tournaments/{id}/leaderboard",
            get(api::tournaments::get_leaderboard),
        )
        .route(
            "/api/v1/tournaments/{id}/prizes",
            get(api::tournaments::get_prizes),
        )
        .route(
            "/api/v1/tournaments/{id}/registrations",
            get(api::tournaments::get_registrations),
        )
        .route(
            "/api/v1/metrics/platform",
            get(api::tournaments::get_platform_metrics),
        )
        // Prices
        .route("/api/v1/prices", get(api::prices::get_prices))
        // Entities & optimistic updates
        .route(
            "/api/v1/entities/{entity_id}",
            get(api::entities::get_entity),
        )
        .route("/api/v1/optimistic", post(api::entities::apply_update))
        .route(
            "/api/v1/optimistic/wait",
            post(api::entities::wait_for_confirmation),
        )
        .route(
            "/api/v1/optimistic/{tx_id}/confirm",
            post(api::entities::confirm_update),
        )
        .route(
            "/api/v1/optimistic/{tx_id}/revert",
            post(api::entities::revert_update),
        )
        // WebSocket endpoints
        .route("/ws/entities", get(websocket::entities::handler))
        .route("/ws/tournaments", get(websocket::tournaments::handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
