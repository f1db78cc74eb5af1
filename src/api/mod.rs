//! REST API and WebSocket server of the monitoring hub
//!
//! A thin layer over the storage backend plus the WebSocket endpoint through
//! which subscribers receive everything the hub publishes.
//!
//! ## Endpoints
//!
//! - `GET /health`, `GET /api/v1/health` - Health check
//! - `GET /api/v1/metrics?hours=N` - Metric history (default 1 hour)
//! - `GET /api/v1/metrics/current` - Latest metric record
//! - `GET /api/v1/services` - Latest service check results
//! - `GET /api/v1/alerts?status=active|resolved` - Alerts, newest first
//! - `PUT /api/v1/alerts/:id/resolve` - Resolve an active alert by hand
//! - `GET /api/v1/logs?level=&limit=` - Recent system logs
//! - `POST /api/v1/logs` - Write a system log row
//! - `GET /api/v1/disk`, `GET /api/v1/network` - Latest snapshots
//! - `GET /api/v1/dashboard` - One snapshot of metrics, services, logs, alerts and history
//! - `WS /ws` - Real-time stream
//!
//! Health endpoints stay reachable without the bearer token.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::config::ServerConfig;

/// Where the API listens and how it guards its routes
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,

    /// Bearer token for everything but health; `None` leaves the API open
    pub auth_token: Option<String>,

    /// Answer cross-origin requests from browser dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ServerConfig::default().into()
    }
}

impl From<&ServerConfig> for ApiConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            bind_addr: SocketAddr::from(server.bind_address()),
            auth_token: server.auth_token.clone(),
            enable_cors: server.enable_cors,
        }
    }
}

impl From<ServerConfig> for ApiConfig {
    fn from(server: ServerConfig) -> Self {
        Self::from(&server)
    }
}

/// Data, control and stream routes; these sit behind the bearer token
fn protected_routes() -> Router<ApiState> {
    use routes::{alerts, dashboard, logs, metrics, services, system};

    Router::new()
        .route("/api/v1/metrics", get(metrics::get_metrics))
        .route("/api/v1/metrics/current", get(metrics::get_current_metrics))
        .route("/api/v1/services", get(services::list_services))
        .route("/api/v1/alerts", get(alerts::list_alerts))
        .route("/api/v1/alerts/:id/resolve", put(alerts::resolve_alert))
        .route("/api/v1/logs", get(logs::list_logs).post(logs::create_log))
        .route("/api/v1/disk", get(system::get_disk_usage))
        .route("/api/v1/network", get(system::get_network_traffic))
        .route("/api/v1/dashboard", get(dashboard::get_dashboard))
        .route("/ws", get(websocket::websocket_handler))
}

/// Build the complete application: routes, auth, tracing and CORS
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    let protected = match config.auth_token.clone() {
        Some(token) => protected_routes().layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        )),
        None => protected_routes(),
    };

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/health", get(routes::health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if !config.enable_cors {
        return app;
    }
    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// Bind the listener and serve on a background task
///
/// Resolves to the bound address once the socket is open, so a port of 0
/// can be used to pick a free one.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    let addr = listener.local_addr()?;
    let app = router(&config, state);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("api server stopped: {e}");
        }
    });

    info!(%addr, "api server listening");
    Ok(addr)
}
