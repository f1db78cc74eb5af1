//! Health check endpoint

use axum::{Json, extract::State};
use tracing::warn;

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /health, GET /api/v1/health
///
/// Always answers 200; `database` reports whether the store answered its own check.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let database = match state.store.health_check().await {
        Ok(health) => health.healthy,
        Err(e) => {
            warn!("storage health check failed: {e}");
            false
        }
    };

    let subscribers = state.hub.subscriber_count().await.unwrap_or(0);

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database,
        subscribers,
    })
}
