//! Alert endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use crate::actors::messages::BroadcastMessage;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::AlertsResponse,
};
use crate::{AlertState, AlertStatus, LogCategory, LogLevel, SystemLogRecord};

const DEFAULT_ALERT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    status: Option<String>,
    limit: Option<usize>,
}

/// GET /api/v1/alerts?status=active|resolved
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertsQuery>,
) -> ApiResult<Json<AlertsResponse>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<AlertStatus>)
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);

    let alerts = state.store.list_alerts(status, limit).await?;

    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}

/// PUT /api/v1/alerts/:id/resolve
///
/// Resolves an active alert by hand and tells subscribers about it.
pub async fn resolve_alert(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AlertState>> {
    let alert = state
        .store
        .resolve_alert(id, Utc::now())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no active alert with id {id}")))?;

    info!("{} alert {id} resolved manually", alert.kind);

    let log = SystemLogRecord::new(
        LogLevel::Info,
        LogCategory::System,
        format!("{} alert resolved manually", alert.kind.label()),
    );
    if let Err(e) = state.store.insert_log(&log).await {
        error!("failed to write alert log: {e}");
    }

    state.hub.publish(BroadcastMessage::Alert(alert.clone()));

    Ok(Json(alert))
}
