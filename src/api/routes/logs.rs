//! System log endpoints

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{LogsResponse, NewLogRequest},
};
use crate::{LogLevel, SystemLogRecord};

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    level: Option<String>,
    limit: Option<usize>,
}

/// GET /api/v1/logs?level=&limit=
pub async fn list_logs(
    State(state): State<ApiState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    // an empty `level=` means no filter
    let level = query
        .level
        .as_deref()
        .filter(|level| !level.is_empty())
        .map(str::parse::<LogLevel>)
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);

    let logs = state.store.latest_logs(level, limit).await?;

    Ok(Json(LogsResponse {
        count: logs.len(),
        logs,
    }))
}

/// POST /api/v1/logs
pub async fn create_log(
    State(state): State<ApiState>,
    Json(request): Json<NewLogRequest>,
) -> ApiResult<(StatusCode, Json<SystemLogRecord>)> {
    if request.message.trim().is_empty() {
        return Err(ApiError::InvalidRequest("message must not be empty".to_string()));
    }

    let mut log = SystemLogRecord::new(request.level, request.category, request.message);
    log.id = Some(state.store.insert_log(&log).await?);

    Ok((StatusCode::CREATED, Json(log)))
}
