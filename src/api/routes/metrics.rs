//! Metric history endpoints

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::MetricRecord;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::MetricsResponse,
};
use crate::storage::QueryRange;

/// Default lookback when `hours` is not given
const DEFAULT_LOOKBACK_HOURS: u32 = 1;

/// Longest lookback a single request may ask for
const MAX_LOOKBACK_HOURS: u32 = 24 * 30;

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    hours: Option<u32>,
}

/// GET /api/v1/metrics?hours=N
pub async fn get_metrics(
    State(state): State<ApiState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<MetricsResponse>> {
    let hours = query.hours.unwrap_or(DEFAULT_LOOKBACK_HOURS);
    if hours == 0 || hours > MAX_LOOKBACK_HOURS {
        return Err(ApiError::InvalidRequest(format!(
            "hours must be between 1 and {MAX_LOOKBACK_HOURS}"
        )));
    }

    let metrics = state.store.query_metrics(QueryRange::last_hours(hours)).await?;

    Ok(Json(MetricsResponse {
        hours,
        count: metrics.len(),
        metrics,
    }))
}

/// GET /api/v1/metrics/current
pub async fn get_current_metrics(State(state): State<ApiState>) -> ApiResult<Json<MetricRecord>> {
    state
        .store
        .latest_metric()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no metrics collected yet".to_string()))
}
