//! Latest disk usage and network traffic snapshots

use axum::{Json, extract::State};

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{DiskUsageResponse, NetworkTrafficResponse},
};

/// GET /api/v1/disk
pub async fn get_disk_usage(State(state): State<ApiState>) -> ApiResult<Json<DiskUsageResponse>> {
    let partitions = state.store.latest_disk_usage().await?;
    Ok(Json(DiskUsageResponse { partitions }))
}

/// GET /api/v1/network
pub async fn get_network_traffic(
    State(state): State<ApiState>,
) -> ApiResult<Json<NetworkTrafficResponse>> {
    let interfaces = state.store.latest_network_traffic().await?;
    Ok(Json(NetworkTrafficResponse { interfaces }))
}
