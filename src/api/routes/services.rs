//! Service status endpoint

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState, types::ServicesResponse};

/// GET /api/v1/services
///
/// Latest check result of every service seen so far, ordered by name
pub async fn list_services(State(state): State<ApiState>) -> ApiResult<Json<ServicesResponse>> {
    let services = state.store.list_service_statuses().await?;

    Ok(Json(ServicesResponse {
        count: services.len(),
        services,
    }))
}
