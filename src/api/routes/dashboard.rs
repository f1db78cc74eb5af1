//! Combined dashboard snapshot

use axum::{Json, extract::State};

use crate::AlertStatus;
use crate::api::{error::ApiResult, state::ApiState, types::DashboardResponse};
use crate::storage::QueryRange;

/// Rows per list in the snapshot
const DASHBOARD_LIST_LIMIT: usize = 10;

const DASHBOARD_HISTORY_HOURS: u32 = 24;

/// GET /api/v1/dashboard
pub async fn get_dashboard(State(state): State<ApiState>) -> ApiResult<Json<DashboardResponse>> {
    let store = &state.store;

    let (current_metrics, services, recent_logs, active_alerts, historical_data) = tokio::try_join!(
        store.latest_metric(),
        store.list_service_statuses(),
        store.latest_logs(None, DASHBOARD_LIST_LIMIT),
        store.list_alerts(Some(AlertStatus::Active), DASHBOARD_LIST_LIMIT),
        store.query_metrics(QueryRange::last_hours(DASHBOARD_HISTORY_HOURS)),
    )?;

    Ok(Json(DashboardResponse {
        current_metrics,
        services,
        recent_logs,
        active_alerts,
        historical_data,
    }))
}
