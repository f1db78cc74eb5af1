//! Request and response bodies of the HTTP API
//!
//! Stored records are returned as-is; these types only add the envelopes
//! and the request shapes.

use serde::{Deserialize, Serialize};

use crate::{
    AlertState, DiskUsageRecord, LogCategory, LogLevel, MetricRecord, NetworkTrafficRecord,
    ServiceStatusRecord, SystemLogRecord,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: bool,
    pub subscribers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub hours: u32,
    pub count: usize,
    pub metrics: Vec<MetricRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesResponse {
    pub count: usize,
    pub services: Vec<ServiceStatusRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub count: usize,
    pub alerts: Vec<AlertState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub count: usize,
    pub logs: Vec<SystemLogRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUsageResponse {
    pub partitions: Vec<DiskUsageRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkTrafficResponse {
    pub interfaces: Vec<NetworkTrafficRecord>,
}

/// Everything a dashboard needs for its first paint, in one response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub current_metrics: Option<MetricRecord>,
    pub services: Vec<ServiceStatusRecord>,
    pub recent_logs: Vec<SystemLogRecord>,
    pub active_alerts: Vec<AlertState>,
    /// Oldest first, covering the last 24 hours
    pub historical_data: Vec<MetricRecord>,
}

/// Body of `POST /api/v1/logs`
#[derive(Debug, Clone, Deserialize)]
pub struct NewLogRequest {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    #[serde(default = "default_log_category")]
    pub category: LogCategory,

    pub message: String,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_category() -> LogCategory {
    LogCategory::System
}
