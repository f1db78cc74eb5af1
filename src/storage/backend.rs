//! The `StorageBackend` trait and the value types its methods take and return

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::error::StorageResult;
use crate::{
    AlertState, AlertStatus, DiskUsageRecord, LogLevel, MetricRecord, NetworkTrafficRecord,
    ServiceStatusRecord, SignalKind, SystemLogRecord,
};

/// Resolved alerts untouched for this long are removed by retention
pub const RESOLVED_ALERT_RETENTION_DAYS: i64 = 7;

/// System log rows older than this are removed by retention
pub const LOG_RETENTION_DAYS: i64 = 30;

/// Query parameters for fetching metrics within a time range
#[derive(Debug, Clone)]
pub struct QueryRange {
    /// Start of time range (inclusive)
    pub start: DateTime<Utc>,

    /// End of time range (inclusive)
    pub end: DateTime<Utc>,

    /// Maximum number of results to return
    pub limit: Option<usize>,
}

impl QueryRange {
    /// The last `hours` hours up to now
    pub fn last_hours(hours: u32) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::hours(hours as i64),
            end,
            limit: None,
        }
    }
}

/// Cutoffs applied by the daily retention job
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Metrics, disk usage and network traffic rows older than this are deleted
    pub samples_before: DateTime<Utc>,

    /// Resolved alerts last updated before this are deleted
    pub resolved_alerts_before: DateTime<Utc>,

    /// Log rows older than this are deleted
    pub logs_before: DateTime<Utc>,
}

impl RetentionPolicy {
    /// Cutoffs relative to `now`; a window reaching past the calendar's start keeps everything
    pub fn at(now: DateTime<Utc>, history_hours: u32) -> Self {
        let cutoff =
            |window: Duration| now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

        Self {
            samples_before: cutoff(Duration::hours(i64::from(history_hours))),
            resolved_alerts_before: cutoff(Duration::days(RESOLVED_ALERT_RETENTION_DAYS)),
            logs_before: cutoff(Duration::days(LOG_RETENTION_DAYS)),
        }
    }
}

/// Number of rows removed per table by a cleanup run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub metrics: usize,
    pub disk_usage: usize,
    pub network_traffic: usize,
    pub alerts: usize,
    pub logs: usize,
}

impl CleanupStats {
    pub fn total(&self) -> usize {
        self.metrics + self.disk_usage + self.network_traffic + self.alerts + self.logs
    }
}

/// Result of a cheap liveness probe, surfaced by the health endpoint
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
    /// Backend name, file path, row counts and the like
    pub metadata: HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// Every table is append-ordered by an auto-increment id. The alert lookup
/// and the write that follows it are separate calls and are not wrapped in
/// a transaction; callers serialize evaluations per signal kind themselves.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared across the
/// scheduler jobs and the API handlers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Metrics
    // ========================================================================

    async fn insert_metric(&self, record: &MetricRecord) -> StorageResult<()>;

    /// Most recently inserted metric, if any
    async fn latest_metric(&self) -> StorageResult<Option<MetricRecord>>;

    /// Metrics within a time range, oldest first
    async fn query_metrics(&self, query: QueryRange) -> StorageResult<Vec<MetricRecord>>;

    // ========================================================================
    // Alerts
    // ========================================================================

    /// The active alert for `kind`, if one exists
    async fn find_active_alert(&self, kind: SignalKind) -> StorageResult<Option<AlertState>>;

    /// Store a new alert and return its id
    async fn insert_alert(&self, alert: &AlertState) -> StorageResult<i64>;

    /// Overwrite the mutable fields of an existing alert
    ///
    /// Fails with `StorageError::NotFound` when `alert.id` is unset or unknown.
    async fn update_alert(&self, alert: &AlertState) -> StorageResult<()>;

    /// Alerts newest first, optionally filtered by status
    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        limit: usize,
    ) -> StorageResult<Vec<AlertState>>;

    /// Resolve an active alert by id
    ///
    /// Returns the resolved alert, or `None` if no active alert has that id.
    async fn resolve_alert(&self, id: i64, at: DateTime<Utc>) -> StorageResult<Option<AlertState>>;

    // ========================================================================
    // Services
    // ========================================================================

    /// Insert or replace the status row keyed by service name
    async fn upsert_service_status(&self, status: &ServiceStatusRecord) -> StorageResult<()>;

    /// All service statuses ordered by name
    async fn list_service_statuses(&self) -> StorageResult<Vec<ServiceStatusRecord>>;

    // ========================================================================
    // System logs
    // ========================================================================

    /// Store a log row and return its id
    async fn insert_log(&self, log: &SystemLogRecord) -> StorageResult<i64>;

    /// Most recent log rows, newest first
    async fn latest_logs(
        &self,
        level: Option<LogLevel>,
        limit: usize,
    ) -> StorageResult<Vec<SystemLogRecord>>;

    // ========================================================================
    // Disk usage and network traffic snapshots
    // ========================================================================

    async fn insert_disk_usage(&self, records: &[DiskUsageRecord]) -> StorageResult<()>;

    /// Rows of the most recent disk usage snapshot
    async fn latest_disk_usage(&self) -> StorageResult<Vec<DiskUsageRecord>>;

    async fn insert_network_traffic(&self, records: &[NetworkTrafficRecord]) -> StorageResult<()>;

    /// Rows of the most recent network traffic snapshot
    async fn latest_network_traffic(&self) -> StorageResult<Vec<NetworkTrafficRecord>>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Delete rows older than the policy's cutoffs
    async fn cleanup(&self, policy: &RetentionPolicy) -> StorageResult<CleanupStats>;

    /// Probe the store; an unreachable database is `Ok` with `healthy: false`
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Release connections; called once on shutdown
    async fn close(&self) -> StorageResult<()>;
}
