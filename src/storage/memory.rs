//! Volatile store for `"backend": "none"` and tests
//!
//! Nothing survives a restart. Metric and log buffers are capped and evict
//! their oldest rows first.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{CleanupStats, HealthStatus, QueryRange, RetentionPolicy, StorageBackend};
use super::error::{StorageError, StorageResult};
use crate::{
    AlertState, AlertStatus, DiskUsageRecord, LogLevel, MetricRecord, NetworkTrafficRecord,
    ServiceStatusRecord, SignalKind, SystemLogRecord,
};

/// Maximum rows kept per buffered table
const MAX_ROWS: usize = 10_000;

#[derive(Default)]
struct Tables {
    metrics: VecDeque<MetricRecord>,
    alerts: Vec<AlertState>,
    services: BTreeMap<String, ServiceStatusRecord>,
    logs: VecDeque<SystemLogRecord>,
    disk_usage: Vec<DiskUsageRecord>,
    network_traffic: Vec<NetworkTrafficRecord>,
    last_alert_id: i64,
    last_service_id: i64,
    last_log_id: i64,
}

/// In-memory storage backend
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn push_capped<T>(buffer: &mut VecDeque<T>, item: T) {
    if buffer.len() == MAX_ROWS {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

/// Rows sharing the newest timestamp of a snapshot table
fn latest_snapshot<T: Clone>(rows: &[T], timestamp: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let Some(newest) = rows.iter().map(&timestamp).max() else {
        return Vec::new();
    };
    rows.iter()
        .filter(|row| timestamp(*row) == newest)
        .cloned()
        .collect()
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn insert_metric(&self, record: &MetricRecord) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        push_capped(&mut tables.metrics, record.clone());
        Ok(())
    }

    async fn latest_metric(&self) -> StorageResult<Option<MetricRecord>> {
        Ok(self.tables.read().await.metrics.back().cloned())
    }

    async fn query_metrics(&self, query: QueryRange) -> StorageResult<Vec<MetricRecord>> {
        let tables = self.tables.read().await;

        let mut metrics: Vec<MetricRecord> = tables
            .metrics
            .iter()
            .filter(|m| m.timestamp >= query.start && m.timestamp <= query.end)
            .cloned()
            .collect();
        metrics.sort_by_key(|m| m.timestamp);
        metrics.truncate(query.limit.unwrap_or(usize::MAX));

        debug!("query returned {} metrics", metrics.len());
        Ok(metrics)
    }

    async fn find_active_alert(&self, kind: SignalKind) -> StorageResult<Option<AlertState>> {
        let tables = self.tables.read().await;
        Ok(tables
            .alerts
            .iter()
            .find(|a| a.kind == kind && a.is_active())
            .cloned())
    }

    async fn insert_alert(&self, alert: &AlertState) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;

        if alert.is_active()
            && tables
                .alerts
                .iter()
                .any(|a| a.kind == alert.kind && a.is_active())
        {
            return Err(StorageError::Conflict(format!(
                "an active {} alert already exists",
                alert.kind
            )));
        }

        tables.last_alert_id += 1;
        let id = tables.last_alert_id;
        let mut stored = alert.clone();
        stored.id = Some(id);
        tables.alerts.push(stored);
        Ok(id)
    }

    async fn update_alert(&self, alert: &AlertState) -> StorageResult<()> {
        let id = alert
            .id
            .ok_or_else(|| StorageError::NotFound("alert has no id".to_string()))?;

        let mut tables = self.tables.write().await;
        let stored = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == Some(id))
            .ok_or_else(|| StorageError::NotFound(format!("alert {id}")))?;
        *stored = alert.clone();
        Ok(())
    }

    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        limit: usize,
    ) -> StorageResult<Vec<AlertState>> {
        let tables = self.tables.read().await;
        Ok(tables
            .alerts
            .iter()
            .rev()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn resolve_alert(&self, id: i64, at: DateTime<Utc>) -> StorageResult<Option<AlertState>> {
        let mut tables = self.tables.write().await;
        let Some(alert) = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == Some(id) && a.is_active())
        else {
            return Ok(None);
        };

        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(at);
        alert.updated_at = at;
        Ok(Some(alert.clone()))
    }

    async fn upsert_service_status(&self, status: &ServiceStatusRecord) -> StorageResult<()> {
        let mut tables = self.tables.write().await;

        let id = match tables.services.get(&status.name).and_then(|s| s.id) {
            Some(id) => id,
            None => {
                tables.last_service_id += 1;
                tables.last_service_id
            }
        };

        let mut stored = status.clone();
        stored.id = Some(id);
        tables.services.insert(status.name.clone(), stored);
        Ok(())
    }

    async fn list_service_statuses(&self) -> StorageResult<Vec<ServiceStatusRecord>> {
        Ok(self.tables.read().await.services.values().cloned().collect())
    }

    async fn insert_log(&self, log: &SystemLogRecord) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        tables.last_log_id += 1;
        let id = tables.last_log_id;
        let mut stored = log.clone();
        stored.id = Some(id);
        push_capped(&mut tables.logs, stored);
        Ok(id)
    }

    async fn latest_logs(
        &self,
        level: Option<LogLevel>,
        limit: usize,
    ) -> StorageResult<Vec<SystemLogRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .logs
            .iter()
            .rev()
            .filter(|l| level.is_none_or(|lvl| l.level == lvl))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_disk_usage(&self, records: &[DiskUsageRecord]) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .disk_usage
            .extend_from_slice(records);
        Ok(())
    }

    async fn latest_disk_usage(&self) -> StorageResult<Vec<DiskUsageRecord>> {
        let tables = self.tables.read().await;
        Ok(latest_snapshot(&tables.disk_usage, |r| r.timestamp))
    }

    async fn insert_network_traffic(&self, records: &[NetworkTrafficRecord]) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .network_traffic
            .extend_from_slice(records);
        Ok(())
    }

    async fn latest_network_traffic(&self) -> StorageResult<Vec<NetworkTrafficRecord>> {
        let tables = self.tables.read().await;
        Ok(latest_snapshot(&tables.network_traffic, |r| r.timestamp))
    }

    async fn cleanup(&self, policy: &RetentionPolicy) -> StorageResult<CleanupStats> {
        let mut tables = self.tables.write().await;
        let mut stats = CleanupStats::default();

        let before = tables.metrics.len();
        tables.metrics.retain(|m| m.timestamp >= policy.samples_before);
        stats.metrics = before - tables.metrics.len();

        let before = tables.disk_usage.len();
        tables
            .disk_usage
            .retain(|r| r.timestamp >= policy.samples_before);
        stats.disk_usage = before - tables.disk_usage.len();

        let before = tables.network_traffic.len();
        tables
            .network_traffic
            .retain(|r| r.timestamp >= policy.samples_before);
        stats.network_traffic = before - tables.network_traffic.len();

        let before = tables.alerts.len();
        tables
            .alerts
            .retain(|a| a.is_active() || a.updated_at >= policy.resolved_alerts_before);
        stats.alerts = before - tables.alerts.len();

        let before = tables.logs.len();
        tables.logs.retain(|l| l.timestamp >= policy.logs_before);
        stats.logs = before - tables.logs.len();

        Ok(stats)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let tables = self.tables.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("metrics".to_string(), tables.metrics.len().to_string()),
                ("alerts".to_string(), tables.alerts.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
