//! SQLite backend
//!
//! One database file opened in WAL mode behind a pool of five connections;
//! the schema lives in `migrations/` and is applied on open. Timestamps are
//! stored as Unix milliseconds. A partial unique index on
//! `alerts (kind) WHERE status = 'active'` backs the one-active-alert-per-kind rule.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{CleanupStats, HealthStatus, QueryRange, RetentionPolicy, StorageBackend};
use super::error::{StorageError, StorageResult};
use crate::{
    AlertState, AlertStatus, DiskUsageRecord, LogLevel, MetricRecord, NetworkTrafficRecord,
    ServiceStatusRecord, SignalKind, SystemLogRecord,
};

const POOL_SIZE: u32 = 5;
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

const ALERT_COLUMNS: &str = "id, kind, level, message, value, threshold, status, \
                             triggered_at, updated_at, resolved_at";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database at `db_path` and bring its schema up to date
    #[instrument(skip_all, fields(path = %db_path.as_ref().display()))]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref().to_string_lossy().into_owned();

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(format!("{db_path}: {e}")))?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("sqlite store ready at {db_path}");

        Ok(Self { pool, db_path })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn metric_from_row(row: &SqliteRow) -> MetricRecord {
        MetricRecord {
            timestamp: Self::millis_to_timestamp(row.get("timestamp")),
            cpu_percent: row.get("cpu"),
            memory_percent: row.get("memory"),
            disk_percent: row.get("disk"),
            upload_rate: row.get("upload"),
            download_rate: row.get("download"),
        }
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<AlertState> {
        let kind: String = row.get("kind");
        let level: String = row.get("level");
        let status: String = row.get("status");

        Ok(AlertState {
            id: Some(row.get("id")),
            kind: kind.parse()?,
            level: level.parse()?,
            message: row.get("message"),
            current_value: row.get("value"),
            threshold: row.get("threshold"),
            status: status.parse()?,
            triggered_at: Self::millis_to_timestamp(row.get("triggered_at")),
            updated_at: Self::millis_to_timestamp(row.get("updated_at")),
            resolved_at: row
                .get::<Option<i64>, _>("resolved_at")
                .map(Self::millis_to_timestamp),
        })
    }

    fn service_from_row(row: &SqliteRow) -> StorageResult<ServiceStatusRecord> {
        let status: String = row.get("status");

        Ok(ServiceStatusRecord {
            id: Some(row.get("id")),
            name: row.get("name"),
            status: status.parse()?,
            host: row.get("host"),
            port: row.get::<i64, _>("port") as u16,
            last_check: Self::millis_to_timestamp(row.get("last_check")),
            response_ms: row.get::<i64, _>("response_ms") as u64,
        })
    }

    fn log_from_row(row: &SqliteRow) -> StorageResult<SystemLogRecord> {
        let level: String = row.get("level");
        let category: String = row.get("category");

        Ok(SystemLogRecord {
            id: Some(row.get("id")),
            level: level.parse()?,
            category: category.parse()?,
            message: row.get("message"),
            timestamp: Self::millis_to_timestamp(row.get("timestamp")),
        })
    }

    async fn delete_before(
        &self,
        table: &str,
        column: &str,
        before: &DateTime<Utc>,
    ) -> StorageResult<usize> {
        let sql = format!("DELETE FROM {table} WHERE {column} < ?");
        let result = sqlx::query(&sql)
            .bind(Self::timestamp_to_millis(before))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip_all)]
    async fn insert_metric(&self, record: &MetricRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO system_metrics (timestamp, cpu, memory, disk, upload, download)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Self::timestamp_to_millis(&record.timestamp))
        .bind(record.cpu_percent)
        .bind(record.memory_percent)
        .bind(record.disk_percent)
        .bind(record.upload_rate)
        .bind(record.download_rate)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_metric(&self) -> StorageResult<Option<MetricRecord>> {
        let row = sqlx::query(
            r#"
            SELECT timestamp, cpu, memory, disk, upload, download
            FROM system_metrics
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::metric_from_row))
    }

    #[instrument(skip(self))]
    async fn query_metrics(&self, query: QueryRange) -> StorageResult<Vec<MetricRecord>> {
        let limit_clause = query
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let sql = format!(
            r#"
            SELECT timestamp, cpu, memory, disk, upload, download
            FROM system_metrics
            WHERE timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp ASC
            {}
            "#,
            limit_clause
        );

        let rows = sqlx::query(&sql)
            .bind(Self::timestamp_to_millis(&query.start))
            .bind(Self::timestamp_to_millis(&query.end))
            .fetch_all(&self.pool)
            .await?;

        let results: Vec<MetricRecord> = rows.iter().map(Self::metric_from_row).collect();
        debug!("query returned {} metrics", results.len());
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn find_active_alert(&self, kind: SignalKind) -> StorageResult<Option<AlertState>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE kind = ? AND status = 'active' LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::alert_from_row).transpose()
    }

    #[instrument(skip_all, fields(kind = %alert.kind))]
    async fn insert_alert(&self, alert: &AlertState) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (
                kind, level, message, value, threshold, status,
                triggered_at, updated_at, resolved_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.kind.as_str())
        .bind(alert.level.as_str())
        .bind(&alert.message)
        .bind(alert.current_value)
        .bind(alert.threshold)
        .bind(alert.status.as_str())
        .bind(Self::timestamp_to_millis(&alert.triggered_at))
        .bind(Self::timestamp_to_millis(&alert.updated_at))
        .bind(alert.resolved_at.as_ref().map(Self::timestamp_to_millis))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip_all, fields(kind = %alert.kind, id = ?alert.id))]
    async fn update_alert(&self, alert: &AlertState) -> StorageResult<()> {
        let id = alert
            .id
            .ok_or_else(|| StorageError::NotFound("alert has no id".to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET level = ?, message = ?, value = ?, threshold = ?, status = ?,
                updated_at = ?, resolved_at = ?
            WHERE id = ?
            "#,
        )
        .bind(alert.level.as_str())
        .bind(&alert.message)
        .bind(alert.current_value)
        .bind(alert.threshold)
        .bind(alert.status.as_str())
        .bind(Self::timestamp_to_millis(&alert.updated_at))
        .bind(alert.resolved_at.as_ref().map(Self::timestamp_to_millis))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("alert {id}")));
        }
        Ok(())
    }

    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        limit: usize,
    ) -> StorageResult<Vec<AlertState>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY id DESC LIMIT ?2"
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn resolve_alert(&self, id: i64, at: DateTime<Utc>) -> StorageResult<Option<AlertState>> {
        let at_millis = Self::timestamp_to_millis(&at);
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET status = 'resolved', resolved_at = ?, updated_at = ?
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(at_millis)
        .bind(at_millis)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_one(&self.pool).await?;
        Self::alert_from_row(&row).map(Some)
    }

    #[instrument(skip_all, fields(service = %status.name))]
    async fn upsert_service_status(&self, status: &ServiceStatusRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO service_status (name, status, host, port, last_check, response_ms)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                status = excluded.status,
                host = excluded.host,
                port = excluded.port,
                last_check = excluded.last_check,
                response_ms = excluded.response_ms
            "#,
        )
        .bind(&status.name)
        .bind(status.status.as_str())
        .bind(&status.host)
        .bind(status.port as i64)
        .bind(Self::timestamp_to_millis(&status.last_check))
        .bind(status.response_ms as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_service_statuses(&self) -> StorageResult<Vec<ServiceStatusRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, status, host, port, last_check, response_ms
            FROM service_status
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::service_from_row).collect()
    }

    async fn insert_log(&self, log: &SystemLogRecord) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO system_logs (level, category, message, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(log.level.as_str())
        .bind(log.category.as_str())
        .bind(&log.message)
        .bind(Self::timestamp_to_millis(&log.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn latest_logs(
        &self,
        level: Option<LogLevel>,
        limit: usize,
    ) -> StorageResult<Vec<SystemLogRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, level, category, message, timestamp
            FROM system_logs
            WHERE (?1 IS NULL OR level = ?1)
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(level.map(|l| l.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::log_from_row).collect()
    }

    #[instrument(skip_all, fields(count = records.len()))]
    async fn insert_disk_usage(&self, records: &[DiskUsageRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO disk_usage (
                    path, name, total_gb, used_gb, free_gb, usage_percent, timestamp
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.path)
            .bind(&record.name)
            .bind(record.total_gb as i64)
            .bind(record.used_gb as i64)
            .bind(record.free_gb as i64)
            .bind(record.usage_percent)
            .bind(Self::timestamp_to_millis(&record.timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn latest_disk_usage(&self) -> StorageResult<Vec<DiskUsageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT path, name, total_gb, used_gb, free_gb, usage_percent, timestamp
            FROM disk_usage
            WHERE timestamp = (SELECT MAX(timestamp) FROM disk_usage)
            ORDER BY path ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DiskUsageRecord {
                path: row.get("path"),
                name: row.get("name"),
                total_gb: row.get::<i64, _>("total_gb") as u64,
                used_gb: row.get::<i64, _>("used_gb") as u64,
                free_gb: row.get::<i64, _>("free_gb") as u64,
                usage_percent: row.get("usage_percent"),
                timestamp: Self::millis_to_timestamp(row.get("timestamp")),
            })
            .collect())
    }

    #[instrument(skip_all, fields(count = records.len()))]
    async fn insert_network_traffic(&self, records: &[NetworkTrafficRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO network_traffic (
                    interface, upload_bytes, download_bytes,
                    upload_speed, download_speed, timestamp
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.interface)
            .bind(record.upload_bytes as i64)
            .bind(record.download_bytes as i64)
            .bind(record.upload_speed)
            .bind(record.download_speed)
            .bind(Self::timestamp_to_millis(&record.timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn latest_network_traffic(&self) -> StorageResult<Vec<NetworkTrafficRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT interface, upload_bytes, download_bytes, upload_speed, download_speed, timestamp
            FROM network_traffic
            WHERE timestamp = (SELECT MAX(timestamp) FROM network_traffic)
            ORDER BY interface ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| NetworkTrafficRecord {
                interface: row.get("interface"),
                upload_bytes: row.get::<i64, _>("upload_bytes") as u64,
                download_bytes: row.get::<i64, _>("download_bytes") as u64,
                upload_speed: row.get("upload_speed"),
                download_speed: row.get("download_speed"),
                timestamp: Self::millis_to_timestamp(row.get("timestamp")),
            })
            .collect())
    }

    #[instrument(skip_all)]
    async fn cleanup(&self, policy: &RetentionPolicy) -> StorageResult<CleanupStats> {
        info!("cleaning up rows older than {}", policy.samples_before);

        let resolved_alerts = sqlx::query(
            "DELETE FROM alerts WHERE status = 'resolved' AND updated_at < ?",
        )
        .bind(Self::timestamp_to_millis(&policy.resolved_alerts_before))
        .execute(&self.pool)
        .await?;

        Ok(CleanupStats {
            metrics: self
                .delete_before("system_metrics", "timestamp", &policy.samples_before)
                .await?,
            disk_usage: self
                .delete_before("disk_usage", "timestamp", &policy.samples_before)
                .await?,
            network_traffic: self
                .delete_before("network_traffic", "timestamp", &policy.samples_before)
                .await?,
            alerts: resolved_alerts.rows_affected() as usize,
            logs: self
                .delete_before("system_logs", "timestamp", &policy.logs_before)
                .await?,
        })
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let probe = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM system_metrics")
            .fetch_one(&self.pool)
            .await;

        let status = match probe {
            Ok(rows) => HealthStatus {
                healthy: true,
                message: "sqlite store operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                    ("metric_rows".to_string(), rows.to_string()),
                ]),
            },
            Err(e) => {
                warn!("sqlite health probe failed: {e}");
                HealthStatus {
                    healthy: false,
                    message: format!("sqlite unreachable: {e}"),
                    metadata: HashMap::new(),
                }
            }
        };
        Ok(status)
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing sqlite pool");
        self.pool.close().await;
        Ok(())
    }
}
