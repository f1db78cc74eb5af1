//! The pipeline on top of SQLite, across restarts

use std::sync::Arc;

use hostwatch::actors::hub::HubHandle;
use hostwatch::actors::jobs::RetentionJob;
use hostwatch::actors::scheduler::ScheduledJob;
use hostwatch::alerts::AlertEvaluator;
use hostwatch::config::StorageConfig;
use hostwatch::storage::{self, QueryRange, StorageBackend, StorageError, sqlite::SqliteBackend};
use hostwatch::{AlertStatus, LogLevel, SignalKind};
use tempfile::tempdir;

use crate::helpers::{default_thresholds, metrics_job, record};

#[tokio::test]
async fn test_pipeline_state_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("monitor.db");

    {
        let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let mut job = metrics_job(&[70.0, 85.0, 90.0], store.clone(), HubHandle::spawn());
        for _ in 0..3 {
            job.run().await;
        }
        store.close().await.unwrap();
    }

    let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());

    let active = store.find_active_alert(SignalKind::Cpu).await.unwrap().unwrap();
    assert_eq!(active.current_value, 90.0);
    assert_eq!(store.query_metrics(QueryRange::last_hours(1)).await.unwrap().len(), 3);

    // a restarted pipeline resolves the alert raised before the restart
    let mut job = metrics_job(&[60.0], store.clone(), HubHandle::spawn());
    job.run().await;

    let alerts = store.list_alerts(None, 10).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, active.id);
    assert_eq!(alerts[0].status, AlertStatus::Resolved);

    let logs = store.latest_logs(None, 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].level, LogLevel::Info);
    assert_eq!(logs[1].level, LogLevel::Warning);
}

#[tokio::test]
async fn test_second_active_alert_is_rejected() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteBackend::new(dir.path().join("monitor.db")).await.unwrap());

    let evaluator = AlertEvaluator::new(store.clone(), default_thresholds());
    let events = evaluator.evaluate(&record(95.0)).await;
    assert_eq!(events.len(), 1);

    let mut duplicate = events[0].alert().clone();
    duplicate.id = None;
    let result = store.insert_alert(&duplicate).await;
    assert!(matches!(result, Err(StorageError::Conflict(_))));
    assert_eq!(
        store
            .list_alerts(Some(AlertStatus::Active), 10)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_connect_from_config_and_retention() {
    let dir = tempdir().unwrap();
    let config = StorageConfig::Sqlite {
        path: dir.path().join("monitor.db"),
    };
    let store = storage::connect(&config).await.unwrap();

    let mut old = record(10.0);
    old.timestamp = chrono::Utc::now() - chrono::Duration::hours(48);
    store.insert_metric(&old).await.unwrap();
    store.insert_metric(&record(20.0)).await.unwrap();

    RetentionJob::new(store.clone(), 24).run().await;

    let remaining = store
        .query_metrics(QueryRange {
            start: chrono::Utc::now() - chrono::Duration::days(7),
            end: chrono::Utc::now(),
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].cpu_percent, 20.0);
}
