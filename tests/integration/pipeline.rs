//! End-to-end runs of the metrics job: collect, persist, evaluate, publish

use std::sync::Arc;

use hostwatch::actors::hub::HubHandle;
use hostwatch::actors::scheduler::ScheduledJob;
use hostwatch::storage::{MemoryBackend, StorageBackend};
use hostwatch::{AlertStatus, SignalKind};
use pretty_assertions::assert_eq;

use crate::helpers::{drain, metrics_job, subscribe};

#[tokio::test]
async fn test_cpu_series_raises_and_resolves_once() {
    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let hub = HubHandle::spawn();
    let mut rx = subscribe(&hub, 64).await;

    let mut job = metrics_job(&[70.0, 85.0, 90.0, 75.0], store.clone(), hub.clone());
    for _ in 0..4 {
        job.run().await;
    }
    // flush the hub queue
    hub.subscriber_count().await.unwrap();

    let messages = drain(&mut rx);
    let metrics: Vec<_> = messages
        .iter()
        .filter(|m| m["type"] == "system_metrics")
        .map(|m| m["data"]["cpu"].as_f64().unwrap())
        .collect();
    assert_eq!(metrics, vec![70.0, 85.0, 90.0, 75.0]);

    let alerts: Vec<_> = messages.iter().filter(|m| m["type"] == "alert").collect();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0]["data"]["status"], "active");
    assert_eq!(alerts[0]["data"]["value"], 85.0);
    assert_eq!(alerts[1]["data"]["status"], "resolved");
    assert_eq!(alerts[1]["data"]["value"], 75.0);
    assert_eq!(alerts[0]["data"]["id"], alerts[1]["data"]["id"]);

    let stored = store.list_alerts(None, 10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, SignalKind::Cpu);
    assert_eq!(stored[0].status, AlertStatus::Resolved);

    assert_eq!(
        store
            .query_metrics(hostwatch::storage::QueryRange::last_hours(1))
            .await
            .unwrap()
            .len(),
        4
    );
}

#[tokio::test]
async fn test_sustained_overload_keeps_one_active_alert() {
    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let hub = HubHandle::spawn();
    let mut rx = subscribe(&hub, 64).await;

    let mut job = metrics_job(&[81.0, 95.0, 99.0, 88.0, 97.0], store.clone(), hub.clone());
    for _ in 0..5 {
        job.run().await;
    }
    hub.subscriber_count().await.unwrap();

    let alerts: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|m| m["type"] == "alert")
        .collect();
    assert_eq!(alerts.len(), 1);

    let active = store.find_active_alert(SignalKind::Cpu).await.unwrap().unwrap();
    assert_eq!(active.current_value, 97.0);
    assert_eq!(active.message, "CPU usage too high: 97.00%");
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
async fn test_oscillation_around_threshold_flaps() {
    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let hub = HubHandle::spawn();
    let mut rx = subscribe(&hub, 64).await;

    let mut job = metrics_job(&[81.0, 79.0, 81.0, 79.0], store.clone(), hub.clone());
    for _ in 0..4 {
        job.run().await;
    }
    hub.subscriber_count().await.unwrap();

    let statuses: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|m| m["type"] == "alert")
        .map(|m| m["data"]["status"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["active", "resolved", "active", "resolved"]);
    assert_eq!(store.list_alerts(None, 10).await.unwrap().len(), 2);
}
