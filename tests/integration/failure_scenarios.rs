//! Storage failures never stop the pipeline

use std::sync::Arc;
use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use hostwatch::SignalKind;
use hostwatch::actors::hub::HubHandle;
use hostwatch::actors::scheduler::ScheduledJob;
use hostwatch::alerts::{AlertEvaluator, AlertEvent};
use hostwatch::storage::StorageBackend;

use crate::helpers::{FlakyBackend, default_thresholds, drain, metrics_job, record, subscribe};

#[tokio::test]
async fn test_failed_lookup_skips_the_cycle() {
    let store = Arc::new(FlakyBackend::new());
    let evaluator = AlertEvaluator::new(store.clone(), default_thresholds());

    store.fail_lookups.store(true, Ordering::SeqCst);
    assert!(evaluator.evaluate(&record(95.0)).await.is_empty());
    assert!(store.inner().list_alerts(None, 10).await.unwrap().is_empty());

    // decided again once the state is readable
    store.fail_lookups.store(false, Ordering::SeqCst);
    let events = evaluator.evaluate(&record(95.0)).await;
    assert_eq!(events.len(), 1);
    assert_matches!(&events[0], AlertEvent::Raised(alert) if alert.kind == SignalKind::Cpu);
}

#[tokio::test]
async fn test_failed_write_keeps_the_decision() {
    let store = Arc::new(FlakyBackend::new());
    let evaluator = AlertEvaluator::new(store.clone(), default_thresholds());

    store.fail_writes.store(true, Ordering::SeqCst);
    let events = evaluator.evaluate(&record(95.0)).await;

    assert_eq!(events.len(), 1);
    assert_matches!(&events[0], AlertEvent::Raised(alert) => {
        assert_eq!(alert.id, None);
        assert_eq!(alert.current_value, 95.0);
    });
}

#[tokio::test]
async fn test_metrics_job_publishes_when_store_is_down() {
    let store = Arc::new(FlakyBackend::new());
    store.fail_writes.store(true, Ordering::SeqCst);

    let hub = HubHandle::spawn();
    let mut rx = subscribe(&hub, 16).await;

    let shared: Arc<dyn StorageBackend> = store.clone();
    let mut job = metrics_job(&[50.0], shared, hub.clone());
    job.run().await;
    hub.subscriber_count().await.unwrap();

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "system_metrics");
    assert!(store.inner().latest_metric().await.unwrap().is_none());
}

#[tokio::test]
async fn test_exhausted_sensor_reports_zero() {
    let store = Arc::new(FlakyBackend::new());
    let hub = HubHandle::spawn();
    let mut rx = subscribe(&hub, 16).await;

    let shared: Arc<dyn StorageBackend> = store.clone();
    let mut job = metrics_job(&[], shared, hub.clone());
    job.run().await;
    hub.subscriber_count().await.unwrap();

    let messages = drain(&mut rx);
    assert_eq!(messages[0]["data"]["cpu"], 0.0);
    assert_eq!(messages[0]["data"]["memory"], 40.0);
    assert_eq!(messages[0]["data"]["disk"], 30.0);
}
