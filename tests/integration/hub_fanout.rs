//! Fan-out behaviour of the hub under many and misbehaving subscribers

use std::time::Duration;

use hostwatch::actors::hub::HubHandle;
use hostwatch::actors::messages::BroadcastMessage;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::helpers::{drain, record, subscribe};

#[tokio::test]
async fn test_every_subscriber_sees_publish_order() {
    let hub = HubHandle::spawn();

    let mut receivers = Vec::new();
    for _ in 0..10 {
        receivers.push(subscribe(&hub, 64).await);
    }

    for cpu in 0..20 {
        hub.publish(BroadcastMessage::SystemMetrics(record(cpu as f64)));
    }
    hub.subscriber_count().await.unwrap();

    for rx in &mut receivers {
        let values: Vec<_> = drain(rx)
            .iter()
            .map(|m| m["data"]["cpu"].as_f64().unwrap())
            .collect();
        assert_eq!(values, (0..20).map(|c| c as f64).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_stalled_subscriber_does_not_block_others() {
    let hub = HubHandle::spawn();

    // never read from
    let _stalled = subscribe(&hub, 2).await;
    let mut live = subscribe(&hub, 256).await;

    let reader = tokio::spawn(async move {
        let mut seen = 0;
        while seen < 100 {
            match live.recv().await {
                Some(_) => seen += 1,
                None => break,
            }
        }
        seen
    });

    for cpu in 0..100 {
        hub.publish(BroadcastMessage::SystemMetrics(record(cpu as f64)));
    }

    let seen = timeout(Duration::from_secs(5), reader).await.unwrap().unwrap();
    assert_eq!(seen, 100);
    assert_eq!(hub.subscriber_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_register_and_unregister() {
    let hub = HubHandle::spawn();

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let hub = hub.clone();
            tokio::spawn(async move {
                let id = hub.next_id();
                let (tx, rx) = mpsc::channel(4);
                hub.register(id, tx).unwrap();
                if i % 2 == 0 {
                    hub.unregister(id);
                }
                rx
            })
        })
        .collect();

    let mut receivers = Vec::new();
    for task in tasks {
        receivers.push(task.await.unwrap());
    }

    assert_eq!(hub.subscriber_count().await.unwrap(), 25);
}
