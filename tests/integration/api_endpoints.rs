//! Integration tests for the HTTP API and the WebSocket endpoint

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hostwatch::actors::hub::HubHandle;
use hostwatch::actors::messages::BroadcastMessage;
use hostwatch::api::websocket::SocketTimings;
use hostwatch::api::{ApiConfig, ApiState, spawn_api_server};
use hostwatch::storage::{MemoryBackend, StorageBackend};
use hostwatch::{
    AlertState, AlertStatus, DiskUsageRecord, LogCategory, LogLevel, SignalKind, SystemLogRecord,
};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::helpers::{drain, record, subscribe};

const TOKEN: &str = "test-token";

struct TestApi {
    addr: SocketAddr,
    store: Arc<dyn StorageBackend>,
    hub: HubHandle,
    client: reqwest::Client,
}

impl TestApi {
    async fn spawn(auth_token: Option<&str>) -> Self {
        Self::spawn_with_timings(auth_token, SocketTimings::default()).await
    }

    async fn spawn_with_timings(auth_token: Option<&str>, timings: SocketTimings) -> Self {
        let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let hub = HubHandle::spawn();

        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            auth_token: auth_token.map(str::to_string),
            enable_cors: true,
        };
        let state = ApiState::new(store.clone(), hub.clone()).with_socket_timings(timings);
        let addr = spawn_api_server(config, state).await.unwrap();

        Self {
            addr,
            store,
            hub,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap();
        decode(response).await
    }

    async fn wait_for_subscribers(&self, expected: usize) {
        for _ in 0..100 {
            if self.hub.subscriber_count().await.unwrap() == expected {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("hub never reached {expected} subscribers");
    }
}

async fn decode(response: reqwest::Response) -> (StatusCode, Value) {
    let status = response.status();
    let text = response.text().await.unwrap();
    let body = serde_json::from_str(&text).unwrap_or(Value::Null);
    (status, body)
}

fn active_alert(kind: SignalKind, value: f64) -> AlertState {
    let now = chrono::Utc::now();
    AlertState {
        id: None,
        kind,
        level: LogLevel::Warning,
        message: format!("{} too high: {value:.2}%", kind.label()),
        current_value: value,
        threshold: 80.0,
        status: AlertStatus::Active,
        triggered_at: now,
        updated_at: now,
        resolved_at: None,
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let api = TestApi::spawn(Some(TOKEN)).await;

    for path in ["/health", "/api/v1/health"] {
        let response = api.client.get(api.url(path)).send().await.unwrap();
        let (status, body) = decode(response).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], true);
        assert_eq!(body["subscribers"], 0);
    }
}

#[tokio::test]
async fn test_auth_required_on_api_routes() {
    let api = TestApi::spawn(Some(TOKEN)).await;

    let missing = api.client.get(api.url("/api/v1/alerts")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = api
        .client
        .get(api.url("/api/v1/alerts"))
        .bearer_auth("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let (status, _) = api.get("/api/v1/alerts").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoints() {
    let api = TestApi::spawn(Some(TOKEN)).await;

    let (status, body) = api.get("/api/v1/metrics/current").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    api.store.insert_metric(&record(12.5)).await.unwrap();
    api.store.insert_metric(&record(42.0)).await.unwrap();

    let (status, body) = api.get("/api/v1/metrics/current").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cpu"], 42.0);

    let (status, body) = api.get("/api/v1/metrics?hours=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hours"], 2);
    assert_eq!(body["count"], 2);
    assert_eq!(body["metrics"][0]["cpu"], 12.5);

    let (status, _) = api.get("/api/v1/metrics?hours=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_alert_listing_and_manual_resolve() {
    let api = TestApi::spawn(Some(TOKEN)).await;
    let mut rx = subscribe(&api.hub, 8).await;

    let id = api
        .store
        .insert_alert(&active_alert(SignalKind::Memory, 91.0))
        .await
        .unwrap();

    let (status, body) = api.get("/api/v1/alerts?status=active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["alerts"][0]["type"], "memory");

    let (status, _) = api.get("/api/v1/alerts?status=sleeping").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let resolve_url = api.url(&format!("/api/v1/alerts/{id}/resolve"));
    let response = api
        .client
        .put(&resolve_url)
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let (status, body) = decode(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "resolved");

    api.hub.subscriber_count().await.unwrap();
    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "alert");
    assert_eq!(messages[0]["data"]["status"], "resolved");

    // already resolved
    let again = api
        .client
        .put(&resolve_url)
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let (_, body) = api.get("/api/v1/alerts?status=active").await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_log_create_and_filter() {
    let api = TestApi::spawn(Some(TOKEN)).await;

    let response = api
        .client
        .post(api.url("/api/v1/logs"))
        .bearer_auth(TOKEN)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(r#"{"level":"warning","category":"security","message":"failed login"}"#)
        .send()
        .await
        .unwrap();
    let (status, body) = decode(response).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["id"].is_i64());

    let response = api
        .client
        .post(api.url("/api/v1/logs"))
        .bearer_auth(TOKEN)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(r#"{"message":"backup finished"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let (_, body) = api.get("/api/v1/logs?level=warning").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["logs"][0]["category"], "security");

    let (_, body) = api.get("/api/v1/logs?level=&limit=10").await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["logs"][0]["message"], "backup finished");

    let (status, _) = api.get("/api/v1/logs?level=loud").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_snapshot_endpoints() {
    let api = TestApi::spawn(None).await;

    api.store
        .insert_disk_usage(&[DiskUsageRecord {
            path: "/".to_string(),
            name: "sda1".to_string(),
            total_gb: 100,
            used_gb: 40,
            free_gb: 60,
            usage_percent: 40.0,
            timestamp: chrono::Utc::now(),
        }])
        .await
        .unwrap();

    let (status, body) = api.get("/api/v1/disk").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["partitions"][0]["path"], "/");

    let (status, body) = api.get("/api/v1/network").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["interfaces"], serde_json::json!([]));

    let (status, body) = api.get("/api/v1/services").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_dashboard_snapshot() {
    let api = TestApi::spawn(Some(TOKEN)).await;

    let (status, body) = api.get("/api/v1/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_metrics"], Value::Null);
    assert_eq!(body["historical_data"], serde_json::json!([]));

    api.store.insert_metric(&record(20.0)).await.unwrap();
    api.store.insert_metric(&record(30.0)).await.unwrap();
    api.store
        .insert_alert(&active_alert(SignalKind::Cpu, 95.0))
        .await
        .unwrap();
    for i in 0..12 {
        api.store
            .insert_log(&SystemLogRecord::new(
                LogLevel::Info,
                LogCategory::System,
                format!("entry {i}"),
            ))
            .await
            .unwrap();
    }

    let (status, body) = api.get("/api/v1/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_metrics"]["cpu"], 30.0);
    assert_eq!(body["historical_data"].as_array().unwrap().len(), 2);
    assert_eq!(body["historical_data"][0]["cpu"], 20.0);
    assert_eq!(body["active_alerts"][0]["type"], "cpu");
    assert_eq!(body["recent_logs"].as_array().unwrap().len(), 10);
    assert_eq!(body["recent_logs"][0]["message"], "entry 11");
    assert_eq!(body["services"], serde_json::json!([]));

    let unauthorized = api
        .client
        .get(api.url("/api/v1/dashboard"))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_websocket_ping_and_stream() {
    let api = TestApi::spawn(None).await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", api.addr)).await.unwrap();
    api.wait_for_subscribers(1).await;

    ws.send(Message::Text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();
    let reply = next_text(&mut ws).await;
    assert_eq!(reply["type"], "pong");

    // unknown control messages are ignored
    ws.send(Message::Text(r#"{"type":"shout"}"#.to_string()))
        .await
        .unwrap();

    api.hub
        .publish(BroadcastMessage::SystemMetrics(record(33.0)));
    let message = next_text(&mut ws).await;
    assert_eq!(message["type"], "system_metrics");
    assert_eq!(message["data"]["cpu"], 33.0);

    ws.close(None).await.unwrap();
    api.wait_for_subscribers(0).await;
}

#[tokio::test]
async fn test_websocket_oversized_message_disconnects() {
    let api = TestApi::spawn(None).await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", api.addr)).await.unwrap();
    api.wait_for_subscribers(1).await;

    let oversized = format!(r#"{{"type":"ping","padding":"{}"}}"#, "x".repeat(1024));
    let _ = ws.send(Message::Text(oversized)).await;

    loop {
        match timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
            Some(Ok(_)) => continue,
        }
    }

    api.wait_for_subscribers(0).await;
}

#[tokio::test]
async fn test_hub_shutdown_closes_websocket() {
    let api = TestApi::spawn(None).await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", api.addr)).await.unwrap();
    api.wait_for_subscribers(1).await;

    api.hub.shutdown();

    loop {
        match timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
            Some(Ok(_)) => continue,
        }
    }
}

#[tokio::test]
async fn test_silent_websocket_client_is_dropped() {
    let api = TestApi::spawn_with_timings(
        None,
        SocketTimings {
            read_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_secs(1),
            ping_period: Duration::from_secs(30),
        },
    )
    .await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", api.addr)).await.unwrap();
    api.wait_for_subscribers(1).await;

    // sends nothing, so the server gives up after the read timeout
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
            Some(Ok(_)) => continue,
        }
    }

    api.wait_for_subscribers(0).await;
}

#[tokio::test]
async fn test_keepalive_pings_hold_connection_open() {
    let api = TestApi::spawn_with_timings(
        None,
        SocketTimings {
            read_timeout: Duration::from_millis(400),
            write_timeout: Duration::from_secs(1),
            ping_period: Duration::from_millis(100),
        },
    )
    .await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", api.addr)).await.unwrap();
    api.wait_for_subscribers(1).await;

    // reading lets the client answer each ping with a pong, which counts as traffic
    let mut pings = 0;
    while pings < 8 {
        match timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            Some(Ok(Message::Ping(_))) => pings += 1,
            Some(Ok(_)) => continue,
            other => panic!("connection ended after {pings} pings: {other:?}"),
        }
    }

    // eight pings span twice the read timeout
    assert_eq!(api.hub.subscriber_count().await.unwrap(), 1);
    ws.close(None).await.unwrap();
}

async fn next_text<S>(ws: &mut S) -> Value
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}
