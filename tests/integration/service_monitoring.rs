//! Service checks against live local targets

use std::sync::Arc;

use hostwatch::actors::hub::HubHandle;
use hostwatch::actors::jobs::ServiceCheckJob;
use hostwatch::actors::scheduler::ScheduledJob;
use hostwatch::monitors::service::{ServiceConfig, ServiceKind, ServiceMonitor};
use hostwatch::storage::{MemoryBackend, StorageBackend};
use hostwatch::{LogCategory, LogLevel, ServiceState};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{drain, subscribe};

fn http_service(name: &str, server: &MockServer) -> ServiceConfig {
    let address = server.address();
    ServiceConfig {
        name: name.to_string(),
        host: address.ip().to_string(),
        port: address.port(),
        kind: ServiceKind::Http {
            protocol: "http".to_string(),
        },
    }
}

/// A port nothing listens on
async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_http_service_running() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;

    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let monitor = ServiceMonitor::new(vec![http_service("web", &server)], store.clone()).unwrap();

    let statuses = monitor.check_all().await;

    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].name, "web");
    assert_eq!(statuses[0].status, ServiceState::Running);

    let logs = store.latest_logs(None, 10).await.unwrap();
    assert_eq!(logs[0].category, LogCategory::Service);
    assert_eq!(logs[0].level, LogLevel::Info);
}

#[tokio::test]
async fn test_http_server_error_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let monitor = ServiceMonitor::new(vec![http_service("api", &server)], store).unwrap();

    let outcome = monitor.check(&monitor.services()[0]).await;
    assert_eq!(outcome.state, ServiceState::Error);
    assert!(outcome.failure.is_none());
}

#[tokio::test]
async fn test_unreachable_tcp_service_is_error() {
    let port = closed_port().await;
    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let monitor = ServiceMonitor::new(
        vec![ServiceConfig {
            name: "db".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            kind: ServiceKind::Tcp,
        }],
        store.clone(),
    )
    .unwrap();

    let statuses = monitor.check_all().await;

    assert_eq!(statuses[0].status, ServiceState::Error);
    assert_eq!(statuses[0].response_ms, 0);
    let logs = store.latest_logs(Some(LogLevel::Error), 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].message.starts_with("db unreachable"));
}

#[tokio::test]
async fn test_repeated_checks_upsert_by_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let monitor = ServiceMonitor::new(vec![http_service("web", &server)], store.clone()).unwrap();

    monitor.check_all().await;
    monitor.check_all().await;

    assert_eq!(store.list_service_statuses().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_service_job_publishes_status_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let hub = HubHandle::spawn();
    let mut rx = subscribe(&hub, 8).await;

    let monitor = ServiceMonitor::new(
        vec![http_service("a", &server), http_service("b", &server)],
        store,
    )
    .unwrap();
    ServiceCheckJob::new(monitor, hub.clone()).run().await;
    hub.subscriber_count().await.unwrap();

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "service_status");
    let names: Vec<_> = messages[0]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}
