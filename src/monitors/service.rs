//! Reachability checks for configured TCP and HTTP services
//!
//! ## Message Flow
//!
//! ```text
//! ServiceConfig ──> connect / GET ──> classify latency ──> ServiceStatusRecord
//!                                                            │
//!                                   upsert by name + log row ┘
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, instrument, trace, warn};

use crate::storage::StorageBackend;
use crate::{LogCategory, LogLevel, ServiceState, ServiceStatusRecord, SystemLogRecord};

const TCP_TIMEOUT: Duration = Duration::from_secs(5);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A service target from the configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,

    #[serde(flatten)]
    pub kind: ServiceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceKind {
    Tcp,
    Http {
        #[serde(default = "default_protocol")]
        protocol: String,
    },
}

fn default_protocol() -> String {
    "http".to_string()
}

/// Verdict for a TCP connect that took `latency`
pub fn classify_tcp(latency: Duration) -> ServiceState {
    match latency.as_millis() {
        0..100 => ServiceState::Running,
        100..500 => ServiceState::Warning,
        _ => ServiceState::Error,
    }
}

/// Verdict for an HTTP response with `status` that took `latency`
pub fn classify_http(status: u16, latency: Duration) -> ServiceState {
    if !(200..400).contains(&status) {
        return ServiceState::Error;
    }

    match latency.as_millis() {
        0..200 => ServiceState::Running,
        200..1000 => ServiceState::Warning,
        _ => ServiceState::Error,
    }
}

/// Result of probing one service before it is persisted
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub state: ServiceState,
    pub response_ms: u64,
    /// Set when the service could not be reached at all
    pub failure: Option<String>,
}

pub struct ServiceMonitor {
    services: Vec<ServiceConfig>,
    client: reqwest::Client,
    store: Arc<dyn StorageBackend>,
}

impl ServiceMonitor {
    pub fn new(services: Vec<ServiceConfig>, store: Arc<dyn StorageBackend>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            services,
            client,
            store,
        })
    }

    pub fn services(&self) -> &[ServiceConfig] {
        &self.services
    }

    /// Check every configured service, persist the results and return the
    /// full stored status list
    #[instrument(skip(self), fields(count = self.services.len()))]
    pub async fn check_all(&self) -> Vec<ServiceStatusRecord> {
        let outcomes = join_all(self.services.iter().map(|service| self.check(service))).await;

        for (service, outcome) in self.services.iter().zip(outcomes) {
            self.record(service, outcome).await;
        }

        match self.store.list_service_statuses().await {
            Ok(statuses) => statuses,
            Err(e) => {
                error!("failed to load service statuses: {e}");
                Vec::new()
            }
        }
    }

    /// Probe one service
    #[instrument(skip(self), fields(service = %service.name))]
    pub async fn check(&self, service: &ServiceConfig) -> CheckOutcome {
        let result = match &service.kind {
            ServiceKind::Tcp => self.check_tcp(service).await,
            ServiceKind::Http { protocol } => self.check_http(service, protocol).await,
        };

        match result {
            Ok((state, latency)) => {
                trace!("{} answered in {:?}", service.name, latency);
                CheckOutcome {
                    state,
                    response_ms: latency.as_millis() as u64,
                    failure: None,
                }
            }
            Err(e) => {
                warn!("service check failed: {:#}", e);
                CheckOutcome {
                    state: ServiceState::Error,
                    response_ms: 0,
                    failure: Some(format!("{:#}", e)),
                }
            }
        }
    }

    async fn check_tcp(&self, service: &ServiceConfig) -> Result<(ServiceState, Duration)> {
        let address = format!("{}:{}", service.host, service.port);
        let start = Instant::now();

        timeout(TCP_TIMEOUT, TcpStream::connect(&address))
            .await
            .with_context(|| format!("connecting to {address} timed out"))?
            .with_context(|| format!("failed to connect to {address}"))?;

        let latency = start.elapsed();
        Ok((classify_tcp(latency), latency))
    }

    async fn check_http(
        &self,
        service: &ServiceConfig,
        protocol: &str,
    ) -> Result<(ServiceState, Duration)> {
        let url = format!("{}://{}:{}", protocol, service.host, service.port);
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let latency = start.elapsed();
        let status = response.status().as_u16();
        debug!("{url} responded with {status}");

        Ok((classify_http(status, latency), latency))
    }

    async fn record(&self, service: &ServiceConfig, outcome: CheckOutcome) {
        let status = ServiceStatusRecord {
            id: None,
            name: service.name.clone(),
            status: outcome.state,
            host: service.host.clone(),
            port: service.port,
            last_check: Utc::now(),
            response_ms: outcome.response_ms,
        };

        if let Err(e) = self.store.upsert_service_status(&status).await {
            error!("failed to save status of {}: {e}", service.name);
        }

        let log = match &outcome.failure {
            Some(reason) => SystemLogRecord::new(
                LogLevel::Error,
                LogCategory::Service,
                format!("{} unreachable: {reason}", service.name),
            ),
            None => SystemLogRecord::new(
                LogLevel::Info,
                LogCategory::Service,
                format!(
                    "{} is {} ({} ms)",
                    service.name, outcome.state, outcome.response_ms
                ),
            ),
        };

        if let Err(e) = self.store.insert_log(&log).await {
            error!("failed to write service log: {e}");
        }
    }
}
