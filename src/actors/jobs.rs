//! The concrete jobs driven by the scheduler and the cadence table wiring them up
//!
//! | job             | cadence                          |
//! |-----------------|----------------------------------|
//! | metrics         | every `monitor.interval` seconds |
//! | service checks  | every 30 s                       |
//! | disk usage      | every 5 min                      |
//! | network traffic | every 30 s                       |
//! | log push        | every 10 s                       |
//! | snapshot        | every 5 s                        |
//! | retention       | daily at `monitor.cleanup_hour`  |

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, trace};

use super::hub::HubHandle;
use super::messages::BroadcastMessage;
use super::scheduler::{Cadence, ScheduledJob, Scheduler};
use crate::alerts::AlertEvaluator;
use crate::config::Config;
use crate::monitors::service::ServiceMonitor;
use crate::monitors::system::{MetricCollector, ProbeFactory};
use crate::monitors::thresholds::Thresholds;
use crate::storage::{RetentionPolicy, StorageBackend};

pub const SERVICE_CHECK_PERIOD: Duration = Duration::from_secs(30);
pub const DISK_USAGE_PERIOD: Duration = Duration::from_secs(5 * 60);
pub const NETWORK_TRAFFIC_PERIOD: Duration = Duration::from_secs(30);
pub const LOG_PUSH_PERIOD: Duration = Duration::from_secs(10);
pub const SNAPSHOT_PERIOD: Duration = Duration::from_secs(5);

/// Number of log rows pushed to subscribers per run
pub const LOG_PUSH_BATCH: usize = 5;

/// Collect a metric record, persist it, evaluate alerts and publish everything
pub struct MetricsJob {
    collector: MetricCollector,
    evaluator: AlertEvaluator,
    hub: HubHandle,
}

impl MetricsJob {
    pub fn new(collector: MetricCollector, evaluator: AlertEvaluator, hub: HubHandle) -> Self {
        Self {
            collector,
            evaluator,
            hub,
        }
    }
}

#[async_trait]
impl ScheduledJob for MetricsJob {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn run(&mut self) {
        let record = self.collector.collect();
        self.collector.save(&record).await;

        let events = self.evaluator.evaluate(&record).await;

        self.hub.publish(BroadcastMessage::SystemMetrics(record));
        for event in events {
            self.hub.publish(BroadcastMessage::Alert(event.into_alert()));
        }
    }
}

/// Probe configured services and publish the status list
pub struct ServiceCheckJob {
    monitor: ServiceMonitor,
    hub: HubHandle,
}

impl ServiceCheckJob {
    pub fn new(monitor: ServiceMonitor, hub: HubHandle) -> Self {
        Self { monitor, hub }
    }
}

#[async_trait]
impl ScheduledJob for ServiceCheckJob {
    fn name(&self) -> &'static str {
        "service_checks"
    }

    async fn run(&mut self) {
        if self.monitor.services().is_empty() {
            trace!("no services configured");
            return;
        }

        let statuses = self.monitor.check_all().await;
        self.hub.publish(BroadcastMessage::ServiceStatus(statuses));
    }
}

pub struct DiskUsageJob {
    collector: MetricCollector,
}

impl DiskUsageJob {
    pub fn new(collector: MetricCollector) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl ScheduledJob for DiskUsageJob {
    fn name(&self) -> &'static str {
        "disk_usage"
    }

    async fn run(&mut self) {
        let records = self.collector.collect_disk_usage();
        debug!("collected usage of {} partitions", records.len());
        self.collector.save_disk_usage(&records).await;
    }
}

pub struct NetworkTrafficJob {
    collector: MetricCollector,
}

impl NetworkTrafficJob {
    pub fn new(collector: MetricCollector) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl ScheduledJob for NetworkTrafficJob {
    fn name(&self) -> &'static str {
        "network_traffic"
    }

    async fn run(&mut self) {
        let records = self.collector.collect_network_traffic();
        debug!("collected traffic of {} interfaces", records.len());
        self.collector.save_network_traffic(&records).await;
    }
}

/// Push the most recent system log rows to subscribers
pub struct LogPushJob {
    store: Arc<dyn StorageBackend>,
    hub: HubHandle,
}

impl LogPushJob {
    pub fn new(store: Arc<dyn StorageBackend>, hub: HubHandle) -> Self {
        Self { store, hub }
    }
}

#[async_trait]
impl ScheduledJob for LogPushJob {
    fn name(&self) -> &'static str {
        "log_push"
    }

    async fn run(&mut self) {
        match self.store.latest_logs(None, LOG_PUSH_BATCH).await {
            Ok(logs) if logs.is_empty() => trace!("no logs to push"),
            Ok(logs) => self.hub.publish(BroadcastMessage::SystemLog(logs)),
            Err(e) => error!("failed to load latest logs: {e}"),
        }
    }
}

/// Re-publish the latest stored metric and the service list
///
/// Subscribers that connected since the last collection get a full picture
/// within one period.
pub struct SnapshotJob {
    store: Arc<dyn StorageBackend>,
    hub: HubHandle,
}

impl SnapshotJob {
    pub fn new(store: Arc<dyn StorageBackend>, hub: HubHandle) -> Self {
        Self { store, hub }
    }
}

#[async_trait]
impl ScheduledJob for SnapshotJob {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn run(&mut self) {
        match self.store.latest_metric().await {
            Ok(Some(record)) => self.hub.publish(BroadcastMessage::SystemMetrics(record)),
            Ok(None) => trace!("no metric stored yet"),
            Err(e) => error!("failed to load latest metric: {e}"),
        }

        match self.store.list_service_statuses().await {
            Ok(services) if services.is_empty() => trace!("no service statuses stored yet"),
            Ok(services) => self.hub.publish(BroadcastMessage::ServiceStatus(services)),
            Err(e) => error!("failed to load service statuses: {e}"),
        }
    }
}

/// Delete rows that fell out of the retention window
pub struct RetentionJob {
    store: Arc<dyn StorageBackend>,
    history_hours: u32,
}

impl RetentionJob {
    pub fn new(store: Arc<dyn StorageBackend>, history_hours: u32) -> Self {
        Self {
            store,
            history_hours,
        }
    }
}

#[async_trait]
impl ScheduledJob for RetentionJob {
    fn name(&self) -> &'static str {
        "retention"
    }

    async fn run(&mut self) {
        let policy = RetentionPolicy::at(Utc::now(), self.history_hours);

        match self.store.cleanup(&policy).await {
            Ok(stats) => info!(
                metrics = stats.metrics,
                disk_usage = stats.disk_usage,
                network_traffic = stats.network_traffic,
                alerts = stats.alerts,
                logs = stats.logs,
                "retention removed {} rows",
                stats.total()
            ),
            Err(e) => error!("retention failed: {e}"),
        }
    }
}

/// Build the full cadence table from the configuration
pub fn build_scheduler(
    config: &Config,
    store: Arc<dyn StorageBackend>,
    hub: HubHandle,
    probes: ProbeFactory,
) -> Result<Scheduler> {
    let monitor = &config.monitor;
    let thresholds = Thresholds::from(monitor);

    let metrics = MetricsJob::new(
        MetricCollector::new(probes(), store.clone()),
        AlertEvaluator::new(store.clone(), thresholds),
        hub.clone(),
    );
    let services = ServiceCheckJob::new(
        ServiceMonitor::new(config.services.clone(), store.clone())?,
        hub.clone(),
    );

    Ok(Scheduler::new()
        .add(Cadence::Every(Duration::from_secs(monitor.interval)), metrics)
        .add(Cadence::Every(SERVICE_CHECK_PERIOD), services)
        .add(
            Cadence::Every(DISK_USAGE_PERIOD),
            DiskUsageJob::new(MetricCollector::new(probes(), store.clone())),
        )
        .add(
            Cadence::Every(NETWORK_TRAFFIC_PERIOD),
            NetworkTrafficJob::new(MetricCollector::new(probes(), store.clone())),
        )
        .add(
            Cadence::Every(LOG_PUSH_PERIOD),
            LogPushJob::new(store.clone(), hub.clone()),
        )
        .add(
            Cadence::Every(SNAPSHOT_PERIOD),
            SnapshotJob::new(store.clone(), hub),
        )
        .add(
            Cadence::daily_at_hour(monitor.cleanup_hour)?,
            RetentionJob::new(store, monitor.history_hours),
        ))
}
