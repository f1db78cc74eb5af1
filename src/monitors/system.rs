//! Local host sampling
//!
//! `MetricCollector` turns one look at the operating system into a
//! `MetricRecord`. The OS is reached through the `SystemProbe` trait;
//! `SysinfoProbe` is the production implementation.
//!
//! ## Message Flow
//!
//! ```text
//! SystemProbe ──> cpu / memory / partitions / counters
//!                    │
//!                    ├──> RateSampler ──> upload / download MB/s
//!                    ▼
//!               MetricRecord ──> StorageBackend
//! ```
//!
//! Collection never fails. A sensor that errors is logged and its field is
//! reported as 0.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sysinfo::{Disks, MINIMUM_CPU_UPDATE_INTERVAL, Networks, System};
use tracing::{debug, error, instrument, trace, warn};

use super::rate::{CounterSample, NetworkRates, RateError, RateSampler, by_interface};
use crate::storage::StorageBackend;
use crate::util::{BYTES_PER_GB, round2};
use crate::{DiskUsageRecord, MetricRecord, NetworkTrafficRecord};

/// A sensor could not be read
#[derive(Debug, Clone, PartialEq)]
pub enum SensorError {
    /// The OS reported nothing usable for this sensor
    Unavailable(String),

    /// The requested partition is not mounted (anymore)
    UnknownPartition(String),
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Unavailable(what) => write!(f, "sensor unavailable: {what}"),
            SensorError::UnknownPartition(path) => write!(f, "unknown partition: {path}"),
        }
    }
}

impl std::error::Error for SensorError {}

/// A mounted partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub mount_point: String,
    pub device: String,
}

/// Space accounting of one partition in bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub used_percent: f64,
}

impl PartitionUsage {
    pub fn from_space(total_bytes: u64, free_bytes: u64) -> Self {
        let used_bytes = total_bytes.saturating_sub(free_bytes);
        let used_percent = if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / total_bytes as f64 * 100.0
        };

        Self {
            total_bytes,
            used_bytes,
            free_bytes,
            used_percent,
        }
    }
}

/// Source of raw host measurements
pub trait SystemProbe: Send + Sync {
    fn cpu_percent(&mut self) -> Result<f64, SensorError>;

    fn memory_percent(&mut self) -> Result<f64, SensorError>;

    fn partitions(&mut self) -> Result<Vec<Partition>, SensorError>;

    fn partition_usage(&mut self, partition: &Partition) -> Result<PartitionUsage, SensorError>;

    /// Cumulative byte counters of every network interface
    fn network_counters(&mut self) -> Result<Vec<CounterSample>, SensorError>;
}

/// Creates one probe per job that samples the host
pub type ProbeFactory = Arc<dyn Fn() -> Box<dyn SystemProbe> + Send + Sync>;

/// Factory for the production probe
pub fn sysinfo_probe_factory() -> ProbeFactory {
    Arc::new(|| Box::new(SysinfoProbe::new()) as Box<dyn SystemProbe>)
}

/// `SystemProbe` backed by the `sysinfo` crate
pub struct SysinfoProbe {
    system: System,
    disks: Disks,
    networks: Networks,
    cpu_refreshed_at: Instant,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // cpu usage is a delta between refreshes, prime the baseline
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            cpu_refreshed_at: Instant::now(),
        }
    }
}

/// How much longer to wait before a cpu refresh yields a usable delta
fn cpu_settle_time(since_last_refresh: Duration) -> Duration {
    MINIMUM_CPU_UPDATE_INTERVAL.saturating_sub(since_last_refresh)
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    fn cpu_percent(&mut self) -> Result<f64, SensorError> {
        // the first tick fires right after construction; a shorter delta reads as noise
        let settle = cpu_settle_time(self.cpu_refreshed_at.elapsed());
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        self.system.refresh_cpu_usage();
        self.cpu_refreshed_at = Instant::now();
        if self.system.cpus().is_empty() {
            return Err(SensorError::Unavailable("no cpus reported".to_string()));
        }
        Ok(self.system.global_cpu_usage() as f64)
    }

    fn memory_percent(&mut self) -> Result<f64, SensorError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(SensorError::Unavailable("total memory is 0".to_string()));
        }
        Ok(self.system.used_memory() as f64 / total as f64 * 100.0)
    }

    fn partitions(&mut self) -> Result<Vec<Partition>, SensorError> {
        self.disks.refresh(true);

        let partitions: Vec<Partition> = self
            .disks
            .list()
            .iter()
            .map(|disk| Partition {
                mount_point: disk.mount_point().to_string_lossy().to_string(),
                device: disk.name().to_string_lossy().to_string(),
            })
            .collect();

        if partitions.is_empty() {
            return Err(SensorError::Unavailable("no partitions found".to_string()));
        }
        Ok(partitions)
    }

    fn partition_usage(&mut self, partition: &Partition) -> Result<PartitionUsage, SensorError> {
        let disk = self
            .disks
            .list()
            .iter()
            .find(|disk| disk.mount_point().to_string_lossy() == partition.mount_point)
            .ok_or_else(|| SensorError::UnknownPartition(partition.mount_point.clone()))?;

        let total = disk.total_space();
        if total == 0 {
            return Err(SensorError::Unavailable(format!(
                "{} reports no capacity",
                partition.mount_point
            )));
        }
        Ok(PartitionUsage::from_space(total, disk.available_space()))
    }

    fn network_counters(&mut self) -> Result<Vec<CounterSample>, SensorError> {
        self.networks.refresh(true);
        let captured_at = Utc::now();

        Ok(self
            .networks
            .iter()
            .map(|(name, data)| CounterSample {
                interface: name.clone(),
                sent_bytes: data.total_transmitted(),
                received_bytes: data.total_received(),
                captured_at,
            })
            .collect())
    }
}

/// Builds metric, disk and traffic records from a probe
///
/// Every job that samples the host owns its own collector, so each keeps a
/// private `RateSampler` baseline.
pub struct MetricCollector {
    probe: Box<dyn SystemProbe>,
    store: Arc<dyn StorageBackend>,
    rates: RateSampler,
    last_rates: NetworkRates,
}

impl MetricCollector {
    pub fn new(probe: Box<dyn SystemProbe>, store: Arc<dyn StorageBackend>) -> Self {
        Self {
            probe,
            store,
            rates: RateSampler::new(),
            last_rates: NetworkRates::default(),
        }
    }

    /// Draw one snapshot of host load
    #[instrument(skip(self))]
    pub fn collect(&mut self) -> MetricRecord {
        let cpu = self.probe.cpu_percent().unwrap_or_else(|e| {
            warn!("failed to read cpu usage: {e}");
            0.0
        });

        let memory = self.probe.memory_percent().unwrap_or_else(|e| {
            warn!("failed to read memory usage: {e}");
            0.0
        });

        let disk = self.average_disk_percent();

        let rates = match self.probe.network_counters() {
            Ok(samples) => self.derive_rates(samples),
            Err(e) => {
                warn!("failed to read network counters: {e}");
                NetworkRates::default()
            }
        };

        let record = MetricRecord {
            timestamp: Utc::now(),
            cpu_percent: round2(cpu),
            memory_percent: round2(memory),
            disk_percent: round2(disk),
            upload_rate: round2(rates.upload_total),
            download_rate: round2(rates.download_total),
        };

        trace!(?record, "collected metrics");
        record
    }

    /// Persist a record; failures are logged
    pub async fn save(&self, record: &MetricRecord) {
        if let Err(e) = self.store.insert_metric(record).await {
            error!("failed to save metrics: {e}");
        }
    }

    /// Usage of every readable partition
    #[instrument(skip(self))]
    pub fn collect_disk_usage(&mut self) -> Vec<DiskUsageRecord> {
        let partitions = match self.probe.partitions() {
            Ok(partitions) => partitions,
            Err(e) => {
                warn!("failed to list partitions: {e}");
                return Vec::new();
            }
        };

        let timestamp = Utc::now();
        partitions
            .iter()
            .filter_map(|partition| match self.probe.partition_usage(partition) {
                Ok(usage) => Some(DiskUsageRecord {
                    path: partition.mount_point.clone(),
                    name: partition.device.clone(),
                    total_gb: usage.total_bytes / BYTES_PER_GB,
                    used_gb: usage.used_bytes / BYTES_PER_GB,
                    free_gb: usage.free_bytes / BYTES_PER_GB,
                    usage_percent: round2(usage.used_percent),
                    timestamp,
                }),
                Err(e) => {
                    debug!("skipping partition {}: {e}", partition.mount_point);
                    None
                }
            })
            .collect()
    }

    pub async fn save_disk_usage(&self, records: &[DiskUsageRecord]) {
        if let Err(e) = self.store.insert_disk_usage(records).await {
            error!("failed to save disk usage: {e}");
        }
    }

    /// Counters and speeds of every interface
    #[instrument(skip(self))]
    pub fn collect_network_traffic(&mut self) -> Vec<NetworkTrafficRecord> {
        let samples = match self.probe.network_counters() {
            Ok(samples) => samples,
            Err(e) => {
                warn!("failed to read network counters: {e}");
                return Vec::new();
            }
        };

        let timestamp = Utc::now();
        let counters: Vec<(String, u64, u64)> = samples
            .iter()
            .map(|s| (s.interface.clone(), s.sent_bytes, s.received_bytes))
            .collect();
        let rates = self.derive_rates(samples);

        counters
            .into_iter()
            .map(|(interface, sent, received)| {
                let speed = rates
                    .per_interface
                    .get(&interface)
                    .copied()
                    .unwrap_or_default();
                NetworkTrafficRecord {
                    interface,
                    upload_bytes: sent,
                    download_bytes: received,
                    upload_speed: speed.upload,
                    download_speed: speed.download,
                    timestamp,
                }
            })
            .collect()
    }

    pub async fn save_network_traffic(&self, records: &[NetworkTrafficRecord]) {
        if let Err(e) = self.store.insert_network_traffic(records).await {
            error!("failed to save network traffic: {e}");
        }
    }

    fn average_disk_percent(&mut self) -> f64 {
        let partitions = match self.probe.partitions() {
            Ok(partitions) => partitions,
            Err(e) => {
                warn!("failed to list partitions: {e}");
                return 0.0;
            }
        };

        let readings: Vec<f64> = partitions
            .iter()
            .filter_map(|partition| match self.probe.partition_usage(partition) {
                Ok(usage) => Some(usage.used_percent),
                Err(e) => {
                    debug!("skipping partition {}: {e}", partition.mount_point);
                    None
                }
            })
            .collect();

        if readings.is_empty() {
            warn!("no readable partitions, reporting disk usage as 0");
            return 0.0;
        }
        readings.iter().sum::<f64>() / readings.len() as f64
    }

    fn derive_rates(&mut self, samples: Vec<CounterSample>) -> NetworkRates {
        let current: HashMap<String, CounterSample> = by_interface(samples);

        match self.rates.sample(current) {
            Ok(rates) => {
                self.last_rates = rates.clone();
                rates
            }
            Err(e @ RateError::DegenerateInterval { .. }) => {
                debug!("{e}, reusing previous rates");
                self.last_rates.clone()
            }
        }
    }
}
