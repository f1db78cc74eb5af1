pub mod actors;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod monitors;
pub mod storage;
pub mod util;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sample of host load, as persisted and broadcast.
///
/// Percentages and rates are rounded to two decimals by the collector; the
/// serialized field names are the ones subscribers already consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "cpu")]
    pub cpu_percent: f64,

    #[serde(rename = "memory")]
    pub memory_percent: f64,

    #[serde(rename = "disk")]
    pub disk_percent: f64,

    /// Upload rate in MB/s
    #[serde(rename = "upload")]
    pub upload_rate: f64,

    /// Download rate in MB/s
    #[serde(rename = "download")]
    pub download_rate: f64,
}

impl MetricRecord {
    /// Value of the signal an alert threshold applies to
    pub fn value_of(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Cpu => self.cpu_percent,
            SignalKind::Memory => self.memory_percent,
            SignalKind::Disk => self.disk_percent,
        }
    }
}

/// Category of monitored metric with its own threshold and alert lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Cpu,
    Memory,
    Disk,
}

impl SignalKind {
    pub const ALL: [SignalKind; 3] = [SignalKind::Cpu, SignalKind::Memory, SignalKind::Disk];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Cpu => "cpu",
            SignalKind::Memory => "memory",
            SignalKind::Disk => "disk",
        }
    }

    /// Human readable name used in alert and log messages
    pub fn label(&self) -> &'static str {
        match self {
            SignalKind::Cpu => "CPU usage",
            SignalKind::Memory => "Memory usage",
            SignalKind::Disk => "Disk usage",
        }
    }
}

/// Lifecycle status of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// Severity shared by alerts and system log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    System,
    Security,
    Database,
    Network,
    Service,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::System => "system",
            LogCategory::Security => "security",
            LogCategory::Database => "database",
            LogCategory::Network => "network",
            LogCategory::Service => "service",
        }
    }
}

/// Reachability verdict of a service check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    Warning,
    Error,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Running => "running",
            ServiceState::Warning => "warning",
            ServiceState::Error => "error",
        }
    }
}

/// Threshold alert for one signal kind.
///
/// At most one alert per kind is `Active` at any time; resolved alerts are
/// kept as history until retention removes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub id: Option<i64>,

    #[serde(rename = "type")]
    pub kind: SignalKind,

    pub level: LogLevel,

    pub message: String,

    #[serde(rename = "value")]
    pub current_value: f64,

    pub threshold: f64,

    pub status: AlertStatus,

    /// When the alert became active
    pub triggered_at: DateTime<Utc>,

    /// Last time the value or status changed
    pub updated_at: DateTime<Utc>,

    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertState {
    /// Timestamp of the most recent status transition
    pub fn last_transition_at(&self) -> DateTime<Utc> {
        self.resolved_at.unwrap_or(self.triggered_at)
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// Latest known state of one checked service, keyed by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatusRecord {
    pub id: Option<i64>,
    pub name: String,
    pub status: ServiceState,
    pub host: String,
    pub port: u16,
    pub last_check: DateTime<Utc>,
    pub response_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLogRecord {
    pub id: Option<i64>,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SystemLogRecord {
    pub fn new(level: LogLevel, category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            id: None,
            level,
            category,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Usage of a single mounted partition (sizes in GB)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsageRecord {
    pub path: String,
    pub name: String,
    pub total_gb: u64,
    pub used_gb: u64,
    pub free_gb: u64,
    pub usage_percent: f64,
    pub timestamp: DateTime<Utc>,
}

/// Cumulative counters and derived speeds (MB/s) of one interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkTrafficRecord {
    pub interface: String,
    pub upload_bytes: u64,
    pub download_bytes: u64,
    pub upload_speed: f64,
    pub download_speed: f64,
    pub timestamp: DateTime<Utc>,
}

/// A stored string did not name any known variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for SignalKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(SignalKind::Cpu),
            "memory" => Ok(SignalKind::Memory),
            "disk" => Ok(SignalKind::Disk),
            _ => Err(UnknownVariant {
                kind: "signal kind",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for AlertStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(UnknownVariant {
                kind: "alert status",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for LogLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            _ => Err(UnknownVariant {
                kind: "log level",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for LogCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(LogCategory::System),
            "security" => Ok(LogCategory::Security),
            "database" => Ok(LogCategory::Database),
            "network" => Ok(LogCategory::Network),
            "service" => Ok(LogCategory::Service),
            _ => Err(UnknownVariant {
                kind: "log category",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for ServiceState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ServiceState::Running),
            "warning" => Ok(ServiceState::Warning),
            "error" => Ok(ServiceState::Error),
            _ => Err(UnknownVariant {
                kind: "service state",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
