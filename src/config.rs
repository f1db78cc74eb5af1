use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use anyhow::Context;
use tracing::trace;

use crate::monitors::service::ServiceConfig;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./monitor.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Targets probed by the service checks
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// HTTP and WebSocket listener settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bearer token required on `/api/v1` routes when set
    pub auth_token: Option<String>,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            auth_token: None,
            enable_cors: true,
        }
    }
}

impl ServerConfig {
    /// Bind address after applying the environment overrides
    pub fn bind_address(&self) -> (IpAddr, u16) {
        (
            crate::util::get_host(self.host),
            crate::util::get_port(self.port),
        )
    }
}

/// Sampling cadence, thresholds and retention
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorConfig {
    /// Seconds between metric samples
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Hours of metric history kept by the daily retention job
    #[serde(default = "default_history_hours")]
    pub history_hours: u32,

    #[serde(default = "default_alert_cpu")]
    pub alert_cpu: u32,

    #[serde(default = "default_alert_memory")]
    pub alert_memory: u32,

    #[serde(default = "default_alert_disk")]
    pub alert_disk: u32,

    /// Local hour (0-23) at which retention runs
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            history_hours: default_history_hours(),
            alert_cpu: default_alert_cpu(),
            alert_memory: default_alert_memory(),
            alert_disk: default_alert_disk(),
            cleanup_hour: default_cleanup_hour(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    5
}

fn default_history_hours() -> u32 {
    24
}

fn default_alert_cpu() -> u32 {
    80
}

fn default_alert_memory() -> u32 {
    80
}

fn default_alert_disk() -> u32 {
    90
}

fn default_cleanup_hour() -> u32 {
    2
}

/// Longest sample history the retention job may be asked to keep
pub const MAX_HISTORY_HOURS: u32 = 24 * 365;

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config =
        serde_json::from_str(content).context("Invalid configuration file provided!")?;

    if config.monitor.interval == 0 {
        anyhow::bail!("monitor.interval must be at least one second");
    }
    if !(1..=MAX_HISTORY_HOURS).contains(&config.monitor.history_hours) {
        anyhow::bail!(
            "monitor.history_hours must be between 1 and {MAX_HISTORY_HOURS}, got {}",
            config.monitor.history_hours
        );
    }
    if config.monitor.cleanup_hour > 23 {
        anyhow::bail!(
            "monitor.cleanup_hour must be between 0 and 23, got {}",
            config.monitor.cleanup_hour
        );
    }

    trace!("loaded config: {config:?}");
    Ok(config)
}
