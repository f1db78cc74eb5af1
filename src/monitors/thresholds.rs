use crate::SignalKind;
use crate::config::MonitorConfig;

/// What the alert state machine does for one signal kind on one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    /// Below the threshold with nothing active
    Quiet,
    /// Crossed the threshold, a new alert becomes active
    Raise,
    /// Still above the threshold, refresh the active alert
    Update,
    /// Back at or below the threshold, resolve the active alert
    Resolve,
}

impl AlertTransition {
    pub fn decide(value: f64, threshold: f64, has_active: bool) -> AlertTransition {
        let exceeding = value > threshold;

        match (exceeding, has_active) {
            (true, false) => AlertTransition::Raise,
            (true, true) => AlertTransition::Update,
            (false, true) => AlertTransition::Resolve,
            (false, false) => AlertTransition::Quiet,
        }
    }
}

/// Alert thresholds in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
}

impl Thresholds {
    pub fn for_kind(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Cpu => self.cpu,
            SignalKind::Memory => self.memory,
            SignalKind::Disk => self.disk,
        }
    }
}

impl From<&MonitorConfig> for Thresholds {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            cpu: config.alert_cpu as f64,
            memory: config.alert_memory as f64,
            disk: config.alert_disk as f64,
        }
    }
}
