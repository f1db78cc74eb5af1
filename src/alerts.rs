//! Threshold alert state machine
//!
//! Every signal kind moves independently through:
//!
//! ```text
//! value > threshold, nothing active  → Raise    (insert active alert, warning log, event)
//! value > threshold, active exists   → Update   (refresh value/message in place)
//! value <= threshold, active exists  → Resolve  (mark resolved, info log, event)
//! value <= threshold, nothing active → Quiet
//! ```
//!
//! The same threshold raises and clears an alert, so a value oscillating
//! around it will raise and resolve on alternating samples.
//!
//! Persistence failures are logged and never undo a decision. When the
//! active-alert lookup itself fails the kind is skipped for this sample and
//! decided again on the next one.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, trace, warn};

use crate::monitors::thresholds::{AlertTransition, Thresholds};
use crate::storage::StorageBackend;
use crate::{
    AlertState, AlertStatus, LogCategory, LogLevel, MetricRecord, SignalKind, SystemLogRecord,
};

/// A state change worth telling subscribers about
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    Raised(AlertState),
    Resolved(AlertState),
}

impl AlertEvent {
    pub fn alert(&self) -> &AlertState {
        match self {
            AlertEvent::Raised(alert) | AlertEvent::Resolved(alert) => alert,
        }
    }

    pub fn into_alert(self) -> AlertState {
        match self {
            AlertEvent::Raised(alert) | AlertEvent::Resolved(alert) => alert,
        }
    }
}

fn raised_message(kind: SignalKind, value: f64) -> String {
    format!("{} too high: {value:.2}%", kind.label())
}

fn resolved_message(kind: SignalKind, value: f64) -> String {
    format!("{} back to normal: {value:.2}%", kind.label())
}

pub struct AlertEvaluator {
    store: Arc<dyn StorageBackend>,
    thresholds: Thresholds,
}

impl AlertEvaluator {
    pub fn new(store: Arc<dyn StorageBackend>, thresholds: Thresholds) -> Self {
        Self { store, thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Run the state machine for every signal kind of `record`
    ///
    /// Returns the raise and resolve events in kind order.
    #[instrument(skip_all, fields(timestamp = %record.timestamp))]
    pub async fn evaluate(&self, record: &MetricRecord) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        for kind in SignalKind::ALL {
            if let Some(event) = self.evaluate_kind(kind, record.value_of(kind)).await {
                events.push(event);
            }
        }

        events
    }

    async fn evaluate_kind(&self, kind: SignalKind, value: f64) -> Option<AlertEvent> {
        let threshold = self.thresholds.for_kind(kind);

        let active = match self.store.find_active_alert(kind).await {
            Ok(active) => active,
            Err(e) => {
                warn!("skipping {kind} evaluation, active alert lookup failed: {e}");
                return None;
            }
        };

        match (AlertTransition::decide(value, threshold, active.is_some()), active) {
            (AlertTransition::Raise, _) => Some(self.raise(kind, value, threshold).await),
            (AlertTransition::Update, Some(alert)) => {
                self.update(alert, value).await;
                None
            }
            (AlertTransition::Resolve, Some(alert)) => Some(self.resolve(alert, value).await),
            _ => None,
        }
    }

    async fn raise(&self, kind: SignalKind, value: f64, threshold: f64) -> AlertEvent {
        let now = Utc::now();
        let mut alert = AlertState {
            id: None,
            kind,
            level: LogLevel::Warning,
            message: raised_message(kind, value),
            current_value: value,
            threshold,
            status: AlertStatus::Active,
            triggered_at: now,
            updated_at: now,
            resolved_at: None,
        };

        match self.store.insert_alert(&alert).await {
            Ok(id) => alert.id = Some(id),
            Err(e) => error!("failed to save {kind} alert: {e}"),
        }

        info!("{}", alert.message);
        self.write_log(LogLevel::Warning, &alert.message).await;

        AlertEvent::Raised(alert)
    }

    async fn update(&self, mut alert: AlertState, value: f64) {
        alert.current_value = value;
        alert.message = raised_message(alert.kind, value);
        alert.updated_at = Utc::now();

        trace!("{} alert still active at {value:.2}%", alert.kind);

        if let Err(e) = self.store.update_alert(&alert).await {
            error!("failed to update {} alert: {e}", alert.kind);
        }
    }

    async fn resolve(&self, mut alert: AlertState, value: f64) -> AlertEvent {
        let now = Utc::now();
        alert.status = AlertStatus::Resolved;
        alert.current_value = value;
        alert.level = LogLevel::Info;
        alert.message = resolved_message(alert.kind, value);
        alert.updated_at = now;
        alert.resolved_at = Some(now);

        if let Err(e) = self.store.update_alert(&alert).await {
            error!("failed to resolve {} alert: {e}", alert.kind);
        }

        info!("{}", alert.message);
        self.write_log(LogLevel::Info, &alert.message).await;

        AlertEvent::Resolved(alert)
    }

    async fn write_log(&self, level: LogLevel, message: &str) {
        let log = SystemLogRecord::new(level, LogCategory::System, message);
        if let Err(e) = self.store.insert_log(&log).await {
            error!("failed to write alert log: {e}");
        }
    }
}
