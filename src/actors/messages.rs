//! Message types for actor communication
//!
//! This module defines all message types used for communication between actors
//! and the wire messages exchanged with subscribers.
//!
//! ## Design Principles
//!
//! 1. **Commands**: Requests sent to the hub via its private queue
//! 2. **Wire messages**: Closed serde enums, decoded or encoded once at the boundary
//! 3. **Immutability**: Published payloads are values, never mutated by the hub

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::{AlertState, MetricRecord, ServiceStatusRecord, SystemLogRecord};

/// Unique identifier of a connected subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// A connected endpoint as seen by the hub
///
/// The queue is bounded; the hub never waits on it.
#[derive(Debug)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub queue: mpsc::Sender<String>,
}

/// Everything the hub fans out to subscribers
///
/// Serialized as `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BroadcastMessage {
    SystemMetrics(MetricRecord),
    ServiceStatus(Vec<ServiceStatusRecord>),
    Alert(AlertState),
    SystemLog(Vec<SystemLogRecord>),
}

impl BroadcastMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastMessage::SystemMetrics(_) => "system_metrics",
            BroadcastMessage::ServiceStatus(_) => "service_status",
            BroadcastMessage::Alert(_) => "alert",
            BroadcastMessage::SystemLog(_) => "system_log",
        }
    }
}

/// Control messages a subscriber may send
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { data_type: String },
    Ping,
}

impl ClientMessage {
    /// Decode a text frame; anything that is not a known control message is `None`
    pub fn parse(text: &str) -> Option<ClientMessage> {
        serde_json::from_str(text).ok()
    }
}

/// Replies written into a subscriber's own queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlReply {
    Pong { timestamp: i64 },
}

impl ControlReply {
    pub fn pong() -> Self {
        ControlReply::Pong {
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Commands that can be sent to the HubActor
#[derive(Debug)]
pub enum HubCommand {
    /// Start delivering to a new subscriber
    Register { subscriber: Subscriber },

    /// Stop delivering to a subscriber; unknown ids are ignored
    Unregister { id: SubscriberId },

    /// Fan a message out to every current subscriber
    Publish { message: BroadcastMessage },

    /// Number of live subscribers
    SubscriberCount { respond_to: oneshot::Sender<usize> },

    /// Drop every subscriber and stop the hub
    Shutdown,
}
