//! API shared state

use std::sync::Arc;

use crate::actors::hub::HubHandle;
use crate::api::websocket::SocketTimings;
use crate::storage::StorageBackend;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Store the handlers read from and write to
    pub store: Arc<dyn StorageBackend>,

    /// Hub for WebSocket subscribers and for publishing API-side changes
    pub hub: HubHandle,

    /// Idle, write and keepalive timers for `/ws` connections
    pub socket_timings: SocketTimings,
}

impl ApiState {
    pub fn new(store: Arc<dyn StorageBackend>, hub: HubHandle) -> Self {
        Self {
            store,
            hub,
            socket_timings: SocketTimings::default(),
        }
    }

    pub fn with_socket_timings(mut self, timings: SocketTimings) -> Self {
        self.socket_timings = timings;
        self
    }
}
