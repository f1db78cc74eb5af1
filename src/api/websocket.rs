//! WebSocket subscriber endpoint
//!
//! Every connection registers one bounded queue with the hub and runs two
//! tasks until either of them stops:
//!
//! ```text
//! hub ──try_send──> queue ──> write task ──> socket   (10 s write timeout, ping every 54 s)
//!                     ↑
//! socket ──> read task ── pong replies               (512 byte frames, 60 s idle timeout)
//! ```
//!
//! The read task only holds a weak sender, so once the hub drops a subscriber
//! its queue closes and the write task ends the connection.

use std::time::Duration;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, timeout};
use tracing::{debug, info, trace, warn};

use crate::actors::hub::HubHandle;
use crate::actors::messages::{ClientMessage, ControlReply};
use crate::api::state::ApiState;

/// Largest inbound message accepted from a subscriber
pub const MAX_MESSAGE_SIZE: usize = 512;

/// A subscriber that sends nothing (not even a pong) for this long is dropped
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Keepalive ping period, shorter than the peer's read timeout
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// Messages buffered per subscriber before the hub disconnects it
pub const QUEUE_CAPACITY: usize = 256;

/// Liveness timers of one subscriber connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketTimings {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub ping_period: Duration,
}

impl Default for SocketTimings {
    fn default() -> Self {
        Self {
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            ping_period: PING_PERIOD,
        }
    }
}

/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .max_frame_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_websocket(socket, state.hub, state.socket_timings))
}

async fn handle_websocket(socket: WebSocket, hub: HubHandle, timings: SocketTimings) {
    let id = hub.next_id();
    let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
    let replies = queue_tx.downgrade();

    if let Err(e) = hub.register(id, queue_tx) {
        warn!("refusing WebSocket client: {e}");
        return;
    }

    info!("{id} connected");

    let (sink, stream) = socket.split();
    let mut send_task = tokio::spawn(write_loop(sink, queue_rx, timings));
    let mut recv_task = tokio::spawn(read_loop(stream, replies, timings.read_timeout));

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    hub.unregister(id);
    info!("{id} disconnected");
}

/// Drain the subscriber queue to the socket
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<String>,
    timings: SocketTimings,
) {
    let SocketTimings {
        write_timeout,
        ping_period,
        ..
    } = timings;
    let mut keepalive = interval_at(Instant::now() + ping_period, ping_period);

    loop {
        let message = tokio::select! {
            next = queue.recv() => match next {
                Some(text) => Message::Text(text),
                None => {
                    debug!("queue closed by hub");
                    let _ = timeout(write_timeout, sink.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = keepalive.tick() => Message::Ping(Vec::new()),
        };

        match timeout(write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("WebSocket send failed: {e}");
                return;
            }
            Err(_) => {
                debug!("WebSocket send timed out after {write_timeout:?}");
                return;
            }
        }
    }
}

/// Read control messages until the peer goes away or idles out
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    replies: mpsc::WeakSender<String>,
    read_timeout: Duration,
) {
    loop {
        let frame = match timeout(read_timeout, stream.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                debug!("WebSocket read failed: {e}");
                return;
            }
            Ok(None) => return,
            Err(_) => {
                debug!("no traffic for {read_timeout:?}");
                return;
            }
        };

        match frame {
            Message::Text(text) => handle_control(&text, &replies),
            Message::Close(_) => return,
            // pings and pongs only count as activity
            _ => {}
        }
    }
}

fn handle_control(text: &str, replies: &mpsc::WeakSender<String>) {
    match ClientMessage::parse(text) {
        Some(ClientMessage::Ping) => {
            let Some(queue) = replies.upgrade() else {
                return;
            };
            let Ok(pong) = serde_json::to_string(&ControlReply::pong()) else {
                return;
            };
            if queue.try_send(pong).is_err() {
                debug!("queue full, dropping pong");
            }
        }
        Some(ClientMessage::Subscribe { data_type }) => {
            debug!("subscribe request for {data_type}");
        }
        None => trace!("ignoring unknown message"),
    }
}
