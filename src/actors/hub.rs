//! HubActor - Fans broadcast messages out to connected subscribers
//!
//! The hub is the only owner of the subscriber set. Connection tasks and the
//! scheduler jobs talk to it through `HubHandle`, whose requests are processed
//! one at a time in arrival order.
//!
//! ## Message Flow
//!
//! ```text
//! Scheduler jobs ──Publish──┐
//! WebSocket tasks ─Register─┼──> HubActor ──try_send──> subscriber queues ──> sockets
//!                 Unregister┘        │
//!                                    └── full or closed queue: subscriber dropped
//! ```
//!
//! Each message is serialized once per publish. Delivery is best effort: a
//! subscriber that cannot keep up is disconnected instead of slowing the others.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument, trace, warn};

use super::messages::{BroadcastMessage, HubCommand, Subscriber, SubscriberId};

/// Actor owning the live subscriber set
pub struct HubActor {
    /// Command receiver
    command_rx: mpsc::UnboundedReceiver<HubCommand>,

    /// Live subscribers keyed by id
    subscribers: BTreeMap<SubscriberId, mpsc::Sender<String>>,
}

impl HubActor {
    pub fn new(command_rx: mpsc::UnboundedReceiver<HubCommand>) -> Self {
        Self {
            command_rx,
            subscribers: BTreeMap::new(),
        }
    }

    /// Run the actor's main loop
    ///
    /// This is the entry point for the actor. It runs until:
    /// - A Shutdown command is received
    /// - Every handle has been dropped
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting hub actor");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                HubCommand::Register { subscriber } => self.register(subscriber),

                HubCommand::Unregister { id } => {
                    if self.subscribers.remove(&id).is_some() {
                        debug!("{id} unregistered");
                    }
                }

                HubCommand::Publish { message } => self.publish(&message),

                HubCommand::SubscriberCount { respond_to } => {
                    let _ = respond_to.send(self.subscribers.len());
                }

                HubCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        // dropping the senders ends every outbound task
        let remaining = self.subscribers.len();
        self.subscribers.clear();
        debug!("hub actor stopped, closed {remaining} subscribers");
    }

    fn register(&mut self, subscriber: Subscriber) {
        let Subscriber { id, queue } = subscriber;

        if self.subscribers.contains_key(&id) {
            warn!("rejecting duplicate registration of {id}");
            return;
        }

        debug!("{id} registered");
        self.subscribers.insert(id, queue);
    }

    fn publish(&mut self, message: &BroadcastMessage) {
        if self.subscribers.is_empty() {
            trace!("no subscribers for {} message", message.kind());
            return;
        }

        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to serialize {} message: {e}", message.kind());
                return;
            }
        };

        self.subscribers
            .retain(|id, queue| match queue.try_send(payload.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("{id} is not keeping up, disconnecting");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("{id} went away");
                    false
                }
            });

        trace!(
            "published {} message to {} subscribers",
            message.kind(),
            self.subscribers.len()
        );
    }
}

/// Handle for controlling the HubActor
///
/// This handle provides a typed API for sending commands to the actor.
/// It can be cloned and shared across tasks.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
}

impl HubHandle {
    /// Spawn a new hub actor
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let actor = HubActor::new(cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate an id for a new subscriber
    pub fn next_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn register(&self, id: SubscriberId, queue: mpsc::Sender<String>) -> Result<()> {
        self.sender
            .send(HubCommand::Register {
                subscriber: Subscriber { id, queue },
            })
            .context("hub is not running")
    }

    /// Unregistering an unknown or already removed id is a no-op
    pub fn unregister(&self, id: SubscriberId) {
        let _ = self.sender.send(HubCommand::Unregister { id });
    }

    /// Queue a message for fan-out; never waits on subscribers
    pub fn publish(&self, message: BroadcastMessage) {
        if self.sender.send(HubCommand::Publish { message }).is_err() {
            debug!("hub stopped, dropping message");
        }
    }

    pub async fn subscriber_count(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::SubscriberCount { respond_to: tx })
            .context("failed to send SubscriberCount command")?;

        rx.await.context("failed to receive subscriber count")
    }

    /// Disconnect every subscriber and stop the hub
    pub fn shutdown(&self) {
        let _ = self.sender.send(HubCommand::Shutdown);
    }
}
