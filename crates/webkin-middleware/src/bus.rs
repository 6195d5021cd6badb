//! Scene broadcast bus.
//!
//! Wraps a [`tokio::sync::broadcast`] channel so every connected viewer gets
//! every snapshot and a slow viewer never blocks the engine. A viewer that
//! falls behind skips the missed snapshots; the next one is complete anyway.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::SceneMessage;

/// Number of buffered events before the oldest are dropped for slow
/// subscribers.
const DEFAULT_CAPACITY: usize = 64;

/// A [`SceneMessage`] stamped with its origin.
#[derive(Debug, Clone, Serialize)]
pub struct SceneEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Operation that produced the message, e.g. `"scene::set_joints"`.
    pub source: String,
    pub message: SceneMessage,
}

impl SceneEvent {
    pub fn new(source: impl Into<String>, message: SceneMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            message,
        }
    }
}

/// Shared scene bus. Clones share the same channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SceneEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `event` to every subscriber.
    ///
    /// Returns the number of subscribers handed the event; `0` when no viewer
    /// is connected.
    pub fn publish(&self, event: SceneEvent) -> usize {
        match self.sender.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                debug!(source = %event.source, "no scene subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> SceneSubscriber {
        SceneSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiver half handed to one viewer connection.
pub struct SceneSubscriber {
    receiver: broadcast::Receiver<SceneEvent>,
}

impl SceneSubscriber {
    /// Wait for the next event, skipping over lag.
    ///
    /// Returns `None` once the bus has shut down.
    pub async fn recv(&mut self) -> Option<SceneEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "scene subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
