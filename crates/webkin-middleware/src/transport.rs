//! Transport listeners feeding tree descriptions and joint coordinates into
//! the [`SceneHub`].
//!
//! The engine never speaks a broker protocol itself. A [`TransportListener`]
//! owns the connection and hands raw payloads to [`handle_tree_payload`] and
//! [`handle_joints_payload`], which are the only way external traffic reaches
//! the hub.
//!
//! [`MqttListener`](crate::mqtt::MqttListener) reads the topics from an MQTT
//! broker. [`WsBridgeListener`] talks to a rosbridge-compatible WebSocket
//! server:
//!
//! ```json
//! → {"op": "subscribe", "topic": "robot/joints"}
//! ← {"op": "publish", "topic": "robot/joints", "msg": {"joints": {"j1": 0.3}}}
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use webkin_types::WebkinError;

use crate::protocol::parse_joint_map;
use crate::scene::SceneHub;

pub const DEFAULT_JOINTS_TOPIC: &str = "robot/joints";
pub const DEFAULT_TREE_TOPIC: &str = "robot/joints/tree";

/// Delay between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Every external transport implements this trait.
#[async_trait]
pub trait TransportListener: Send + Sync {
    fn name(&self) -> &str;

    /// Feed `hub` until the listener gives up. Implementations reconnect on
    /// their own; an `Err` means the listener cannot run at all.
    async fn run(&self, hub: Arc<SceneHub>) -> Result<(), WebkinError>;
}

// ── Payload handlers ────────────────────────────────────────────────────────

fn parse_payload(payload: &[u8]) -> Result<Value, WebkinError> {
    serde_json::from_slice(payload)
        .map_err(|e| WebkinError::Transport(format!("invalid JSON payload: {e}")))
}

/// Load the tree description carried by `payload`. Returns the joint names.
pub fn handle_tree_payload(hub: &SceneHub, payload: &[u8]) -> Result<Vec<String>, WebkinError> {
    let description = parse_payload(payload)?;
    info!(
        root = description.get("name").and_then(serde_json::Value::as_str).unwrap_or("unnamed"),
        "received kinematic tree"
    );
    hub.load_tree(description)
}

/// Apply a `{"joints": {name: number}}` payload. Returns how many joints were
/// updated; an empty or missing map is a no-op and broadcasts nothing.
pub fn handle_joints_payload(hub: &SceneHub, payload: &[u8]) -> Result<usize, WebkinError> {
    let value = parse_payload(payload)?;
    let joints = value.get("joints").map(parse_joint_map).unwrap_or_default();
    if joints.is_empty() {
        return Ok(0);
    }
    Ok(hub.set_joints(&joints))
}

// ── rosbridge WebSocket listener ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub url: String,
    pub joints_topic: String,
    pub tree_topic: String,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            joints_topic: DEFAULT_JOINTS_TOPIC.to_string(),
            tree_topic: DEFAULT_TREE_TOPIC.to_string(),
        }
    }
}

/// Listener for a rosbridge-style WebSocket server.
pub struct WsBridgeListener {
    config: TransportConfig,
}

impl WsBridgeListener {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Subscribe frames sent after every (re)connect.
    pub fn subscribe_frames(&self) -> [String; 2] {
        [&self.config.joints_topic, &self.config.tree_topic]
            .map(|topic| json!({"op": "subscribe", "topic": topic}).to_string())
    }

    /// Route one incoming text frame to the hub.
    ///
    /// Frames that are not publishes on a known topic are ignored. The `msg`
    /// may be the payload itself or a `std_msgs/String` wrapper whose `data`
    /// holds the JSON text.
    pub(crate) fn dispatch_frame(&self, hub: &SceneHub, text: &str) -> Result<(), WebkinError> {
        let frame: Value = serde_json::from_str(text)
            .map_err(|e| WebkinError::Transport(format!("invalid frame: {e}")))?;
        if frame.get("op").and_then(Value::as_str) != Some("publish") {
            return Ok(());
        }
        let topic = frame.get("topic").and_then(Value::as_str).unwrap_or("");
        let payload = match frame.get("msg") {
            Some(Value::Object(msg)) => match msg.get("data") {
                Some(Value::String(data)) => data.clone(),
                _ => Value::Object(msg.clone()).to_string(),
            },
            _ => return Ok(()),
        };

        if topic == self.config.tree_topic {
            handle_tree_payload(hub, payload.as_bytes())?;
        } else if topic == self.config.joints_topic {
            handle_joints_payload(hub, payload.as_bytes())?;
        } else {
            debug!(topic, "ignoring publish on unknown topic");
        }
        Ok(())
    }

    async fn run_session(&self, hub: &SceneHub) -> Result<(), WebkinError> {
        let (ws_stream, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| WebkinError::Transport(format!("connect {}: {e}", self.config.url)))?;
        info!(url = %self.config.url, "connected to transport");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        for frame in self.subscribe_frames() {
            ws_tx
                .send(Message::Text(frame.into()))
                .await
                .map_err(|e| WebkinError::Transport(format!("subscribe: {e}")))?;
        }
        info!(
            joints = %self.config.joints_topic,
            tree = %self.config.tree_topic,
            "subscribed to transport topics"
        );

        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Err(e) = self.dispatch_frame(hub, text.as_str()) {
                        warn!(error = %e, "dropping transport frame");
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(WebkinError::Transport(format!("receive: {e}")));
                }
            }
        }
        Err(WebkinError::Transport("connection closed".into()))
    }
}

#[async_trait]
impl TransportListener for WsBridgeListener {
    fn name(&self) -> &str {
        "ws-bridge"
    }

    async fn run(&self, hub: Arc<SceneHub>) -> Result<(), WebkinError> {
        loop {
            if let Err(e) = self.run_session(&hub).await {
                warn!(
                    error = %e,
                    retry_in_secs = RECONNECT_DELAY.as_secs(),
                    "transport disconnected"
                );
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}
