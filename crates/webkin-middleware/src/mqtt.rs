//! [`MqttListener`] – MQTT broker transport.
//!
//! Subscribes to the joints and tree topics (QoS 0) and forwards every
//! publish to [`handle_tree_payload`] / [`handle_joints_payload`]. Topics are
//! re-subscribed on every `CONNACK`, so a broker restart is survived by the
//! event loop's own reconnect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{debug, info, warn};
use webkin_types::WebkinError;

use crate::scene::SceneHub;
use crate::transport::{
    DEFAULT_JOINTS_TOPIC, DEFAULT_TREE_TOPIC, RECONNECT_DELAY, TransportListener,
    handle_joints_payload, handle_tree_payload,
};

pub const DEFAULT_MQTT_PORT: u16 = 1883;
const CLIENT_ID: &str = "webkin";
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub joints_topic: String,
    pub tree_topic: String,
}

impl MqttConfig {
    pub fn new(broker_host: impl Into<String>, broker_port: u16) -> Self {
        Self {
            broker_host: broker_host.into(),
            broker_port,
            joints_topic: DEFAULT_JOINTS_TOPIC.to_string(),
            tree_topic: DEFAULT_TREE_TOPIC.to_string(),
        }
    }
}

pub struct MqttListener {
    config: MqttConfig,
}

impl MqttListener {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    pub(crate) fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            CLIENT_ID,
            self.config.broker_host.clone(),
            self.config.broker_port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        options
    }

    fn subscribe_all(&self, client: &AsyncClient) {
        for topic in [&self.config.tree_topic, &self.config.joints_topic] {
            match client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                Ok(()) => info!(topic = %topic, "subscribed to MQTT topic"),
                Err(e) => warn!(topic = %topic, error = %e, "MQTT subscribe failed"),
            }
        }
    }

    /// Route one publish to the hub. Empty payloads and unknown topics are
    /// ignored.
    pub(crate) fn dispatch_publish(
        &self,
        hub: &SceneHub,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), WebkinError> {
        if payload.is_empty() {
            return Ok(());
        }
        if topic == self.config.tree_topic {
            handle_tree_payload(hub, payload)?;
        } else if topic == self.config.joints_topic {
            handle_joints_payload(hub, payload)?;
        } else {
            debug!(topic, "ignoring MQTT publish on unknown topic");
        }
        Ok(())
    }
}

#[async_trait]
impl TransportListener for MqttListener {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn run(&self, hub: Arc<SceneHub>) -> Result<(), WebkinError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        info!(
            broker = %self.config.broker_host,
            port = self.config.broker_port,
            "connecting to MQTT broker"
        );

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(broker = %self.config.broker_host, "MQTT connected");
                    self.subscribe_all(&client);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Err(e) = self.dispatch_publish(&hub, &publish.topic, &publish.payload) {
                        warn!(topic = %publish.topic, error = %e, "dropping MQTT message");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_secs = RECONNECT_DELAY.as_secs(),
                        "MQTT connection lost"
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}
