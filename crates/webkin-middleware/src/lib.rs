//! `webkin-middleware` – moves scene data between the engine and the world.
//!
//! # Modules
//!
//! - [`bus`] – broadcast bus carrying [`SceneMessage`]s to every connected
//!   viewer.
//! - [`protocol`] – JSON messages exchanged with viewers.
//! - [`scene`] – [`SceneHub`], the lock-guarded engine context shared by the
//!   HTTP layer and the transports.
//! - [`transport`] – the [`TransportListener`] boundary and a rosbridge-style
//!   WebSocket listener feeding tree and joint payloads into the hub.
//! - [`mqtt`] – the MQTT broker listener.

pub mod bus;
pub mod mqtt;
pub mod protocol;
pub mod scene;
pub mod transport;

pub use bus::{EventBus, SceneEvent};
pub use mqtt::{DEFAULT_MQTT_PORT, MqttConfig, MqttListener};
pub use protocol::{ClientMessage, SceneMessage, parse_joint_map};
pub use scene::SceneHub;
pub use transport::{
    TransportConfig, TransportListener, WsBridgeListener, handle_joints_payload,
    handle_tree_payload,
};
