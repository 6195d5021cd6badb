//! JSON messages exchanged with viewers.
//!
//! Server → viewer messages are tagged by `type`:
//!
//! ```json
//! {"type": "scene_init", "nodes": {...}, "joints": ["j1"], "zUp": false, "cameraPose": {...}}
//! {"type": "scene_update", "nodes": {...}}
//! ```
//!
//! Viewers send `{"type": "joint_update", "joints": {"j1": 0.5}}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use webkin_kinematics::SceneSnapshot;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneMessage {
    /// Full scene after a tree load or on connect.
    SceneInit {
        nodes: SceneSnapshot,
        joints: Vec<String>,
        #[serde(rename = "zUp")]
        z_up: bool,
        /// Camera pose from the loaded export, passed through as authored.
        #[serde(rename = "cameraPose", skip_serializing_if = "Option::is_none")]
        camera_pose: Option<Value>,
    },
    /// Fresh poses after a coordinate or calibration change.
    SceneUpdate { nodes: SceneSnapshot },
}

impl SceneMessage {
    pub fn nodes(&self) -> &SceneSnapshot {
        match self {
            Self::SceneInit { nodes, .. } | Self::SceneUpdate { nodes } => nodes,
        }
    }
}

/// Messages accepted from viewers. Anything else is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JointUpdate {
        #[serde(default)]
        joints: Value,
    },
}

impl ClientMessage {
    /// Parse a text frame, returning `None` for unknown or malformed messages.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Read a `{name: number}` map, skipping entries whose value is not a number.
///
/// Non-numeric values are dropped, not coerced to `0`: a joint sent
/// `"abc"` or `null` keeps its current coordinate instead of snapping home.
/// Anything that is not an object yields an empty map.
pub fn parse_joint_map(value: &Value) -> BTreeMap<String, f64> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(name, v)| v.as_f64().map(|n| (name.clone(), n)))
                .collect()
        })
        .unwrap_or_default()
}
