//! Server configuration – reads/writes `~/.webkin/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Transports feeding trees and joint values. Each one is enabled by setting
/// its address; both may run at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// MQTT broker host, e.g. `localhost`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt_broker: Option<String>,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// rosbridge WebSocket URL, e.g. `ws://localhost:9090`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_joints_topic")]
    pub joints_topic: String,

    #[serde(default = "default_tree_topic")]
    pub tree_topic: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            mqtt_broker: None,
            mqtt_port: default_mqtt_port(),
            url: None,
            joints_topic: default_joints_topic(),
            tree_topic: default_tree_topic(),
        }
    }
}

/// Persisted configuration stored in `~/.webkin/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Tell viewers the loaded model is authored Z-up.
    #[serde(default)]
    pub z_up: bool,

    /// K3D export (directory or JSON file) loaded at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k3d_path: Option<String>,

    /// Directory served under `/static/`; also holds `example_tree.json`.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    #[serde(default = "default_calibration_file")]
    pub calibration_file: String,

    #[serde(default)]
    pub transport: TransportSettings,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_static_dir() -> String {
    "static".to_string()
}
fn default_calibration_file() -> String {
    "~/.webkin/calibration.json".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_joints_topic() -> String {
    "robot/joints".to_string()
}
fn default_tree_topic() -> String {
    "robot/joints/tree".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            z_up: false,
            k3d_path: None,
            static_dir: default_static_dir(),
            calibration_file: default_calibration_file(),
            transport: TransportSettings::default(),
        }
    }
}

/// Return the path to `~/.webkin/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".webkin").join("config.toml")
}

/// Load the file at `path` (defaults when it does not exist), then apply
/// environment overrides.
pub fn resolve(path: &Path) -> Result<Config, String> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from `path`. Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

fn env_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Apply environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WEBKIN_HOST` | `host` |
/// | `WEBKIN_PORT` | `port` |
/// | `WEBKIN_K3D_FILE`, `K3D_FILE` | `k3d_path` |
/// | `WEBKIN_Z_UP`, `Z_UP` | `z_up` (`1`, `true`, `yes`) |
/// | `WEBKIN_MQTT_BROKER` | `transport.mqtt_broker` |
/// | `WEBKIN_MQTT_PORT` | `transport.mqtt_port` |
/// | `WEBKIN_TRANSPORT_URL` | `transport.url` |
///
/// The `WEBKIN_` variable wins when both spellings are set.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("WEBKIN_HOST") {
        cfg.host = v;
    }
    if let Ok(v) = std::env::var("WEBKIN_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("WEBKIN_K3D_FILE").or_else(|_| std::env::var("K3D_FILE"))
        && !v.is_empty()
    {
        cfg.k3d_path = Some(v);
    }
    if let Ok(v) = std::env::var("WEBKIN_Z_UP").or_else(|_| std::env::var("Z_UP")) {
        cfg.z_up = env_flag(&v);
    }
    if let Ok(v) = std::env::var("WEBKIN_MQTT_BROKER")
        && !v.is_empty()
    {
        cfg.transport.mqtt_broker = Some(v);
    }
    if let Ok(v) = std::env::var("WEBKIN_MQTT_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.transport.mqtt_port = port;
    }
    if let Ok(v) = std::env::var("WEBKIN_TRANSPORT_URL")
        && !v.is_empty()
    {
        cfg.transport.url = Some(v);
    }
}

/// Save the config to `path`, creating its directory if necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

/// Serializes tests that touch process environment variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
