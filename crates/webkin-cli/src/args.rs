//! Command-line flags. Every flag overrides the config file and environment.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "webkin", version, about = "Forward-kinematics scene server")]
pub struct Args {
    /// Address to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP / WebSocket port.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Tell viewers the model is authored Z-up.
    #[arg(long)]
    pub z_up: bool,

    /// K3D export to load: an extracted directory or a JSON file.
    #[arg(long, value_name = "PATH")]
    pub k3d: Option<String>,

    /// Directory served under /static/.
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<String>,

    /// Calibration override file.
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<String>,

    /// MQTT broker to receive trees and joint values from.
    #[arg(long, value_name = "HOST")]
    pub mqtt_broker: Option<String>,

    #[arg(long, value_name = "PORT")]
    pub mqtt_port: Option<u16>,

    /// rosbridge-style WebSocket URL to receive trees and joint values from.
    #[arg(long, value_name = "URL")]
    pub transport_url: Option<String>,

    #[arg(long, value_name = "TOPIC")]
    pub joints_topic: Option<String>,

    #[arg(long, value_name = "TOPIC")]
    pub tree_topic: Option<String>,

    /// Config file (default ~/.webkin/config.toml).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Save the effective configuration back to the config file.
    #[arg(long)]
    pub write_config: bool,
}

impl Args {
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if self.z_up {
            cfg.z_up = true;
        }
        if let Some(k3d) = &self.k3d {
            cfg.k3d_path = Some(k3d.clone());
        }
        if let Some(dir) = &self.static_dir {
            cfg.static_dir = dir.clone();
        }
        if let Some(file) = &self.calibration {
            cfg.calibration_file = file.clone();
        }
        if let Some(broker) = &self.mqtt_broker {
            cfg.transport.mqtt_broker = Some(broker.clone());
        }
        if let Some(port) = self.mqtt_port {
            cfg.transport.mqtt_port = port;
        }
        if let Some(url) = &self.transport_url {
            cfg.transport.url = Some(url.clone());
        }
        if let Some(topic) = &self.joints_topic {
            cfg.transport.joints_topic = topic.clone();
        }
        if let Some(topic) = &self.tree_topic {
            cfg.transport.tree_topic = topic.clone();
        }
    }
}
