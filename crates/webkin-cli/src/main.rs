//! `webkin-cli` – the `webkin` server binary.
//!
//! Startup order:
//!
//! 1. Structured logging (optionally exported over OTLP).
//! 2. Configuration: `~/.webkin/config.toml`, then `WEBKIN_*` environment
//!    variables, then command-line flags.
//! 3. Calibration store, scene hub and the initial tree (a K3D export, or
//!    `<static_dir>/example_tree.json` as a fallback).
//! 4. Optional transport listeners (MQTT, rosbridge) feeding trees and joint
//!    values.
//! 5. The viewer server, until Ctrl-C.

mod args;
mod config;
mod telemetry;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tracing::{error, info, warn};

use webkin_cockpit::CockpitServer;
use webkin_loader::{K3dLoader, expand_home};
use webkin_middleware::{
    EventBus, MqttConfig, MqttListener, SceneHub, TransportConfig, TransportListener,
    WsBridgeListener,
};
use webkin_store::CalibrationStore;
use webkin_types::WebkinError;

use crate::args::Args;
use crate::config::Config;

/// Tree loaded from the static directory when no K3D export is configured.
const FALLBACK_TREE: &str = "example_tree.json";

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = telemetry::init_tracing("webkin");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = match config::resolve(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    args.apply(&mut cfg);

    if args.write_config {
        match config::save_to(&cfg, &config_path) {
            Ok(()) => println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                config_path.display().to_string().bold()
            ),
            Err(e) => println!("{}: {}", "Error saving config".red(), e),
        }
    }

    // ── Engine ────────────────────────────────────────────────────────────
    let calibration_path = expand_home(Path::new(&cfg.calibration_file));
    let store = CalibrationStore::open(&calibration_path).unwrap_or_else(|e| {
        warn!(error = %e, "calibration store unavailable; overrides will not persist");
        CalibrationStore::in_memory()
    });
    let hub = Arc::new(SceneHub::new(store, EventBus::default(), cfg.z_up));

    // Held until exit: an extracted archive lives as long as its loader.
    let loader = load_initial_tree(&hub, &cfg);
    let models_dir = loader
        .as_ref()
        .and_then(K3dLoader::models_dir)
        .map(Path::to_path_buf);

    // ── Transports ────────────────────────────────────────────────────────
    if let Some(broker) = cfg.transport.mqtt_broker.clone() {
        let mut mqtt = MqttConfig::new(broker, cfg.transport.mqtt_port);
        mqtt.joints_topic = cfg.transport.joints_topic.clone();
        mqtt.tree_topic = cfg.transport.tree_topic.clone();
        spawn_listener(MqttListener::new(mqtt), &hub);
    }
    if let Some(url) = cfg.transport.url.clone() {
        let listener = WsBridgeListener::new(TransportConfig {
            url,
            joints_topic: cfg.transport.joints_topic.clone(),
            tree_topic: cfg.transport.tree_topic.clone(),
        });
        spawn_listener(listener, &hub);
    }

    // ── Server ────────────────────────────────────────────────────────────
    println!(
        "  Viewer at {}",
        format!("http://localhost:{}", cfg.port).bold().cyan()
    );
    let server = CockpitServer::new(Arc::clone(&hub))
        .with_host(cfg.host.clone())
        .with_port(cfg.port)
        .with_static_dir(&cfg.static_dir)
        .with_models_dir(models_dir);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server stopped");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("{}", "  Ctrl-C received – shutting down.".yellow().bold());
        }
    }
    ExitCode::SUCCESS
}

fn spawn_listener<L>(listener: L, hub: &Arc<SceneHub>)
where
    L: TransportListener + 'static,
{
    let hub = Arc::clone(hub);
    tokio::spawn(async move {
        info!(listener = listener.name(), "starting transport listener");
        if let Err(e) = listener.run(hub).await {
            error!(listener = listener.name(), error = %e, "transport listener stopped");
        }
    });
}

/// Load the configured K3D export, or the fallback tree. Returns the loader
/// of a K3D export, which knows where its models live. Failures are logged
/// and the server starts empty.
fn load_initial_tree(hub: &SceneHub, cfg: &Config) -> Option<K3dLoader> {
    if let Some(k3d_path) = &cfg.k3d_path {
        let mut loader = K3dLoader::new();
        let loaded = loader
            .load_path(k3d_path)
            .and_then(|description| {
                hub.set_camera_pose(loader.camera_pose().cloned());
                hub.load_tree(description)
            });
        return match loaded {
            Ok(joints) => {
                info!(path = %k3d_path, joints = ?joints, "K3D export loaded");
                Some(loader)
            }
            Err(e) => {
                error!(path = %k3d_path, error = %e, "failed to load K3D export");
                None
            }
        };
    }

    let fallback = Path::new(&cfg.static_dir).join(FALLBACK_TREE);
    if !fallback.exists() {
        info!("no tree configured; waiting for one over HTTP or the transport");
        return None;
    }
    match read_tree(&fallback).and_then(|description| hub.load_tree(description)) {
        Ok(joints) => info!(path = %fallback.display(), joints = ?joints, "example tree loaded"),
        Err(e) => error!(path = %fallback.display(), error = %e, "failed to load example tree"),
    }
    None
}

fn read_tree(path: &Path) -> Result<serde_json::Value, WebkinError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| WebkinError::Loader(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| WebkinError::Loader(format!("failed to parse {}: {e}", path.display())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#" _      __    __   __ __ _    "#.bold().cyan());
    println!("{}", r#"| | /| / /__ / /  / //_/(_)__ "#.bold().cyan());
    println!("{}", r#"| |/ |/ / -_) _ \/ ,<  / / _ \"#.bold().cyan());
    println!("{}", r#"|__/|__/\__/_.__/_/|_|/_/_//_/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "WebKin".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Forward-kinematics scene server");
    println!();
}
