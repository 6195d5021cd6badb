//! [`CockpitServer`] – HTTP + WebSocket server for the viewer.
//!
//! * `/ws` → scene stream from the [`SceneHub`] bus, plus `joint_update`
//!   messages from the viewer.
//! * Everything else → [`router`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use webkin_middleware::{ClientMessage, SceneHub, SceneMessage, parse_joint_map};
use webkin_types::WebkinError;

use crate::routes::{AppState, router};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

// ---------------------------------------------------------------------------
// CockpitServer
// ---------------------------------------------------------------------------

pub struct CockpitServer {
    hub: Arc<SceneHub>,
    host: String,
    port: u16,
    static_dir: PathBuf,
    models_dir: Option<PathBuf>,
}

impl CockpitServer {
    /// Server for `hub` on `0.0.0.0:8000`, serving `./static`.
    pub fn new(hub: Arc<SceneHub>) -> Self {
        Self {
            hub,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("static"),
            models_dir: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    /// Directory served under `/k3d/models/`.
    pub fn with_models_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.models_dir = dir;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn router(&self) -> Router {
        router(
            AppState {
                hub: Arc::clone(&self.hub),
                models_dir: self.models_dir.clone(),
            },
            self.static_dir.clone(),
        )
    }

    /// Bind `host:port` and serve until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WebkinError::Transport`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), WebkinError> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| WebkinError::Transport(format!("bind error on {addr}: {e}")))?;
        info!(%addr, "viewer listening on http://localhost:{}", self.port);
        self.serve(listener).await
    }

    /// Serve connections accepted from an already bound `listener`.
    pub async fn serve(self, listener: TcpListener) -> Result<(), WebkinError> {
        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| WebkinError::Transport(format!("server error: {e}")))
    }
}

// ---------------------------------------------------------------------------
// WebSocket: scene stream
// ---------------------------------------------------------------------------

pub(crate) async fn viewer_socket(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| viewer_session(socket, peer, state.hub))
}

async fn viewer_session(socket: WebSocket, peer: SocketAddr, hub: Arc<SceneHub>) {
    info!(peer = %peer, "viewer connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    // Subscribe before snapshotting so no update falls between the two.
    let mut scene_rx = hub.subscribe();

    let init = match encode(&hub.scene_init_message()) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "scene serialization failed");
            return;
        }
    };
    if ws_tx.send(Message::Text(init.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            // ── Downstream: hub → viewer ────────────────────────────────────
            event = scene_rx.recv() => {
                let Some(event) = event else { break };
                match encode(&event.message) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(error = %e, "scene serialization failed"),
                }
            }
            // ── Upstream: viewer → hub ─────────────────────────────────────
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_upstream_message(text.as_str(), &hub);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    info!(peer = %peer, "viewer disconnected");
}

fn encode(message: &SceneMessage) -> Result<String, WebkinError> {
    serde_json::to_string(message).map_err(|e| WebkinError::Serialization(e.to_string()))
}

/// Apply a viewer message to the hub. Unknown or malformed messages are
/// ignored.
pub(crate) fn handle_upstream_message(text: &str, hub: &SceneHub) {
    match ClientMessage::parse(text) {
        Some(ClientMessage::JointUpdate { joints }) => {
            let joints = parse_joint_map(&joints);
            if !joints.is_empty() {
                hub.set_joints(&joints);
            }
        }
        None => debug!("ignoring viewer message"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
