//! `webkin-cockpit` – HTTP + WebSocket front door of the viewer.
//!
//! An `axum` server (default `0.0.0.0:8000`) that:
//!
//! 1. **Serves** the embedded viewer page, files from the static directory
//!    and model files from the loaded K3D export.
//! 2. **Exposes** the [`SceneHub`] over a JSON API (`/api/tree`,
//!    `/api/scene`, `/api/joints`, `/api/calibration`, `/api/camera`).
//! 3. **Streams** `scene_init` / `scene_update` messages to every viewer on
//!    `/ws` and accepts `joint_update` messages back.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webkin_cockpit::CockpitServer;
//! use webkin_middleware::{EventBus, SceneHub};
//! use webkin_store::CalibrationStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = Arc::new(SceneHub::new(CalibrationStore::in_memory(), EventBus::default(), false));
//!     CockpitServer::new(hub)
//!         .with_port(8000)
//!         .run()
//!         .await
//!         .expect("cockpit server failed");
//! }
//! ```
//!
//! [`SceneHub`]: webkin_middleware::SceneHub

pub mod routes;
pub mod server;

pub use routes::{AppState, MAX_BODY_BYTES, router};
pub use server::{CockpitServer, DEFAULT_HOST, DEFAULT_PORT};
