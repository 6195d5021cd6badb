//! HTTP routes.
//!
//! | Method | Path | Effect |
//! |---|---|---|
//! | GET | `/` | embedded viewer page |
//! | GET | `/ws` | scene stream (WebSocket) |
//! | GET | `/static/<path>` | file from the static directory |
//! | GET | `/k3d/models/<file>` | model file from the loaded K3D export |
//! | GET/POST | `/api/tree` | read / replace the tree description |
//! | GET | `/api/scene` | current scene snapshot |
//! | GET/POST | `/api/joints` | joint info / set joint coordinates |
//! | GET/POST | `/api/calibration` | stored overrides / merge overrides |
//! | DELETE | `/api/calibration/<joint>` | drop an override, restore authored values |
//! | GET | `/api/camera` | camera pose of the loaded export |
//!
//! Errors are `{"error": "..."}` bodies. POST bodies must be JSON and at
//! most [`MAX_BODY_BYTES`].

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use webkin_loader::resolve_model_path;
use webkin_middleware::{SceneHub, parse_joint_map};
use webkin_types::{CalibrationOverrides, WebkinError};

use crate::server::viewer_socket;

/// The compiled-in viewer page.
pub const VIEWER_HTML: &str = include_str!("viewer.html");

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SceneHub>,
    /// Directory of the loaded K3D export, if any.
    pub models_dir: Option<PathBuf>,
}

/// Build the full router: API, viewer page, WebSocket and file services.
pub fn router(state: AppState, static_dir: impl Into<PathBuf>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/ws", get(viewer_socket))
        .route("/api/tree", get(get_tree).post(post_tree))
        .route("/api/scene", get(get_scene))
        .route("/api/joints", get(get_joints).post(post_joints))
        .route("/api/calibration", get(get_calibration).post(post_calibration))
        .route("/api/calibration/{joint}", delete(delete_calibration))
        .route("/api/camera", get(get_camera))
        .route("/k3d/models/{*file}", get(model_file))
        .nest_service("/static", ServeDir::new(static_dir.into()))
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"error": message.into()}))).into_response()
}

fn rejected(rejection: JsonRejection) -> Response {
    error_response(
        rejection.status(),
        format!("Invalid JSON body: {}", rejection.body_text()),
    )
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn index() -> Html<&'static str> {
    Html(VIEWER_HTML)
}

// ── Scene ───────────────────────────────────────────────────────────────────

async fn get_tree(State(state): State<AppState>) -> Json<Value> {
    Json(
        state
            .hub
            .tree_description()
            .unwrap_or_else(|| json!({"error": "No tree loaded"})),
    )
}

async fn post_tree(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(description) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected(rejection),
    };
    match state.hub.load_tree(description) {
        Ok(joints) => Json(json!({"status": "ok", "joints": joints})).into_response(),
        Err(e @ WebkinError::InvalidDescription { .. }) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn get_scene(State(state): State<AppState>) -> Response {
    Json(state.hub.scene_snapshot()).into_response()
}

async fn get_joints(State(state): State<AppState>) -> Response {
    Json(state.hub.joints_info()).into_response()
}

async fn post_joints(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(value) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected(rejection),
    };
    if !value.is_object() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Expected an object of joint name to number",
        );
    }
    let applied = state.hub.set_joints(&parse_joint_map(&value));
    debug!(applied, "joints set over HTTP");
    Json(json!({"status": "ok"})).into_response()
}

async fn get_camera(State(state): State<AppState>) -> Response {
    match state.hub.camera_pose() {
        Some(pose) => Json(pose).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No camera pose"),
    }
}

// ── Calibration ─────────────────────────────────────────────────────────────

async fn get_calibration(State(state): State<AppState>) -> Response {
    Json(state.hub.calibration()).into_response()
}

async fn post_calibration(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(value) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected(rejection),
    };
    let overrides: CalibrationOverrides = match serde_json::from_value(value) {
        Ok(overrides) => overrides,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid calibration: {e}"));
        }
    };
    match state.hub.set_calibration(&overrides) {
        Ok(stored) => Json(json!({"status": "ok", "calibration": stored})).into_response(),
        Err(e) => {
            warn!(error = %e, "calibration update failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn delete_calibration(
    State(state): State<AppState>,
    Path(joint): Path<String>,
) -> Response {
    match state.hub.reset_calibration(&joint) {
        Ok(removed) => Json(json!({"status": "ok", "removed": removed})).into_response(),
        Err(e) => {
            warn!(joint, error = %e, "calibration reset failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ── Models ──────────────────────────────────────────────────────────────────

async fn model_file(
    State(state): State<AppState>,
    Path(file): Path<String>,
    request: Request,
) -> Response {
    let Some(models_dir) = state.models_dir.as_deref() else {
        return error_response(StatusCode::NOT_FOUND, "No K3D models loaded");
    };
    let Some(path) = resolve_model_path(models_dir, &file) else {
        return error_response(StatusCode::NOT_FOUND, "Not found");
    };
    ServeFile::new(path).oneshot(request).await.into_response()
}
