//! The REST control plane: config CRUD, tracker lifecycle, and top-level
//! start/stop/restart/status. Camera/algorithm feed streaming is outside
//! this implementation's depth; those routes report 501.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use eye_config::{ConfigStore, TrackerConfig};
use parking_lot::Mutex;
use serde_json::json;
use uuid::Uuid;

use crate::orchestrator::{Orchestrator, Status};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub orchestrator: Arc<Mutex<Orchestrator>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/etvr/config", get(get_config).post(update_config))
        .route("/etvr/config/save", get(save_config))
        .route("/etvr/config/load", get(load_config))
        .route("/etvr/config/reset", get(reset_config))
        .route("/etvr/config/trackers", get(list_trackers))
        .route(
            "/etvr/config/tracker/:uuid",
            get(get_tracker).put(update_tracker).delete(delete_tracker),
        )
        .route("/etvr/config/tracker", post(create_tracker))
        .route("/etvr/config/tracker/:uuid/reset", get(reset_tracker))
        .route("/etvr/start", get(start))
        .route("/etvr/stop", get(stop))
        .route("/etvr/restart", get(restart))
        .route("/etvr/status", get(status))
        .route("/etvr/feed/:uuid/camera", get(feed_unimplemented))
        .route("/etvr/feed/:uuid/algorithm", get(feed_unimplemented))
        .with_state(state)
}

fn config_error_response(e: eye_config::Error) -> impl IntoResponse {
    match e {
        eye_config::Error::NotFound(uuid) => {
            (StatusCode::NOT_FOUND, Json(json!({"error": format!("no tracker with uuid {uuid}")})))
        }
        eye_config::Error::Validation(errors) => {
            let fields: Vec<_> = errors.iter().map(|e| json!({"path": e.path, "message": e.message})).collect();
            (StatusCode::BAD_REQUEST, Json(json!({"error": "validation failed", "fields": fields})))
        }
        other => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": other.to_string()}))),
    }
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.snapshot())
}

async fn update_config(State(state): State<AppState>, Json(partial): Json<serde_json::Value>) -> impl IntoResponse {
    match state.store.update(partial) {
        Ok(()) => Json(state.store.snapshot()).into_response(),
        Err(e) => config_error_response(e).into_response(),
    }
}

async fn save_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.save() {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => config_error_response(e).into_response(),
    }
}

async fn load_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.reload() {
        Ok(_changed) => Json(state.store.snapshot()).into_response(),
        Err(e) => config_error_response(e).into_response(),
    }
}

async fn reset_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.reset() {
        Ok(()) => Json(state.store.snapshot()).into_response(),
        Err(e) => config_error_response(e).into_response(),
    }
}

async fn list_trackers(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.snapshot().trackers)
}

async fn get_tracker(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> impl IntoResponse {
    match state.store.get_tracker_by_uuid(uuid) {
        Ok(tracker) => Json(tracker).into_response(),
        Err(e) => config_error_response(e).into_response(),
    }
}

async fn create_tracker(State(state): State<AppState>, Json(tracker): Json<TrackerConfig>) -> impl IntoResponse {
    match state.store.create_tracker(tracker) {
        Ok(uuid) => Json(json!({"uuid": uuid})).into_response(),
        Err(e) => config_error_response(e).into_response(),
    }
}

async fn update_tracker(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(partial): Json<serde_json::Value>,
) -> impl IntoResponse {
    match state.store.update_tracker(uuid, partial) {
        Ok(()) => Json(state.store.snapshot()).into_response(),
        Err(e) => config_error_response(e).into_response(),
    }
}

async fn delete_tracker(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> impl IntoResponse {
    match state.store.delete_tracker(uuid) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => config_error_response(e).into_response(),
    }
}

async fn reset_tracker(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> impl IntoResponse {
    match state.store.reset_tracker(uuid) {
        Ok(()) => Json(state.store.snapshot()).into_response(),
        Err(e) => config_error_response(e).into_response(),
    }
}

async fn start(State(state): State<AppState>) -> impl IntoResponse {
    state.orchestrator.lock().start();
    StatusCode::OK
}

async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    state.orchestrator.lock().stop();
    StatusCode::OK
}

async fn restart(State(state): State<AppState>) -> impl IntoResponse {
    state.orchestrator.lock().restart();
    StatusCode::OK
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let running = state.orchestrator.lock().status() == Status::Running;
    Json(json!({"running": running}))
}

async fn feed_unimplemented() -> impl IntoResponse {
    StatusCode::NOT_IMPLEMENTED
}
