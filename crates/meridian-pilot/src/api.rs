//! HTTP surface.
//!
//! Serves the monitor states and the script slot as JSON, and lets an
//! operator start or cancel an observing script or switch a monitor
//! mode. Hardware control stays on the RPC sockets and the command
//! line.

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use meridian_monitor::Mode;
use meridian_proto::DaemonId;

use crate::error::PilotError;
use crate::script::ScriptRunner;
use crate::watch::{ModeCommands, MonitorSnapshot, MonitorStates};

#[derive(Clone)]
pub struct ApiState {
    pub monitors: MonitorStates,
    pub modes: ModeCommands,
    pub script: ScriptRunner,
}

#[derive(Debug, Serialize)]
struct ScriptStatus {
    running: bool,
    name: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(all_status))
        .route("/status/:daemon", get(daemon_status))
        .route("/script", get(script_status).delete(cancel_script))
        .route("/script/:name", post(start_script))
        .route("/mode/:daemon/:mode", post(set_mode))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: ApiState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "status api listening");
    axum::serve(listener, router(state)).await
}

async fn all_status(State(state): State<ApiState>) -> Json<Vec<MonitorSnapshot>> {
    let mut snapshots: Vec<_> = state
        .monitors
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    snapshots.sort_by_key(|snapshot| snapshot.daemon.as_str());
    Json(snapshots)
}

async fn daemon_status(
    State(state): State<ApiState>,
    Path(daemon): Path<String>,
) -> Result<Json<MonitorSnapshot>, StatusCode> {
    let daemon: DaemonId = daemon.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    state
        .monitors
        .get(&daemon)
        .map(|entry| Json(entry.value().clone()))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn script_status(State(state): State<ApiState>) -> Json<ScriptStatus> {
    let name = state.script.current();
    Json(ScriptStatus {
        running: name.is_some(),
        name,
    })
}

async fn start_script(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.script.start(&name) {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(err @ PilotError::ScriptBusy { .. }) => Err((StatusCode::CONFLICT, err.to_string())),
        Err(err @ PilotError::ScriptNotFound { .. }) => {
            Err((StatusCode::NOT_FOUND, err.to_string()))
        }
        Err(err) => Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string())),
    }
}

// The watch task owns the monitor; the command lands in the shared map
// and takes effect at its next cycle, so 202 rather than 200. A mode the
// strategy does not offer is refused there and logged.
async fn set_mode(
    State(state): State<ApiState>,
    Path((daemon, mode)): Path<(String, String)>,
) -> Result<StatusCode, StatusCode> {
    let daemon: DaemonId = daemon.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    let mode: Mode = mode.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    info!(%daemon, %mode, "mode change requested");
    state.modes.insert(daemon, mode);
    Ok(StatusCode::ACCEPTED)
}

async fn cancel_script(State(state): State<ApiState>) -> StatusCode {
    if !state.script.is_running() {
        return StatusCode::NOT_FOUND;
    }
    state.script.cancel().await;
    StatusCode::ACCEPTED
}
