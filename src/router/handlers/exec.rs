//! Exec endpoints (spec §6, §4.8)

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::exec::ExecCreateRequest;
use crate::router::upgrade;
use crate::router::AppState;
use crate::runtime::Io;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateExecRequest {
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    pub user: Option<String>,
    #[serde(default)]
    pub tty: bool,
    #[serde(default)]
    pub attach_stdin: bool,
    #[serde(default = "default_true")]
    pub attach_stdout: bool,
    #[serde(default = "default_true")]
    pub attach_stderr: bool,
    pub working_dir: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateExecResponse {
    pub id: String,
}

pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CreateExecRequest>,
) -> Result<impl IntoResponse> {
    let spec = ExecCreateRequest {
        command: req.cmd,
        env: req.env,
        user: req.user,
        tty: req.tty,
        attach_stdin: req.attach_stdin,
        attach_stdout: req.attach_stdout,
        attach_stderr: req.attach_stderr,
        working_dir: req.working_dir,
    };
    let exec_id = state.exec.create(&id, spec)?;
    Ok((StatusCode::CREATED, Json(CreateExecResponse { id: exec_id })))
}

pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: axum::extract::Request,
) -> Result<Response> {
    let inspect = state.exec.inspect(&id)?;
    let tty = inspect.tty;

    Ok(upgrade::hijack(req, tty, move |io| async move {
        let Io { stdin, stdout, stderr } = io;
        let _ = state.exec.start(&id, Io { stdin, stdout, stderr }).await;
    }))
}

pub async fn resize(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    state.exec.resize(&id, 0, 0)?;
    Ok(StatusCode::OK)
}

pub async fn inspect(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let info = state.exec.inspect(&id)?;
    Ok(Json(serde_json::json!({
        "ID": info.id,
        "Running": info.running,
        "ExitCode": info.exit_code,
        "ContainerID": info.container_id,
    })))
}
