//! Volume endpoints (spec §6, §4.5)

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::router::extract::{filter_values, label_filter_pairs, query_bool, query_filters};
use crate::router::AppState;
use crate::state::VolumeRow;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeInspect {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    pub labels: Value,
    pub options: Value,
}

impl From<VolumeRow> for VolumeInspect {
    fn from(row: VolumeRow) -> Self {
        Self {
            name: row.name,
            driver: row.driver,
            mountpoint: row.mountpoint,
            labels: row.labels_json,
            options: row.options_json,
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let filters = query_filters(&params);
    let label_filter = label_filter_pairs(filter_values(&filters, "label"));
    let rows = state.volumes.list(&label_filter)?;
    Ok(Json(serde_json::json!({
        "Volumes": rows.into_iter().map(VolumeInspect::from).collect::<Vec<_>>(),
        "Warnings": Vec::<String>::new(),
    })))
}

pub async fn inspect(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<VolumeInspect>> {
    let row = state.volumes.get(&name)?;
    Ok(Json(row.into()))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CreateVolumeRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: Value,
    #[serde(default)]
    pub driver_opts: Value,
}

pub async fn create(State(state): State<AppState>, Json(req): Json<CreateVolumeRequest>) -> Result<Json<VolumeInspect>> {
    let row = state.volumes.create(req.name.as_deref(), req.labels, req.driver_opts)?;
    Ok(Json(row.into()))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let force = query_bool(&params, "force", false);
    state.volumes.remove(&name, force)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn prune(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let filters = query_filters(&params);
    let label_filter = label_filter_pairs(filter_values(&filters, "label"));
    let (removed, reclaimed) = state.volumes.prune(&label_filter)?;
    Ok(Json(serde_json::json!({
        "VolumesDeleted": removed,
        "SpaceReclaimed": reclaimed,
    })))
}
