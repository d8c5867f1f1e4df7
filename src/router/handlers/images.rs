//! Image endpoints (spec §6, §4.9)

use std::collections::HashMap;
use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::error::{DaemonError, Result};
use crate::images::ImageListFilters;
use crate::router::extract::{query_bool, query_filters, filter_values, label_filter_pairs};
use crate::router::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub size: u64,
    pub created: i64,
}

impl From<&crate::images::ImageMeta> for ImageSummary {
    fn from(m: &crate::images::ImageMeta) -> Self {
        Self {
            id: m.id.clone(),
            repo_tags: m.tags.clone(),
            size: m.size_bytes,
            created: chrono::DateTime::parse_from_rfc3339(&m.created_at)
                .map(|d| d.timestamp())
                .unwrap_or_default(),
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<ImageSummary>>> {
    let filters = query_filters(&params);
    let list_filters = ImageListFilters {
        dangling: filter_values(&filters, "dangling").first().map(|v| v == "true"),
        reference: filter_values(&filters, "reference").first().cloned(),
        label: label_filter_pairs(filter_values(&filters, "label")),
    };
    let images = state.images.list(&list_filters).await?;
    Ok(Json(images.iter().map(ImageSummary::from).collect()))
}

pub async fn inspect(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Value>> {
    let meta = state.images.inspect(&name).await?;
    Ok(Json(serde_json::json!({
        "Id": meta.id,
        "RepoTags": meta.tags,
        "Size": meta.size_bytes,
        "Created": meta.created_at,
    })))
}

/// `POST /images/create?fromImage=...&tag=...` — streams chunked NDJSON
/// progress, as the spec's streaming-endpoints note requires.
pub async fn create(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let from_image = params
        .get("fromImage")
        .ok_or_else(|| DaemonError::InvalidRequest("missing fromImage query parameter".to_string()))?;
    let tag = params.get("tag").cloned().unwrap_or_else(|| "latest".to_string());
    let reference = if from_image.contains(':') {
        from_image.clone()
    } else {
        format!("{from_image}:{tag}")
    };

    let rx = state.images.pull_stream(&reference);
    let stream = ReceiverStream::new(rx).map(|event| {
        let mut line = serde_json::to_vec(&event).unwrap_or_default();
        line.push(b'\n');
        Ok::<_, Infallible>(Bytes::from(line))
    });

    Ok(Response::builder()
        .header("Content-Type", "application/json")
        .body(Body::from_stream(stream))
        .unwrap())
}

pub async fn remove(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let force = query_bool(&params, "force", false);
    let in_use = is_image_in_use(&state, &name).await?;
    let outcomes = state.images.delete(&name, force, in_use).await?;
    let body: Vec<Value> = outcomes
        .into_iter()
        .map(|o| match o {
            crate::images::DeleteOutcome::Untagged(t) => serde_json::json!({ "Untagged": t }),
            crate::images::DeleteOutcome::Deleted(d) => serde_json::json!({ "Deleted": d }),
        })
        .collect();
    Ok(Json(Value::Array(body)))
}

pub async fn prune(State(state): State<AppState>) -> Result<Json<Value>> {
    let containers = state.containers.list(true)?;
    let in_use_ids: Vec<String> = containers.into_iter().map(|c| c.image_id).collect();
    let (deleted, reclaimed) = state.images.prune(&in_use_ids).await?;
    Ok(Json(serde_json::json!({
        "ImagesDeleted": deleted.into_iter().map(|id| serde_json::json!({ "Deleted": id })).collect::<Vec<_>>(),
        "SpaceReclaimed": reclaimed,
    })))
}

/// `POST /images/load` — the request body is a tar stream of an OCI
/// layout; it's buffered to a scratch directory under the daemon's
/// `images/` tree and handed to the backend the same way `docker load`
/// does, then streamed back as chunked NDJSON progress.
pub async fn load(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let scratch = state
        .config
        .system
        .data_directory
        .join("images")
        .join("loads")
        .join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&scratch).map_err(|e| DaemonError::Internal(e.to_string()))?;

    let mut archive = tar::Archive::new(std::io::Cursor::new(body.as_ref()));
    archive.unpack(&scratch).map_err(|e| DaemonError::InvalidRequest(format!("invalid OCI layout tar: {e}")))?;

    let rx = state.images.load_oci_layout_stream(&scratch);
    let stream = ReceiverStream::new(rx).map(|event| {
        let mut line = serde_json::to_vec(&event).unwrap_or_default();
        line.push(b'\n');
        Ok::<_, Infallible>(Bytes::from(line))
    });

    Ok(Response::builder()
        .header("Content-Type", "application/json")
        .body(Body::from_stream(stream))
        .unwrap())
}

async fn is_image_in_use(state: &AppState, reference: &str) -> Result<bool> {
    let meta = state.images.inspect(reference).await?;
    let containers = state.containers.list(true)?;
    Ok(containers.iter().any(|c| c.image_id == meta.id))
}
