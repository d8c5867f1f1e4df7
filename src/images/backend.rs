//! The image store/registry collaborator contract (spec §6): OCI image
//! store, layer cache, registry authentication and pull protocol all live
//! outside this daemon. This module defines the narrow seam the facade
//! consumes, plus an in-memory stub so the rest of the daemon builds and
//! runs without a real registry attached.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ImageBackendError {
    #[error("no such image: {0}")]
    NotFound(String),

    #[error("image {0} is in use by a container")]
    InUse(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ImageBackendResult<T> = Result<T, ImageBackendError>;

/// One NDJSON line of `docker pull`/`docker load`-style progress.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub status: String,
    #[serde(rename = "progressDetail", skip_serializing_if = "Option::is_none")]
    pub progress_detail: Option<ProgressDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressDetail {
    pub current: u64,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct ImageMeta {
    pub id: String,
    pub tags: Vec<String>,
    pub size_bytes: u64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Untagged(String),
    Deleted(String),
}

/// `pull`, `load_oci_layout`, `inspect`, `delete` (spec §6). Listing is not
/// part of the external contract in the spec but every stub backend needs
/// to expose its index for `GET /images/json`, so it's included here.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn pull(&self, reference: &str, progress: mpsc::Sender<ProgressEvent>) -> ImageBackendResult<ImageMeta>;

    async fn load_oci_layout(
        &self,
        dir: &Path,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> ImageBackendResult<Vec<ImageMeta>>;

    async fn inspect(&self, reference: &str) -> ImageBackendResult<ImageMeta>;

    async fn delete(&self, reference: &str, force: bool) -> ImageBackendResult<Vec<DeleteOutcome>>;

    async fn list(&self) -> ImageBackendResult<Vec<ImageMeta>>;
}

/// In-memory stand-in: `pull` synthesizes a deterministic-looking id and a
/// short progress sequence instead of talking to a registry.
pub struct StubImageBackend {
    images: DashMap<String, ImageMeta>,
}

impl StubImageBackend {
    pub fn new() -> Self {
        Self {
            images: DashMap::new(),
        }
    }
}

impl Default for StubImageBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageBackend for StubImageBackend {
    async fn pull(&self, reference: &str, progress: mpsc::Sender<ProgressEvent>) -> ImageBackendResult<ImageMeta> {
        let id = format!("sha256:{:x}", Uuid::new_v4().as_u128());

        let _ = progress
            .send(ProgressEvent {
                status: "Pulling from repository".to_string(),
                progress_detail: None,
                id: Some(reference.to_string()),
            })
            .await;
        let _ = progress
            .send(ProgressEvent {
                status: "Downloading".to_string(),
                progress_detail: Some(ProgressDetail { current: 100, total: 100 }),
                id: Some(id.clone()),
            })
            .await;
        let _ = progress
            .send(ProgressEvent {
                status: "Pull complete".to_string(),
                progress_detail: None,
                id: Some(id.clone()),
            })
            .await;

        let meta = ImageMeta {
            id: id.clone(),
            tags: vec![reference.to_string()],
            size_bytes: 0,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.images.insert(id, meta.clone());
        Ok(meta)
    }

    async fn load_oci_layout(
        &self,
        dir: &Path,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> ImageBackendResult<Vec<ImageMeta>> {
        let mut loaded = Vec::new();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "layout".to_string());
        let id = format!("sha256:{:x}", Uuid::new_v4().as_u128());
        let meta = ImageMeta {
            id: id.clone(),
            tags: vec![format!("{name}:latest")],
            size_bytes: 0,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.images.insert(id.clone(), meta.clone());
        let _ = progress
            .send(ProgressEvent {
                status: "Loaded image".to_string(),
                progress_detail: None,
                id: Some(id),
            })
            .await;
        loaded.push(meta);
        Ok(loaded)
    }

    async fn inspect(&self, reference: &str) -> ImageBackendResult<ImageMeta> {
        self.images
            .iter()
            .find(|e| e.key() == reference || e.value().tags.iter().any(|t| t == reference))
            .map(|e| e.value().clone())
            .ok_or_else(|| ImageBackendError::NotFound(reference.to_string()))
    }

    async fn delete(&self, reference: &str, _force: bool) -> ImageBackendResult<Vec<DeleteOutcome>> {
        let meta = self.inspect(reference).await?;
        self.images.remove(&meta.id);
        let mut out: Vec<DeleteOutcome> = meta.tags.iter().map(|t| DeleteOutcome::Untagged(t.clone())).collect();
        out.push(DeleteOutcome::Deleted(meta.id));
        Ok(out)
    }

    async fn list(&self) -> ImageBackendResult<Vec<ImageMeta>> {
        Ok(self.images.iter().map(|e| e.value().clone()).collect())
    }
}

pub type SharedImageBackend = Arc<dyn ImageBackend>;
