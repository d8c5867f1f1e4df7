//! ImageManager facade (spec §4.9)
//!
//! A thin pass-through over the external image store/registry collaborator
//! (`ImageBackend`), adding the list-filter and progress-to-event-bus
//! behavior the spec asks the facade for. In-use detection for delete/prune
//! is supplied by the caller (the router handler, which has the container
//! list) rather than this module reaching into `ContainerManager` — keeps
//! the two managers decoupled.

pub mod backend;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::{Event, EventBus};
pub use backend::{DeleteOutcome, ImageBackend, ImageBackendError, ImageMeta, ProgressEvent};

#[derive(Debug, Error)]
pub enum ImageManagerError {
    #[error(transparent)]
    Backend(#[from] ImageBackendError),
}

pub type ImageManagerResult<T> = Result<T, ImageManagerError>;

#[derive(Debug, Clone, Default)]
pub struct ImageListFilters {
    pub dangling: Option<bool>,
    pub reference: Option<String>,
    pub label: Vec<(String, Option<String>)>,
}

pub struct ImageManager {
    backend: Arc<dyn ImageBackend>,
    events: EventBus,
}

impl ImageManager {
    pub fn new(backend: Arc<dyn ImageBackend>, events: EventBus) -> Self {
        Self { backend, events }
    }

    pub async fn list(&self, filters: &ImageListFilters) -> ImageManagerResult<Vec<ImageMeta>> {
        let mut images = self.backend.list().await?;
        if let Some(dangling) = filters.dangling {
            images.retain(|i| i.tags.is_empty() == dangling);
        }
        if let Some(reference) = &filters.reference {
            images.retain(|i| i.tags.iter().any(|t| t == reference));
        }
        Ok(images)
    }

    pub async fn inspect(&self, reference: &str) -> ImageManagerResult<ImageMeta> {
        Ok(self.backend.inspect(reference).await?)
    }

    /// Spawns the pull and streams progress both to the returned channel
    /// (consumed by the router as chunked NDJSON) and to the event bus (for
    /// any other subscriber, e.g. a future `/events` listener).
    pub fn pull_stream(&self, reference: &str) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(32);
        let backend = self.backend.clone();
        let events = self.events.clone();
        let reference = reference.to_string();
        tokio::spawn(async move {
            let (inner_tx, mut inner_rx) = mpsc::channel(32);
            let pull = tokio::spawn({
                let backend = backend.clone();
                let reference = reference.clone();
                async move { backend.pull(&reference, inner_tx).await }
            });
            while let Some(event) = inner_rx.recv().await {
                events.publish(Event::ImagePullProgress {
                    reference: reference.clone(),
                    status: event.status.clone(),
                    id: event.id.clone(),
                });
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            let _ = pull.await;
        });
        rx
    }

    pub fn load_oci_layout_stream(&self, dir: &Path) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(32);
        let backend = self.backend.clone();
        let dir = dir.to_path_buf();
        tokio::spawn(async move {
            let (inner_tx, mut inner_rx) = mpsc::channel(32);
            let load = tokio::spawn({
                let backend = backend.clone();
                let dir = dir.clone();
                async move { backend.load_oci_layout(&dir, inner_tx).await }
            });
            while let Some(event) = inner_rx.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            let _ = load.await;
        });
        rx
    }

    pub async fn delete(&self, reference: &str, force: bool, in_use: bool) -> ImageManagerResult<Vec<DeleteOutcome>> {
        if in_use && !force {
            return Err(ImageManagerError::Backend(ImageBackendError::InUse(reference.to_string())));
        }
        Ok(self.backend.delete(reference, force).await?)
    }

    /// Prune all images not named in `in_use_ids`. Returns the deleted image
    /// ids and 0 reclaimed bytes (the stub backend doesn't track real sizes).
    pub async fn prune(&self, in_use_ids: &[String]) -> ImageManagerResult<(Vec<String>, u64)> {
        let mut removed = Vec::new();
        let mut reclaimed = 0u64;
        for image in self.backend.list().await? {
            if in_use_ids.iter().any(|id| id == &image.id) {
                continue;
            }
            if self.backend.delete(&image.id, true).await.is_ok() {
                reclaimed += image.size_bytes;
                removed.push(image.id);
            }
        }
        Ok((removed, reclaimed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::StubImageBackend;

    #[tokio::test]
    async fn pull_stream_emits_terminal_pull_complete() {
        let mgr = ImageManager::new(Arc::new(StubImageBackend::new()), EventBus::new());
        let mut rx = mgr.pull_stream("alpine:latest");
        let mut statuses = Vec::new();
        while let Some(event) = rx.recv().await {
            statuses.push(event.status);
        }
        assert_eq!(statuses.last().unwrap(), "Pull complete");
    }

    #[tokio::test]
    async fn delete_in_use_without_force_is_rejected() {
        let mgr = ImageManager::new(Arc::new(StubImageBackend::new()), EventBus::new());
        let mut rx = mgr.pull_stream("alpine:latest");
        while rx.recv().await.is_some() {}
        let images = mgr.list(&ImageListFilters::default()).await.unwrap();
        let err = mgr.delete(&images[0].id, false, true).await.unwrap_err();
        assert!(matches!(err, ImageManagerError::Backend(ImageBackendError::InUse(_))));
    }
}
