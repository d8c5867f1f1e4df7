//! Per-container log storage
//!
//! Each container gets `stdout.log`/`stderr.log` under the daemon's log
//! directory. Every line is a self-describing JSON record so a reader never
//! needs to track byte offsets across restarts: `{time, stream, log}`.

mod frame;
mod reader;
mod writer;

pub use frame::{encode_frame, StreamType};
pub use reader::{LogQuery, LogReader};
pub use writer::LogWriter;

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type LogStoreResult<T> = Result<T, LogStoreError>;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogRecord {
    pub time: chrono::DateTime<chrono::Utc>,
    pub stream: String,
    pub log: String,
}

/// Resolves the stdout/stderr log file paths for a container.
pub struct LogStore {
    root: PathBuf,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn container_dir(&self, container_id: &str) -> PathBuf {
        self.root.join(container_id)
    }

    pub fn stdout_path(&self, container_id: &str) -> PathBuf {
        self.container_dir(container_id).join("stdout.log")
    }

    pub fn stderr_path(&self, container_id: &str) -> PathBuf {
        self.container_dir(container_id).join("stderr.log")
    }

    pub fn writer(&self, container_id: &str) -> LogStoreResult<LogWriter> {
        let dir = self.container_dir(container_id);
        std::fs::create_dir_all(&dir)?;
        LogWriter::open(self.stdout_path(container_id), self.stderr_path(container_id))
    }

    pub fn reader(&self, container_id: &str) -> LogReader {
        LogReader::new(self.stdout_path(container_id), self.stderr_path(container_id))
    }

    pub fn remove(&self, container_id: &str) -> LogStoreResult<()> {
        let dir = self.container_dir(container_id);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

pub(crate) fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
