//! VolumeManager (spec §4.5)

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::filesystem::{FilesystemError, SafePath};
use crate::state::{StateStore, VolumeRow};

#[derive(Debug, Error)]
pub enum VolumeManagerError {
    #[error("get {0}: no such volume")]
    NotFound(String),

    #[error("volume {0} already exists")]
    AlreadyExists(String),

    #[error("volume {0} is in use")]
    InUse(String),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    #[error(transparent)]
    State(#[from] crate::state::StateError),
}

pub type VolumeManagerResult<T> = Result<T, VolumeManagerError>;

pub struct VolumeManager {
    store: Arc<StateStore>,
    root: PathBuf,
}

impl VolumeManager {
    pub fn new(store: Arc<StateStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    pub fn mountpoint(&self, name: &str) -> Result<PathBuf, FilesystemError> {
        Ok(SafePath::new(&self.root, name)?.resolved().to_path_buf())
    }

    pub fn create(
        &self,
        name: Option<&str>,
        labels: Value,
        options: Value,
    ) -> VolumeManagerResult<VolumeRow> {
        let (name, anonymous) = match name {
            Some(n) => (n.to_string(), false),
            None => (format!("{:x}", Uuid::new_v4().as_u128()), true),
        };

        if self.store.get_volume(&name)?.is_some() {
            if anonymous {
                return Err(VolumeManagerError::AlreadyExists(name));
            }
            return Err(VolumeManagerError::AlreadyExists(name));
        }

        let mountpoint = self.mountpoint(&name)?;
        std::fs::create_dir_all(&mountpoint).map_err(FilesystemError::Io)?;

        let row = VolumeRow {
            name: name.clone(),
            driver: "local".to_string(),
            mountpoint: mountpoint.to_string_lossy().to_string(),
            labels_json: labels,
            options_json: options,
            anonymous,
            refcount: 0,
        };
        self.store.insert_volume(&row)?;
        Ok(row)
    }

    pub fn get(&self, name: &str) -> VolumeManagerResult<VolumeRow> {
        self.store
            .get_volume(name)?
            .ok_or_else(|| VolumeManagerError::NotFound(name.to_string()))
    }

    pub fn list(&self, label_filter: &[(String, Option<String>)]) -> VolumeManagerResult<Vec<VolumeRow>> {
        let mut rows = self.store.list_volumes()?;
        for (key, value) in label_filter {
            rows.retain(|r| {
                let Some(obj) = r.labels_json.as_object() else {
                    return false;
                };
                match value {
                    Some(v) => obj.get(key).and_then(|x| x.as_str()) == Some(v.as_str()),
                    None => obj.contains_key(key),
                }
            });
        }
        Ok(rows)
    }

    pub fn remove(&self, name: &str, force: bool) -> VolumeManagerResult<()> {
        let row = self.get(name)?;
        if row.refcount > 0 && !force {
            return Err(VolumeManagerError::InUse(name.to_string()));
        }
        let mountpoint = PathBuf::from(&row.mountpoint);
        if mountpoint.exists() {
            std::fs::remove_dir_all(&mountpoint).map_err(FilesystemError::Io)?;
        }
        self.store.delete_volume(name)?;
        Ok(())
    }

    pub fn incref(&self, name: &str) -> VolumeManagerResult<()> {
        self.store.adjust_volume_refcount(name, 1)?;
        Ok(())
    }

    pub fn decref(&self, name: &str) -> VolumeManagerResult<()> {
        self.store.adjust_volume_refcount(name, -1)?;
        Ok(())
    }

    /// Ensure a named/anonymous volume exists, creating it with defaults if
    /// missing. Used by container create for declared mounts without a
    /// pre-existing source (spec §4.1: "anonymous volumes... materialized
    /// here").
    pub fn ensure(&self, name: &str) -> VolumeManagerResult<VolumeRow> {
        match self.store.get_volume(name)? {
            Some(row) => Ok(row),
            None => {
                let mountpoint = self.mountpoint(name)?;
                std::fs::create_dir_all(&mountpoint).map_err(FilesystemError::Io)?;
                let row = VolumeRow {
                    name: name.to_string(),
                    driver: "local".to_string(),
                    mountpoint: mountpoint.to_string_lossy().to_string(),
                    labels_json: json!({}),
                    options_json: json!({}),
                    anonymous: false,
                    refcount: 0,
                };
                self.store.insert_volume(&row)?;
                Ok(row)
            }
        }
    }

    pub fn prune(&self, label_filter: &[(String, Option<String>)]) -> VolumeManagerResult<(Vec<String>, u64)> {
        let mut removed = Vec::new();
        let mut reclaimed = 0u64;
        for row in self.store.list_volumes()? {
            if row.refcount > 0 {
                continue;
            }
            let matches = label_filter.iter().all(|(key, value)| {
                let Some(obj) = row.labels_json.as_object() else {
                    return false;
                };
                match value {
                    Some(v) => obj.get(key).and_then(|x| x.as_str()) == Some(v.as_str()),
                    None => obj.contains_key(key),
                }
            });
            if !matches {
                continue;
            }
            let mountpoint = PathBuf::from(&row.mountpoint);
            if let Ok(size) = dir_size(&mountpoint) {
                reclaimed += size;
            }
            if mountpoint.exists() {
                std::fs::remove_dir_all(&mountpoint).map_err(FilesystemError::Io)?;
            }
            self.store.delete_volume(&row.name)?;
            removed.push(row.name);
        }
        Ok((removed, reclaimed))
    }
}

fn dir_size(path: &PathBuf) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in walkdir::WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager() -> (VolumeManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let mgr = VolumeManager::new(Arc::new(StateStore::open_in_memory().unwrap()), dir.path());
        (mgr, dir)
    }

    #[test]
    fn create_named_volume_makes_mountpoint() {
        let (mgr, _dir) = manager();
        let row = mgr.create(Some("data"), json!({}), json!({})).unwrap();
        assert!(PathBuf::from(&row.mountpoint).exists());
        assert!(!row.anonymous);
    }

    #[test]
    fn remove_with_refcount_requires_force() {
        let (mgr, _dir) = manager();
        mgr.create(Some("data"), json!({}), json!({})).unwrap();
        mgr.incref("data").unwrap();
        assert!(matches!(mgr.remove("data", false), Err(VolumeManagerError::InUse(_))));
        mgr.remove("data", true).unwrap();
    }
}
