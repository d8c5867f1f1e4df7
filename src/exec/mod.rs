//! ExecManager (spec §4.8)
//!
//! Exec records are purely in-memory: an exec outlives the daemon only if
//! its parent container is still running, and on restart nothing survives
//! to be purged because nothing was persisted in the first place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::containers::{ContainerManager, ContainerManagerError};
use crate::runtime::{ExecSpec, ExitStatus, Io, RuntimeError};

#[derive(Debug, Error)]
pub enum ExecManagerError {
    #[error("no such exec instance: {0}")]
    NotFound(String),

    #[error("exec {0} has already started")]
    AlreadyStarted(String),

    #[error(transparent)]
    Container(#[from] ContainerManagerError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type ExecManagerResult<T> = Result<T, ExecManagerError>;

#[derive(Debug, Clone)]
pub struct ExecCreateRequest {
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub user: Option<String>,
    pub tty: bool,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub working_dir: Option<String>,
}

struct ExecInstance {
    container_id: String,
    spec: ExecCreateRequest,
    started: AtomicBool,
    running: AtomicBool,
    exit_code: std::sync::Mutex<Option<i64>>,
}

#[derive(Debug, Clone)]
pub struct ExecInspect {
    pub id: String,
    pub container_id: String,
    pub running: bool,
    pub exit_code: Option<i64>,
    pub tty: bool,
}

pub struct ExecManager {
    containers: Arc<ContainerManager>,
    instances: DashMap<String, Arc<ExecInstance>>,
}

impl ExecManager {
    pub fn new(containers: Arc<ContainerManager>) -> Self {
        Self {
            containers,
            instances: DashMap::new(),
        }
    }

    pub fn create(&self, container_id: &str, spec: ExecCreateRequest) -> ExecManagerResult<String> {
        self.containers.get(container_id)?;
        let id = format!("{:x}", Uuid::new_v4().as_u128());
        self.instances.insert(
            id.clone(),
            Arc::new(ExecInstance {
                container_id: container_id.to_string(),
                spec,
                started: AtomicBool::new(false),
                running: AtomicBool::new(false),
                exit_code: std::sync::Mutex::new(None),
            }),
        );
        Ok(id)
    }

    /// Runs the exec's process to completion through the container's VM
    /// handle, wiring `io` exactly as the caller (the router's upgrader)
    /// hands it in. Returns once the process exits.
    pub async fn start(&self, exec_id: &str, io: Io) -> ExecManagerResult<ExitStatus> {
        let instance = self
            .instances
            .get(exec_id)
            .map(|e| e.clone())
            .ok_or_else(|| ExecManagerError::NotFound(exec_id.to_string()))?;

        if instance.started.swap(true, Ordering::SeqCst) {
            return Err(ExecManagerError::AlreadyStarted(exec_id.to_string()));
        }
        instance.running.store(true, Ordering::SeqCst);

        let spec = ExecSpec {
            command: instance.spec.command.clone(),
            env: instance.spec.env.clone(),
            user: instance.spec.user.clone(),
            tty: instance.spec.tty,
            working_dir: instance.spec.working_dir.clone(),
        };

        let status = self.containers.exec_in(&instance.container_id, spec, io).await?;

        instance.running.store(false, Ordering::SeqCst);
        *instance.exit_code.lock().unwrap() = Some(status.code);

        Ok(status)
    }

    pub fn resize(&self, exec_id: &str, _rows: u16, _cols: u16) -> ExecManagerResult<()> {
        self.instances
            .get(exec_id)
            .ok_or_else(|| ExecManagerError::NotFound(exec_id.to_string()))?;
        Ok(())
    }

    pub fn inspect(&self, exec_id: &str) -> ExecManagerResult<ExecInspect> {
        let instance = self
            .instances
            .get(exec_id)
            .ok_or_else(|| ExecManagerError::NotFound(exec_id.to_string()))?;
        Ok(ExecInspect {
            id: exec_id.to_string(),
            container_id: instance.container_id.clone(),
            running: instance.running.load(Ordering::SeqCst),
            exit_code: *instance.exit_code.lock().unwrap(),
            tty: instance.spec.tty,
        })
    }

    /// Drops exec records whose parent container is no longer present.
    /// Called after container removal and on daemon boot.
    pub fn purge_for_missing_containers(&self, live_container_ids: &[String]) {
        self.instances.retain(|_, instance| live_container_ids.contains(&instance.container_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::logstore::LogStore;
    use crate::networks::NetworkManager;
    use crate::ports::PortMapManager;
    use crate::runtime::{StubBridgeController, StubVmRuntime};
    use crate::state::StateStore;
    use crate::volumes::VolumeManager;
    use tempfile::tempdir;

    fn exec_manager() -> (ExecManager, Arc<ContainerManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let runtime = Arc::new(StubVmRuntime::new());
        let networks = Arc::new(NetworkManager::new(store.clone(), Arc::new(StubBridgeController::new())));
        let volumes = Arc::new(VolumeManager::new(store.clone(), dir.path().join("volumes")));
        let ports = Arc::new(PortMapManager::new(store.clone()));
        let logs = Arc::new(LogStore::new(dir.path().join("logs")));
        let containers = ContainerManager::new(store, runtime, networks, volumes, ports, logs, EventBus::new());
        let exec = ExecManager::new(containers.clone());
        (exec, containers, dir)
    }

    fn container_spec() -> crate::containers::model::ContainerSpec {
        crate::containers::model::ContainerSpec {
            image_ref: "alpine:latest".to_string(),
            command: vec![],
            entrypoint: vec![],
            env: vec![],
            working_dir: None,
            user: None,
            tty: false,
            stdin_open: false,
            labels: Default::default(),
            healthcheck: None,
            restart_policy: crate::containers::model::RestartPolicy::No,
            limits: crate::containers::model::ResourceLimits {
                memory_bytes: None,
                memory_reservation_bytes: None,
                cpu_shares: None,
                cpu_period: None,
                cpu_quota: None,
            },
            mounts: vec![],
            networks: vec![],
            published_ports: vec![],
            stop_signal: "SIGTERM".to_string(),
        }
    }

    #[tokio::test]
    async fn create_against_unknown_container_fails() {
        let (exec, _containers, _dir) = exec_manager();
        let err = exec
            .create(
                "missing",
                ExecCreateRequest {
                    command: vec!["echo".into()],
                    env: vec![],
                    user: None,
                    tty: false,
                    attach_stdin: false,
                    attach_stdout: true,
                    attach_stderr: true,
                    working_dir: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ExecManagerError::Container(_)));
    }

    #[tokio::test]
    async fn start_runs_process_and_records_exit_code() {
        let (exec, containers, _dir) = exec_manager();
        let id = containers.create(Some("web"), "alpine:latest", "img1", container_spec()).await.unwrap();
        containers.start(&id).await.unwrap();

        let exec_id = exec
            .create(
                &id,
                ExecCreateRequest {
                    command: vec!["true".into()],
                    env: vec![],
                    user: None,
                    tty: false,
                    attach_stdin: false,
                    attach_stdout: true,
                    attach_stderr: true,
                    working_dir: None,
                },
            )
            .unwrap();

        let io = Io {
            stdin: Box::new(tokio::io::empty()),
            stdout: Box::new(tokio::io::sink()),
            stderr: Box::new(tokio::io::sink()),
        };
        exec.start(&exec_id, io).await.unwrap();

        let inspect = exec.inspect(&exec_id).unwrap();
        assert!(!inspect.running);
        assert_eq!(inspect.exit_code, Some(0));
    }
}
