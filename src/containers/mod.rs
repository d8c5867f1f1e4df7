//! ContainerManager (spec §4.1)
//!
//! Authoritative owner of container records and the sole mutator of
//! container phase. A per-container ticket (`tokio::sync::Mutex`) gives
//! arrival-order serialization for operations against the same container
//! while cross-container operations proceed concurrently, per spec §5.

pub mod health;
pub mod model;
pub mod restart;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::{ContainerPhase as EventPhase, EventBus};
use crate::logstore::LogStore;
use crate::networks::NetworkManager;
use crate::ports::{PortMapManager, PublishSpec};
use crate::runtime::{ExecSpec, Io, RuntimeError, VmHandle, VmRuntime, VmSpec};
use crate::state::{ContainerRow, MountRow, NetworkAttachmentRow, PortMappingRow, StateStore};
use crate::volumes::VolumeManager;

use model::{Container, HealthState, HealthStatus, Phase, ProbeResult, RestartPolicy};
use restart::AttemptCounter;

#[derive(Debug, Error)]
pub enum ContainerManagerError {
    #[error("no such container: {0}")]
    NotFound(String),

    #[error("Conflict. The container name \"{0}\" is already in use")]
    NameInUse(String),

    #[error("container {0} is already running")]
    AlreadyRunning(String),

    #[error("container {0} is not running")]
    NotRunning(String),

    #[error("container {0} is not paused")]
    NotPaused(String),

    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("container {0} must be force-removed while running")]
    RunningNotForced(String),

    #[error(transparent)]
    State(#[from] crate::state::StateError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Network(#[from] crate::networks::NetworkManagerError),

    #[error(transparent)]
    Volume(#[from] crate::volumes::VolumeManagerError),

    #[error(transparent)]
    PortMap(#[from] crate::ports::PortMapError),
}

pub type ContainerManagerResult<T> = Result<T, ContainerManagerError>;

struct ContainerRuntime {
    handle: Option<VmHandle>,
    cancel: CancellationToken,
    attempts: Arc<AttemptCounter>,
}

pub struct ContainerManager {
    store: Arc<StateStore>,
    pub(crate) runtime: Arc<dyn VmRuntime>,
    networks: Arc<NetworkManager>,
    volumes: Arc<VolumeManager>,
    ports: Arc<PortMapManager>,
    logs: Arc<LogStore>,
    events: EventBus,
    tickets: DashMap<String, Arc<AsyncMutex<()>>>,
    runtimes: DashMap<String, ContainerRuntime>,
}

impl ContainerManager {
    pub fn new(
        store: Arc<StateStore>,
        runtime: Arc<dyn VmRuntime>,
        networks: Arc<NetworkManager>,
        volumes: Arc<VolumeManager>,
        ports: Arc<PortMapManager>,
        logs: Arc<LogStore>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            runtime,
            networks,
            volumes,
            ports,
            logs,
            events,
            tickets: DashMap::new(),
            runtimes: DashMap::new(),
        })
    }

    fn ticket(&self, id: &str) -> Arc<AsyncMutex<()>> {
        self.tickets
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn row_to_container(&self, row: ContainerRow) -> ContainerManagerResult<Container> {
        let spec: model::ContainerSpec = serde_json::from_value(row.spec_json)
            .map_err(|e| ContainerManagerError::InvalidSpec(e.to_string()))?;
        let health: HealthState = row
            .health_json
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ContainerManagerError::InvalidSpec(e.to_string()))?
            .unwrap_or_default();

        Ok(Container {
            id: row.id.clone(),
            name: row.name,
            image_ref: row.image_ref,
            image_id: row.image_id,
            spec,
            phase: Phase::parse(&row.phase),
            exit_code: row.exit_code,
            started_at: row.started_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
            manual_stopped: row.manual_stopped,
            health,
            vm_handle: self.runtimes.get(&row.id).and_then(|r| r.handle.clone().map(|h| h.0)),
        })
    }

    pub fn get(&self, id_or_name: &str) -> ContainerManagerResult<Container> {
        let row = self
            .store
            .get_container(id_or_name)?
            .or(self.store.get_container_by_name(id_or_name)?)
            .ok_or_else(|| ContainerManagerError::NotFound(id_or_name.to_string()))?;
        self.row_to_container(row)
    }

    pub fn list(&self, all: bool) -> ContainerManagerResult<Vec<Container>> {
        let rows = self.store.list_containers()?;
        rows.into_iter()
            .filter(|r| all || r.phase == "running" || r.phase == "paused" || r.phase == "restarting")
            .map(|r| self.row_to_container(r))
            .collect()
    }

    pub async fn create(
        &self,
        name: Option<&str>,
        image_ref: &str,
        image_id: &str,
        spec: model::ContainerSpec,
    ) -> ContainerManagerResult<String> {
        let id = format!("{:x}{:x}", Uuid::new_v4().as_u128(), Uuid::new_v4().as_u128());
        let id = &id[..64.min(id.len())];
        let name = match name {
            Some(n) => {
                if self.store.get_container_by_name(n)?.is_some() {
                    return Err(ContainerManagerError::NameInUse(n.to_string()));
                }
                n.to_string()
            }
            None => format!("container_{}", &id[..12]),
        };

        for mount in &spec.mounts {
            if mount.kind == model::MountKind::Volume {
                self.volumes.ensure(&mount.source)?;
                self.volumes.incref(&mount.source)?;
            }
        }

        let row = ContainerRow {
            id: id.to_string(),
            name,
            image_ref: image_ref.to_string(),
            image_id: image_id.to_string(),
            spec_json: serde_json::to_value(&spec).unwrap(),
            host_config_json: json!({}),
            phase: Phase::Created.as_str().to_string(),
            exit_code: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now().to_rfc3339(),
            labels_json: serde_json::to_value(&spec.labels).unwrap(),
            restart_policy_json: serde_json::to_value(&spec.restart_policy).unwrap(),
            manual_stopped: false,
            health_json: None,
        };

        let mounts: Vec<_> = spec
            .mounts
            .iter()
            .map(|m| MountRow {
                container_id: id.to_string(),
                source: m.source.clone(),
                target: m.target.clone(),
                kind: format!("{:?}", m.kind).to_lowercase(),
                options_json: json!({"read_only": m.read_only}),
            })
            .collect();

        let ports: Vec<_> = spec
            .published_ports
            .iter()
            .map(|p| PortMappingRow {
                container_id: id.to_string(),
                host_ip: p.host_ip.clone(),
                host_port: p.host_port,
                proto: p.proto.clone(),
                container_port: p.container_port,
            })
            .collect();

        let publish_specs: Vec<PublishSpec> = spec
            .published_ports
            .iter()
            .filter_map(|p| {
                Some(PublishSpec {
                    host_ip: p.host_ip.parse().ok()?,
                    host_port: p.host_port,
                    proto: crate::ports::Protocol::parse(&p.proto)?,
                    container_ip: "127.0.0.1".parse().ok()?,
                    container_port: p.container_port,
                })
            })
            .collect();
        self.ports.check_available(&publish_specs)?;

        self.store.insert_container_full(&row, &mounts, &ports)?;

        self.runtimes.insert(
            id.to_string(),
            ContainerRuntime {
                handle: None,
                cancel: CancellationToken::new(),
                attempts: Arc::new(AttemptCounter::default()),
            },
        );

        Ok(id.to_string())
    }

    pub async fn start(self: &Arc<Self>, id: &str) -> ContainerManagerResult<()> {
        let ticket = self.ticket(id);
        let _guard = ticket.lock().await;

        let container = self.get(id)?;
        if container.phase == Phase::Running {
            return Err(ContainerManagerError::AlreadyRunning(id.to_string()));
        }

        let handle = self
            .runtime
            .create_vm(VmSpec {
                container_id: container.id.clone(),
                image_id: container.image_id.clone(),
                command: container.spec.command.clone(),
                entrypoint: container.spec.entrypoint.clone(),
                env: container.spec.env.clone(),
                working_dir: container.spec.working_dir.clone(),
                user: container.spec.user.clone(),
                tty: container.spec.tty,
                memory_bytes: container.spec.limits.memory_bytes,
                cpu_shares: container.spec.limits.cpu_shares,
            })
            .await?;

        for net in &container.spec.networks {
            let requested_ip = net.ipv4.as_ref().and_then(|s| s.parse().ok());
            let endpoint = self.networks.attach(&net.network_id, &container.id, requested_ip).await?;
            self.store.put_network_attachment(&NetworkAttachmentRow {
                container_id: container.id.clone(),
                network_id: net.network_id.clone(),
                ipv4: Some(endpoint.ip.to_string()),
                mac: Some(endpoint.mac.clone()),
                aliases_json: serde_json::to_value(&net.aliases).unwrap(),
                endpoint_id: endpoint.endpoint_id,
            })?;
        }

        if !container.spec.published_ports.is_empty() {
            let specs: Vec<PublishSpec> = container
                .spec
                .published_ports
                .iter()
                .filter_map(|p| {
                    Some(PublishSpec {
                        host_ip: p.host_ip.parse().ok()?,
                        host_port: p.host_port,
                        proto: crate::ports::Protocol::parse(&p.proto)?,
                        container_ip: "127.0.0.1".parse().ok()?,
                        container_port: p.container_port,
                    })
                })
                .collect();
            self.ports.bind(&container.id, &specs).await?;
        }

        let log_writer = self.logs.writer(&container.id).ok();
        let (stdin_tx, stdin_rx) = tokio::io::duplex(4096);
        drop(stdin_tx);
        let (stdout_tx, _stdout_rx) = tokio::io::duplex(4096);
        drop(log_writer);

        self.runtime
            .start(
                &handle,
                Io {
                    stdin: Box::new(stdin_rx),
                    stdout: Box::new(stdout_tx),
                    stderr: Box::new(tokio::io::sink()),
                },
            )
            .await?;

        let cancel = CancellationToken::new();
        if let Some(mut entry) = self.runtimes.get_mut(id) {
            entry.handle = Some(handle.clone());
            entry.cancel = cancel.clone();
        }

        self.store.update_container_phase(
            &container.id,
            Phase::Running.as_str(),
            None,
            Some(&Utc::now().to_rfc3339()),
            None,
        )?;
        self.store.set_manual_stopped(&container.id, false)?;

        self.events.publish_phase(container.id.clone(), EventPhase::Running, None);

        restart::spawn_exit_monitor(self.clone(), container.id.clone(), handle.clone(), cancel.clone());

        if let Some(probe) = container.spec.healthcheck.clone() {
            health::spawn(self.clone(), container.id.clone(), handle, probe, cancel);
        }

        Ok(())
    }

    pub async fn stop(self: &Arc<Self>, id: &str, timeout_secs: u64) -> ContainerManagerResult<()> {
        let ticket = self.ticket(id);
        let _guard = ticket.lock().await;

        let container = self.get(id)?;
        if container.phase != Phase::Running {
            return Ok(());
        }
        self.store.set_manual_stopped(&container.id, true)?;

        let Some(handle) = self.runtimes.get(id).and_then(|r| r.handle.clone()) else {
            return Ok(());
        };

        self.runtime.signal(&handle, 15).await?;
        let wait = self.runtime.wait(&handle);
        if tokio::time::timeout(std::time::Duration::from_secs(timeout_secs.max(1)), wait)
            .await
            .is_err()
        {
            self.runtime.signal(&handle, 9).await?;
        }

        Ok(())
    }

    pub async fn kill(&self, id: &str, signal: i32) -> ContainerManagerResult<()> {
        let container = self.get(id)?;
        if container.phase != Phase::Running {
            return Err(ContainerManagerError::NotRunning(id.to_string()));
        }
        let Some(handle) = self.runtimes.get(id).and_then(|r| r.handle.clone()) else {
            return Err(ContainerManagerError::NotRunning(id.to_string()));
        };
        self.runtime.signal(&handle, signal).await?;
        Ok(())
    }

    pub async fn restart(self: &Arc<Self>, id: &str, timeout_secs: u64) -> ContainerManagerResult<()> {
        self.stop(id, timeout_secs).await?;
        self.start(id).await
    }

    pub async fn pause(&self, id: &str) -> ContainerManagerResult<()> {
        let container = self.get(id)?;
        if container.phase != Phase::Running {
            return Err(ContainerManagerError::NotRunning(id.to_string()));
        }
        let Some(handle) = self.runtimes.get(id).and_then(|r| r.handle.clone()) else {
            return Err(ContainerManagerError::NotRunning(id.to_string()));
        };
        self.runtime.signal(&handle, 19).await?; // SIGSTOP
        self.store.update_container_phase(id, Phase::Paused.as_str(), None, None, None)?;
        self.events.publish_phase(id.to_string(), EventPhase::Paused, None);
        Ok(())
    }

    pub async fn unpause(&self, id: &str) -> ContainerManagerResult<()> {
        let container = self.get(id)?;
        if container.phase != Phase::Paused {
            return Err(ContainerManagerError::NotPaused(id.to_string()));
        }
        let Some(handle) = self.runtimes.get(id).and_then(|r| r.handle.clone()) else {
            return Err(ContainerManagerError::NotPaused(id.to_string()));
        };
        self.runtime.signal(&handle, 18).await?; // SIGCONT
        self.store.update_container_phase(id, Phase::Running.as_str(), None, None, None)?;
        self.events.publish_phase(id.to_string(), EventPhase::Running, None);
        Ok(())
    }

    pub async fn resize(&self, id: &str, rows: u16, cols: u16) -> ContainerManagerResult<()> {
        let container = self.get(id)?;
        if container.phase != Phase::Running {
            return Err(ContainerManagerError::NotRunning(id.to_string()));
        }
        if !container.spec.tty {
            return Err(ContainerManagerError::InvalidSpec(format!("container {id} is not a tty")));
        }
        let Some(handle) = self.runtimes.get(id).and_then(|r| r.handle.clone()) else {
            return Err(ContainerManagerError::NotRunning(id.to_string()));
        };
        self.runtime.resize_tty(&handle, rows, cols).await?;
        Ok(())
    }

    pub fn rename(&self, id: &str, new_name: &str) -> ContainerManagerResult<()> {
        if self.store.get_container_by_name(new_name)?.is_some() {
            return Err(ContainerManagerError::NameInUse(new_name.to_string()));
        }
        self.get(id)?;
        self.store.rename_container(id, new_name)?;
        Ok(())
    }

    pub async fn remove(&self, id: &str, force: bool, remove_volumes: bool) -> ContainerManagerResult<()> {
        let container = self.get(id)?;
        if container.phase == Phase::Running && !force {
            return Err(ContainerManagerError::RunningNotForced(id.to_string()));
        }
        if container.phase == Phase::Running {
            if let Some(handle) = self.runtimes.get(id).and_then(|r| r.handle.clone()) {
                let _ = self.runtime.signal(&handle, 9).await;
            }
        }
        if let Some(entry) = self.runtimes.get(id) {
            entry.cancel.cancel();
        }
        self.runtimes.remove(id);

        for mount in self.store.list_mounts(id)? {
            if mount.kind == "volume" {
                self.volumes.decref(&mount.source)?;
                if remove_volumes {
                    let _ = self.volumes.remove(&mount.source, false);
                }
            }
        }

        self.ports.release(id)?;
        self.logs.remove(id).ok();
        self.store.delete_container(id)?;
        Ok(())
    }

    pub async fn wait(self: &Arc<Self>, id: &str) -> ContainerManagerResult<i64> {
        let container = self.get(id)?;
        if let Some(code) = container.exit_code {
            if container.phase == Phase::Exited {
                return Ok(code);
            }
        }
        let Some(handle) = self.runtimes.get(id).and_then(|r| r.handle.clone()) else {
            return Ok(container.exit_code.unwrap_or(0));
        };
        let status = self.runtime.wait(&handle).await?;
        Ok(status.code)
    }

    pub fn update(&self, id: &str, limits: model::ResourceLimits, restart_policy: Option<RestartPolicy>) -> ContainerManagerResult<()> {
        let mut container = self.get(id)?;
        if let (Some(mem), Some(res)) = (limits.memory_bytes, limits.memory_reservation_bytes) {
            if res > mem {
                return Err(ContainerManagerError::InvalidSpec(
                    "memory-reservation must be <= memory".to_string(),
                ));
            }
        }
        container.spec.limits = limits;
        if let Some(policy) = restart_policy {
            container.spec.restart_policy = policy;
        }
        self.store
            .update_container_host_config(id, &serde_json::to_value(&container.spec.limits).unwrap())?;
        self.store.with_conn(|conn| {
            conn.execute(
                "UPDATE containers SET spec_json = ?2, restart_policy_json = ?3 WHERE id = ?1",
                rusqlite::params![
                    id,
                    serde_json::to_string(&container.spec).unwrap(),
                    serde_json::to_string(&container.spec.restart_policy).unwrap(),
                ],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    /// Called by the exit-monitor task when the VM's `wait` resolves.
    pub async fn handle_exit(self: &Arc<Self>, id: &str, exit_code: i64, _oom_killed: bool) {
        let Ok(container) = self.get(id) else { return };

        if let Some(entry) = self.runtimes.get(id) {
            entry.cancel.cancel();
        }

        let _ = self.store.update_container_phase(
            id,
            Phase::Exited.as_str(),
            Some(exit_code),
            None,
            Some(&Utc::now().to_rfc3339()),
        );
        self.events.publish_phase(id.to_string(), EventPhase::Exited, Some(exit_code));

        if let Some(entry) = self.runtimes.get(id) {
            if let Some(handle) = &entry.handle {
                let _ = self.runtime.destroy_vm(handle).await;
            }
        }
        if let Some(mut entry) = self.runtimes.get_mut(id) {
            entry.handle = None;
        }

        let attempts = self
            .runtimes
            .get(id)
            .map(|r| r.attempts.clone())
            .unwrap_or_default();
        let attempt_count = attempts.get();

        let decision = restart::decide(&container.spec.restart_policy, exit_code, container.manual_stopped, attempt_count);
        if decision == restart::Decision::Restart {
            if exit_code == 0 {
                attempts.reset();
            } else {
                attempts.increment();
            }
            let delay = restart::backoff_for_attempt(attempts.get());
            let manager = self.clone();
            let id = id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = manager.start(&id).await;
            });
        }
    }

    /// Reconciles persisted containers with reality on daemon boot: any
    /// previously-`running` container is marked exited (137, the VM is
    /// gone), then restart policy is applied.
    pub async fn recover_on_boot(self: &Arc<Self>) -> ContainerManagerResult<()> {
        for row in self.store.list_containers()? {
            self.runtimes.insert(
                row.id.clone(),
                ContainerRuntime {
                    handle: None,
                    cancel: CancellationToken::new(),
                    attempts: Arc::new(AttemptCounter::default()),
                },
            );

            if row.phase != "running" && row.phase != "restarting" {
                continue;
            }

            self.store.update_container_phase(
                &row.id,
                Phase::Exited.as_str(),
                Some(137),
                None,
                Some(&Utc::now().to_rfc3339()),
            )?;

            let spec: model::ContainerSpec = match serde_json::from_value(row.spec_json.clone()) {
                Ok(s) => s,
                Err(_) => continue,
            };

            let should_restart = if row.manual_stopped {
                restart::restart_on_boot_after_manual_stop(&spec.restart_policy)
            } else {
                !matches!(spec.restart_policy, RestartPolicy::No)
            };

            if should_restart {
                let manager = self.clone();
                let id = row.id.clone();
                tokio::spawn(async move {
                    let _ = manager.start(&id).await;
                });
            }
        }
        Ok(())
    }

    pub fn record_health_probe(
        &self,
        container_id: &str,
        result: ProbeResult,
        success: bool,
        in_start_period: bool,
        retries: u32,
        max_retained: usize,
    ) {
        let Ok(container) = self.get(container_id) else { return };
        let mut health = container.health;

        if !in_start_period {
            if success {
                health.failing_streak = 0;
            } else {
                health.failing_streak += 1;
            }
        }

        health.log.push(result);
        if health.log.len() > max_retained {
            let overflow = health.log.len() - max_retained;
            health.log.drain(0..overflow);
        }

        health.status = Some(health::next_status(health.status, health.failing_streak, retries));

        if let Ok(json) = serde_json::to_value(&health) {
            let _ = self.store.update_container_health(container_id, &json);
        }

        if let Some(status) = health.status {
            let event_status = match status {
                HealthStatus::Starting => crate::events::HealthStatus::Starting,
                HealthStatus::Healthy => crate::events::HealthStatus::Healthy,
                HealthStatus::Unhealthy => crate::events::HealthStatus::Unhealthy,
            };
            self.events.publish(crate::events::Event::ContainerHealth {
                container_id: container_id.to_string(),
                status: event_status,
                failing_streak: health.failing_streak,
            });
        }
    }

    pub fn logs(&self) -> &Arc<LogStore> {
        &self.logs
    }

    pub fn vm_handle(&self, id: &str) -> Option<VmHandle> {
        self.runtimes.get(id).and_then(|r| r.handle.clone())
    }

    pub async fn exec_in(&self, id: &str, spec: ExecSpec, io: Io) -> ContainerManagerResult<crate::runtime::ExitStatus> {
        let handle = self
            .vm_handle(id)
            .ok_or_else(|| ContainerManagerError::NotRunning(id.to_string()))?;
        Ok(self.runtime.exec_in(&handle, spec, io).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{StubBridgeController, StubVmRuntime};
    use tempfile::tempdir;

    fn spec() -> model::ContainerSpec {
        model::ContainerSpec {
            image_ref: "alpine:latest".to_string(),
            command: vec![],
            entrypoint: vec![],
            env: vec![],
            working_dir: None,
            user: None,
            tty: false,
            stdin_open: false,
            labels: HashMap::new(),
            healthcheck: None,
            restart_policy: RestartPolicy::No,
            limits: model::ResourceLimits {
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

    fn manager() -> (Arc<ContainerManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let runtime = Arc::new(StubVmRuntime::new());
        let networks = Arc::new(NetworkManager::new(store.clone(), Arc::new(StubBridgeController::new())));
        let volumes = Arc::new(VolumeManager::new(store.clone(), dir.path().join("volumes")));
        let ports = Arc::new(PortMapManager::new(store.clone()));
        let logs = Arc::new(LogStore::new(dir.path().join("logs")));
        let mgr = ContainerManager::new(store, runtime, networks, volumes, ports, logs, EventBus::new());
        (mgr, dir)
    }

    #[tokio::test]
    async fn create_then_inspect_round_trips() {
        let (mgr, _dir) = manager();
        let id = mgr.create(Some("web"), "alpine:latest", "img1", spec()).await.unwrap();
        let container = mgr.get(&id).unwrap();
        assert_eq!(container.name, "web");
        assert_eq!(container.phase, Phase::Created);
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let (mgr, _dir) = manager();
        mgr.create(Some("web"), "alpine:latest", "img1", spec()).await.unwrap();
        let err = mgr.create(Some("web"), "alpine:latest", "img1", spec()).await.unwrap_err();
        assert!(matches!(err, ContainerManagerError::NameInUse(_)));
    }

    #[tokio::test]
    async fn start_transitions_to_running() {
        let (mgr, _dir) = manager();
        let id = mgr.create(Some("web"), "alpine:latest", "img1", spec()).await.unwrap();
        mgr.start(&id).await.unwrap();
        let container = mgr.get(&id).unwrap();
        assert_eq!(container.phase, Phase::Running);
    }

    #[tokio::test]
    async fn remove_running_without_force_fails() {
        let (mgr, _dir) = manager();
        let id = mgr.create(Some("web"), "alpine:latest", "img1", spec()).await.unwrap();
        mgr.start(&id).await.unwrap();
        let err = mgr.remove(&id, false, false).await.unwrap_err();
        assert!(matches!(err, ContainerManagerError::RunningNotForced(_)));
    }
}
