//! Container record types exchanged between the manager, the state store,
//! and the router's handlers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Removing,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Created => "created",
            Phase::Running => "running",
            Phase::Paused => "paused",
            Phase::Restarting => "restarting",
            Phase::Exited => "exited",
            Phase::Dead => "dead",
            Phase::Removing => "removing",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => Phase::Running,
            "paused" => Phase::Paused,
            "restarting" => Phase::Restarting,
            "exited" => Phase::Exited,
            "dead" => Phase::Dead,
            "removing" => Phase::Removing,
            _ => Phase::Created,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    OnFailure { max_retries: u32 },
    Always,
    UnlessStopped,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::No
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Bind,
    Volume,
    Tmpfs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSpec {
    pub source: String,
    pub target: String,
    pub kind: MountKind,
    pub read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthcheckSpec {
    pub test: Vec<String>,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub retries: u32,
    pub start_period_secs: u64,
    pub start_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
    pub exit_code: i64,
    pub output: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthState {
    pub status: Option<HealthStatus>,
    pub failing_streak: u32,
    pub log: Vec<ProbeResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_bytes: Option<u64>,
    pub memory_reservation_bytes: Option<u64>,
    pub cpu_shares: Option<u32>,
    pub cpu_period: Option<i64>,
    pub cpu_quota: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRequest {
    pub network_id: String,
    pub ipv4: Option<String>,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPort {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
    pub proto: String,
}

/// Immutable-after-create container spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image_ref: String,
    pub command: Vec<String>,
    pub entrypoint: Vec<String>,
    pub env: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub tty: bool,
    pub stdin_open: bool,
    pub labels: HashMap<String, String>,
    pub healthcheck: Option<HealthcheckSpec>,
    pub restart_policy: RestartPolicy,
    pub limits: ResourceLimits,
    pub mounts: Vec<MountSpec>,
    pub networks: Vec<NetworkRequest>,
    pub published_ports: Vec<PublishedPort>,
    pub stop_signal: String,
}

/// Full container record as persisted and returned from inspect.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image_ref: String,
    pub image_id: String,
    pub spec: ContainerSpec,
    pub phase: Phase,
    pub exit_code: Option<i64>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
    pub manual_stopped: bool,
    pub health: HealthState,
    pub vm_handle: Option<String>,
}

impl Container {
    pub fn restart_policy_to_json(&self) -> Value {
        serde_json::to_value(&self.spec.restart_policy).unwrap_or(Value::Null)
    }
}
