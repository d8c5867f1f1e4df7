//! VM runtime and bridge controller collaborator traits
//!
//! The actual hypervisor (image fetch, rootfs construction, VM boot,
//! in-guest process execution) and the in-guest networking helper VM are
//! external collaborators. This module defines the narrow contracts the
//! managers consume and a stub implementation of each so the rest of the
//! daemon can be built and exercised without a real hypervisor attached.

mod stub;

pub use stub::{StubBridgeController, StubVmRuntime};

use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("vm handle not found: {0}")]
    HandleNotFound(String),

    #[error("vm already running")]
    AlreadyRunning,

    #[error("vm not running")]
    NotRunning,

    #[error("vsock dial timed out")]
    DialTimeout,

    #[error("bridge controller error: {0}")]
    Bridge(String),

    #[error("runtime operation failed: {0}")]
    Failed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn status(&self) -> StatusCode {
        match self {
            RuntimeError::HandleNotFound(_) => StatusCode::NOT_FOUND,
            RuntimeError::AlreadyRunning | RuntimeError::NotRunning => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Opaque handle identifying a created VM. Stable across daemon restarts is
/// NOT guaranteed; a restart always rebuilds a fresh handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VmHandle(pub String);

/// Declarative description of the workload a VM should run, built from a
/// container's persisted spec.
#[derive(Debug, Clone)]
pub struct VmSpec {
    pub container_id: String,
    pub image_id: String,
    pub command: Vec<String>,
    pub entrypoint: Vec<String>,
    pub env: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub tty: bool,
    pub memory_bytes: Option<u64>,
    pub cpu_shares: Option<u32>,
}

/// Description of a process to run inside an already-running VM (exec).
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub user: Option<String>,
    pub tty: bool,
    pub working_dir: Option<String>,
}

/// stdin/stdout/stderr plumbing handed to the runtime for a started
/// workload. The runtime reads from `stdin` and writes interleaved or
/// separate output depending on `tty`.
pub struct Io {
    pub stdin: Box<dyn AsyncRead + Send + Unpin>,
    pub stdout: Box<dyn AsyncWrite + Send + Unpin>,
    pub stderr: Box<dyn AsyncWrite + Send + Unpin>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExitStatus {
    pub code: i64,
    pub oom_killed: bool,
}

/// The core's contract with the external VM/container runtime (spec §6,
/// out of scope for this build): `create_vm`, `start`, `signal`, `wait`,
/// `dial_vsock`, `exec_in`.
#[async_trait]
pub trait VmRuntime: Send + Sync {
    async fn create_vm(&self, spec: VmSpec) -> RuntimeResult<VmHandle>;

    async fn destroy_vm(&self, handle: &VmHandle) -> RuntimeResult<()>;

    async fn start(&self, handle: &VmHandle, io: Io) -> RuntimeResult<()>;

    async fn signal(&self, handle: &VmHandle, signo: i32) -> RuntimeResult<()>;

    async fn wait(&self, handle: &VmHandle) -> RuntimeResult<ExitStatus>;

    /// Dial a vsock port on the guest, used for healthcheck probes and
    /// out-of-band control that doesn't go through stdio.
    async fn dial_vsock(
        &self,
        handle: &VmHandle,
        port: u32,
    ) -> RuntimeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;

    async fn exec_in(&self, handle: &VmHandle, spec: ExecSpec, io: Io) -> RuntimeResult<ExitStatus>;

    async fn resize_tty(&self, handle: &VmHandle, rows: u16, cols: u16) -> RuntimeResult<()>;
}

/// Endpoint attributes the bridge controller assigns on attach.
#[derive(Debug, Clone)]
pub struct BridgeEndpoint {
    pub ip: String,
    pub mac: String,
}

/// The core's contract with the in-guest networking helper VM (spec §6):
/// `create_bridge`, `delete_bridge`, `list_bridges`, `attach_port`,
/// `detach_port`, `health`.
#[async_trait]
pub trait BridgeController: Send + Sync {
    async fn create_bridge(&self, network_id: &str, subnet: &str, gateway: &str) -> RuntimeResult<()>;

    async fn delete_bridge(&self, network_id: &str) -> RuntimeResult<()>;

    async fn list_bridges(&self) -> RuntimeResult<Vec<String>>;

    async fn attach_port(
        &self,
        network_id: &str,
        port_id: &str,
        ip: &str,
        mac: &str,
    ) -> RuntimeResult<BridgeEndpoint>;

    async fn detach_port(&self, network_id: &str, port_id: &str) -> RuntimeResult<()>;

    async fn health(&self) -> RuntimeResult<()>;
}

/// Bounded retry for the exec vsock dial (spec §5: "bounded retry, ≤2s").
pub const VSOCK_DIAL_TIMEOUT: Duration = Duration::from_secs(2);
