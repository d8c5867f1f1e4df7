//! In-process stand-ins for the external VM runtime and bridge controller.
//!
//! These exist so the daemon's request-handling and lifecycle engine can be
//! built and its tests run without a real hypervisor or networking helper VM
//! attached. They satisfy the trait contracts literally (spawn a tracked
//! handle, echo stdin to stdout, resolve `wait` on an explicit signal) rather
//! than attempting process execution.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Notify;
use uuid::Uuid;

use super::{
    BridgeController, BridgeEndpoint, ExecSpec, ExitStatus, Io, RuntimeError, RuntimeResult,
    VmHandle, VmRuntime, VmSpec,
};

struct VmState {
    exit_code: AtomicI64,
    exited: Notify,
    has_exited: std::sync::atomic::AtomicBool,
}

/// Stub `VmRuntime` tracking handles in memory. `start` copies stdin to
/// stdout until EOF and then marks the VM exited with code 0, which is
/// enough for the container lifecycle state machine and tests to exercise
/// every transition without a hypervisor.
pub struct StubVmRuntime {
    vms: DashMap<String, Arc<VmState>>,
}

impl StubVmRuntime {
    pub fn new() -> Self {
        Self {
            vms: DashMap::new(),
        }
    }
}

impl Default for StubVmRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VmRuntime for StubVmRuntime {
    async fn create_vm(&self, spec: VmSpec) -> RuntimeResult<VmHandle> {
        let id = format!("vm-{}", Uuid::new_v4());
        self.vms.insert(
            id.clone(),
            Arc::new(VmState {
                exit_code: AtomicI64::new(0),
                exited: Notify::new(),
                has_exited: std::sync::atomic::AtomicBool::new(false),
            }),
        );
        tracing::debug!(container_id = %spec.container_id, handle = %id, "stub vm created");
        Ok(VmHandle(id))
    }

    async fn destroy_vm(&self, handle: &VmHandle) -> RuntimeResult<()> {
        self.vms
            .remove(&handle.0)
            .ok_or_else(|| RuntimeError::HandleNotFound(handle.0.clone()))?;
        Ok(())
    }

    async fn start(&self, handle: &VmHandle, mut io: Io) -> RuntimeResult<()> {
        let state = self
            .vms
            .get(&handle.0)
            .map(|r| r.clone())
            .ok_or_else(|| RuntimeError::HandleNotFound(handle.0.clone()))?;

        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match io.stdin.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if io.stdout.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            state.exit_code.store(0, Ordering::SeqCst);
            state.has_exited.store(true, Ordering::SeqCst);
            state.exited.notify_waiters();
        });

        Ok(())
    }

    async fn signal(&self, handle: &VmHandle, signo: i32) -> RuntimeResult<()> {
        let state = self
            .vms
            .get(&handle.0)
            .map(|r| r.clone())
            .ok_or_else(|| RuntimeError::HandleNotFound(handle.0.clone()))?;

        // SIGKILL (9) and SIGTERM (15) both terminate the stub immediately.
        if signo == 9 || signo == 15 {
            state.exit_code.store(128 + signo as i64, Ordering::SeqCst);
            state.has_exited.store(true, Ordering::SeqCst);
            state.exited.notify_waiters();
        }
        Ok(())
    }

    async fn wait(&self, handle: &VmHandle) -> RuntimeResult<ExitStatus> {
        let state = self
            .vms
            .get(&handle.0)
            .map(|r| r.clone())
            .ok_or_else(|| RuntimeError::HandleNotFound(handle.0.clone()))?;

        if !state.has_exited.load(Ordering::SeqCst) {
            state.exited.notified().await;
        }

        Ok(ExitStatus {
            code: state.exit_code.load(Ordering::SeqCst),
            oom_killed: false,
        })
    }

    async fn dial_vsock(
        &self,
        handle: &VmHandle,
        _port: u32,
    ) -> RuntimeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        if !self.vms.contains_key(&handle.0) {
            return Err(RuntimeError::HandleNotFound(handle.0.clone()));
        }
        Err(RuntimeError::DialTimeout)
    }

    async fn exec_in(&self, handle: &VmHandle, _spec: ExecSpec, mut io: Io) -> RuntimeResult<ExitStatus> {
        if !self.vms.contains_key(&handle.0) {
            return Err(RuntimeError::HandleNotFound(handle.0.clone()));
        }
        let mut buf = [0u8; 4096];
        loop {
            match io.stdin.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if io.stdout.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
        Ok(ExitStatus {
            code: 0,
            oom_killed: false,
        })
    }

    async fn resize_tty(&self, handle: &VmHandle, _rows: u16, _cols: u16) -> RuntimeResult<()> {
        if !self.vms.contains_key(&handle.0) {
            return Err(RuntimeError::HandleNotFound(handle.0.clone()));
        }
        Ok(())
    }
}

/// Stub `BridgeController` tracking bridges/ports in memory, standing in
/// for the helper VM's RPC surface.
pub struct StubBridgeController {
    bridges: DashMap<String, ()>,
    ports: DashMap<String, BridgeEndpoint>,
}

impl StubBridgeController {
    pub fn new() -> Self {
        Self {
            bridges: DashMap::new(),
            ports: DashMap::new(),
        }
    }
}

impl Default for StubBridgeController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BridgeController for StubBridgeController {
    async fn create_bridge(&self, network_id: &str, _subnet: &str, _gateway: &str) -> RuntimeResult<()> {
        self.bridges.insert(network_id.to_string(), ());
        Ok(())
    }

    async fn delete_bridge(&self, network_id: &str) -> RuntimeResult<()> {
        self.bridges.remove(network_id);
        Ok(())
    }

    async fn list_bridges(&self) -> RuntimeResult<Vec<String>> {
        Ok(self.bridges.iter().map(|e| e.key().clone()).collect())
    }

    async fn attach_port(
        &self,
        _network_id: &str,
        port_id: &str,
        ip: &str,
        mac: &str,
    ) -> RuntimeResult<BridgeEndpoint> {
        let endpoint = BridgeEndpoint {
            ip: ip.to_string(),
            mac: mac.to_string(),
        };
        self.ports.insert(port_id.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    async fn detach_port(&self, _network_id: &str, port_id: &str) -> RuntimeResult<()> {
        self.ports.remove(port_id);
        Ok(())
    }

    async fn health(&self) -> RuntimeResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn start_echoes_stdin_to_stdout_then_exits() {
        let runtime = StubVmRuntime::new();
        let handle = runtime
            .create_vm(VmSpec {
                container_id: "c1".into(),
                image_id: "img".into(),
                command: vec![],
                entrypoint: vec![],
                env: vec![],
                working_dir: None,
                user: None,
                tty: false,
                memory_bytes: None,
                cpu_shares: None,
            })
            .await
            .unwrap();

        let (mut client_in, server_in) = duplex(64);
        let (server_out, mut client_out) = duplex(64);

        runtime
            .start(
                &handle,
                Io {
                    stdin: Box::new(server_in),
                    stdout: Box::new(server_out),
                    stderr: Box::new(tokio::io::sink()),
                },
            )
            .await
            .unwrap();

        client_in.write_all(b"hello").await.unwrap();
        drop(client_in);

        let mut out = Vec::new();
        client_out.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");

        let status = runtime.wait(&handle).await.unwrap();
        assert_eq!(status.code, 0);
    }

    #[tokio::test]
    async fn signal_resolves_wait_with_signal_exit_code() {
        let runtime = StubVmRuntime::new();
        let handle = runtime
            .create_vm(VmSpec {
                container_id: "c1".into(),
                image_id: "img".into(),
                command: vec![],
                entrypoint: vec![],
                env: vec![],
                working_dir: None,
                user: None,
                tty: false,
                memory_bytes: None,
                cpu_shares: None,
            })
            .await
            .unwrap();

        runtime.signal(&handle, 9).await.unwrap();
        let status = runtime.wait(&handle).await.unwrap();
        assert_eq!(status.code, 137);
    }
}
