//! PortMapManager (spec §4.6)
//!
//! A global reservation table keyed by (bind-ip, port, proto), with
//! `0.0.0.0` conflicting against any specific bind IP on the same port, plus
//! the accept/forward loops for reserved ports whose container is running.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;

use crate::state::{PortMappingRow, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PortMapError {
    #[error("port is already allocated: {0}:{1}/{2}")]
    Conflict(String, u16, &'static str),

    #[error("bind failed: {0}")]
    Bind(#[from] std::io::Error),

    #[error(transparent)]
    State(#[from] crate::state::StateError),
}

pub type PortMapResult<T> = Result<T, PortMapError>;

#[derive(Debug, Clone)]
pub struct PublishSpec {
    pub host_ip: IpAddr,
    pub host_port: u16,
    pub proto: Protocol,
    pub container_ip: IpAddr,
    pub container_port: u16,
}

struct ListenerHandle {
    cancel: CancellationToken,
}

/// Global, in-process reservation key: (host_ip, host_port, proto). A
/// `0.0.0.0` reservation conflicts with any specific IP on that port; we
/// model this by tracking a parallel "wildcard" key per (port, proto).
pub struct PortMapManager {
    store: Arc<StateStore>,
    listeners: DashMap<(String, u16, &'static str), ListenerHandle>,
}

impl PortMapManager {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self {
            store,
            listeners: DashMap::new(),
        }
    }

    fn conflicts(&self, host_ip: IpAddr, host_port: u16, proto: Protocol) -> PortMapResult<bool> {
        let reserved = self.all_reservations()?;
        let wildcard = IpAddr::from([0, 0, 0, 0]);
        Ok(reserved.iter().any(|r| {
            if r.proto != proto.as_str() || r.host_port != host_port {
                return false;
            }
            let existing_ip: IpAddr = r.host_ip.parse().unwrap_or(wildcard);
            existing_ip == host_ip || existing_ip == wildcard || host_ip == wildcard
        }))
    }

    fn all_reservations(&self) -> PortMapResult<Vec<PortMappingRow>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT container_id, host_ip, host_port, proto, container_port FROM port_mappings",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PortMappingRow {
                        container_id: row.get(0)?,
                        host_ip: row.get(1)?,
                        host_port: row.get(2)?,
                        proto: row.get(3)?,
                        container_port: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        }).map_err(PortMapError::from)
    }

    /// Check that none of `specs` conflict with an existing reservation,
    /// without persisting anything. Used at container-create time, where
    /// the caller persists the mapping rows itself alongside the rest of
    /// the container record in a single transaction.
    pub fn check_available(&self, specs: &[PublishSpec]) -> PortMapResult<()> {
        for spec in specs {
            if self.conflicts(spec.host_ip, spec.host_port, spec.proto)? {
                return Err(PortMapError::Conflict(
                    spec.host_ip.to_string(),
                    spec.host_port,
                    spec.proto.as_str(),
                ));
            }
        }
        Ok(())
    }

    /// Reserve the host endpoint for every published port of a container.
    /// All-or-nothing: if any entry conflicts, nothing is reserved.
    pub fn reserve(&self, container_id: &str, specs: &[PublishSpec]) -> PortMapResult<()> {
        self.check_available(specs)?;
        for spec in specs {
            self.store.put_port_mapping(&PortMappingRow {
                container_id: container_id.to_string(),
                host_ip: spec.host_ip.to_string(),
                host_port: spec.host_port,
                proto: spec.proto.as_str().to_string(),
                container_port: spec.container_port,
            })?;
        }
        Ok(())
    }

    /// Open accept loops for a container's reserved ports, forwarding bytes
    /// to the container endpoint. Call on container start.
    pub async fn bind(&self, container_id: &str, specs: &[PublishSpec]) -> PortMapResult<()> {
        for spec in specs {
            let key = (spec.host_ip.to_string(), spec.host_port, spec.proto.as_str());
            if self.listeners.contains_key(&key) {
                continue;
            }

            let cancel = CancellationToken::new();
            let addr = SocketAddr::new(spec.host_ip, spec.host_port);
            let container_addr = SocketAddr::new(spec.container_ip, spec.container_port);

            match spec.proto {
                Protocol::Tcp => {
                    let listener = TcpListener::bind(addr).await?;
                    spawn_tcp_forward_loop(listener, container_addr, cancel.clone());
                }
                Protocol::Udp => {
                    let socket = UdpSocket::bind(addr).await?;
                    spawn_udp_forward_loop(socket, container_addr, cancel.clone());
                }
            }

            self.listeners.insert(key, ListenerHandle { cancel });
        }
        tracing::debug!(container_id, ports = specs.len(), "port listeners bound");
        Ok(())
    }

    /// Close listeners for a container's ports (on stop); reservations stay
    /// in the store as "paper" entries until `release`.
    pub fn unbind(&self, specs: &[PublishSpec]) {
        for spec in specs {
            let key = (spec.host_ip.to_string(), spec.host_port, spec.proto.as_str());
            if let Some((_, handle)) = self.listeners.remove(&key) {
                handle.cancel.cancel();
            }
        }
    }

    pub fn release(&self, container_id: &str) -> PortMapResult<()> {
        self.store.delete_port_mappings_for_container(container_id)?;
        Ok(())
    }

    pub fn list_for_container(&self, container_id: &str) -> PortMapResult<Vec<PortMappingRow>> {
        Ok(self.store.list_port_mappings(container_id)?)
    }
}

fn spawn_tcp_forward_loop(listener: TcpListener, upstream: SocketAddr, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                accepted = listener.accept() => {
                    let Ok((mut client, _)) = accepted else { continue };
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        let Ok(mut upstream_conn) = tokio::net::TcpStream::connect(upstream).await else {
                            return;
                        };
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::io::copy_bidirectional(&mut client, &mut upstream_conn) => {}
                        }
                    });
                }
            }
        }
    });
}

fn spawn_udp_forward_loop(socket: UdpSocket, upstream: SocketAddr, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut buf = [0u8; 65536];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                received = socket.recv_from(&mut buf) => {
                    let Ok((n, _from)) = received else { continue };
                    let _ = socket.send_to(&buf[..n], upstream).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(ip: &str, port: u16, proto: Protocol) -> PublishSpec {
        PublishSpec {
            host_ip: ip.parse().unwrap(),
            host_port: port,
            proto,
            container_ip: "172.18.0.2".parse().unwrap(),
            container_port: 80,
        }
    }

    #[test]
    fn wildcard_conflicts_with_specific_ip_same_port() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let mgr = PortMapManager::new(store);
        mgr.reserve("c1", &[spec("0.0.0.0", 8080, Protocol::Tcp)]).unwrap();
        let err = mgr.reserve("c2", &[spec("127.0.0.1", 8080, Protocol::Tcp)]).unwrap_err();
        assert!(matches!(err, PortMapError::Conflict(_, 8080, "tcp")));
    }

    #[test]
    fn distinct_ports_do_not_conflict() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let mgr = PortMapManager::new(store);
        mgr.reserve("c1", &[spec("0.0.0.0", 8080, Protocol::Tcp)]).unwrap();
        mgr.reserve("c2", &[spec("0.0.0.0", 8081, Protocol::Tcp)]).unwrap();
    }
}
