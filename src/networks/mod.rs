//! NetworkManager
//!
//! Owns network records and IP allocation, and drives the bridge-controller
//! RPC on attach/detach. Default `bridge`/`host`/`none` networks are created
//! on first run and are never deletable.

pub mod ipam;

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use ipnetwork::Ipv4Network;
use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::runtime::BridgeController;
use crate::state::{NetworkRow, StateStore};

#[derive(Debug, Error)]
pub enum NetworkManagerError {
    #[error("network {0} not found")]
    NotFound(String),

    #[error("network name {0} already in use")]
    NameInUse(String),

    #[error("builtin network {0} cannot be removed")]
    BuiltinUndeletable(String),

    #[error("network {0} has active endpoints")]
    HasActiveEndpoints(String),

    #[error(transparent)]
    Ipam(#[from] ipam::IpamError),

    #[error(transparent)]
    State(#[from] crate::state::StateError),

    #[error(transparent)]
    Runtime(#[from] crate::runtime::RuntimeError),
}

pub type NetworkManagerResult<T> = Result<T, NetworkManagerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    BuiltinBridge,
    BuiltinHost,
    BuiltinNone,
    User,
}

impl NetworkKind {
    fn as_str(self) -> &'static str {
        match self {
            NetworkKind::BuiltinBridge => "builtin-bridge",
            NetworkKind::BuiltinHost => "builtin-host",
            NetworkKind::BuiltinNone => "builtin-none",
            NetworkKind::User => "user",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "builtin-bridge" => NetworkKind::BuiltinBridge,
            "builtin-host" => NetworkKind::BuiltinHost,
            "builtin-none" => NetworkKind::BuiltinNone,
            _ => NetworkKind::User,
        }
    }

    pub fn is_builtin(self) -> bool {
        !matches!(self, NetworkKind::User)
    }
}

#[derive(Debug, Clone)]
pub struct NetworkListFilters {
    pub dangling: Option<bool>,
    pub label: Vec<(String, Option<String>)>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub builtin_only: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub mac: String,
    pub endpoint_id: String,
}

pub struct NetworkManager {
    store: Arc<StateStore>,
    bridge: Arc<dyn BridgeController>,
    lock: Mutex<()>,
}

impl NetworkManager {
    pub fn new(store: Arc<StateStore>, bridge: Arc<dyn BridgeController>) -> Self {
        Self {
            store,
            bridge,
            lock: Mutex::new(()),
        }
    }

    /// Creates `bridge`, `host`, `none` if they don't already exist. Idempotent.
    pub async fn ensure_builtins(&self) -> NetworkManagerResult<()> {
        let _guard = self.lock.lock();

        if self.store.get_network_by_name("bridge")?.is_none() {
            let subnet: Ipv4Network = "172.17.0.0/16".parse().unwrap();
            let gateway = subnet.iter().nth(1).unwrap();
            self.insert_network_row("bridge", NetworkKind::BuiltinBridge, subnet, gateway)?;
            self.bridge.create_bridge("bridge", &subnet.to_string(), &gateway.to_string()).await?;
        }
        if self.store.get_network_by_name("host")?.is_none() {
            let subnet: Ipv4Network = "0.0.0.0/0".parse().unwrap();
            self.insert_network_row("host", NetworkKind::BuiltinHost, subnet, Ipv4Addr::new(0, 0, 0, 0))?;
        }
        if self.store.get_network_by_name("none")?.is_none() {
            let subnet: Ipv4Network = "0.0.0.0/0".parse().unwrap();
            self.insert_network_row("none", NetworkKind::BuiltinNone, subnet, Ipv4Addr::new(0, 0, 0, 0))?;
        }
        Ok(())
    }

    fn insert_network_row(
        &self,
        name: &str,
        kind: NetworkKind,
        subnet: Ipv4Network,
        gateway: Ipv4Addr,
    ) -> NetworkManagerResult<NetworkRow> {
        let row = NetworkRow {
            id: format!("{:x}", Uuid::new_v4().as_u128()),
            name: name.to_string(),
            kind: kind.as_str().to_string(),
            subnet: subnet.to_string(),
            gateway: gateway.to_string(),
            range: None,
            labels_json: json!({}),
            meta_json: json!({}),
        };
        self.store.insert_network(&row)?;
        Ok(row)
    }

    pub fn create(
        &self,
        name: &str,
        user_subnet: Option<Ipv4Network>,
        labels: Value,
    ) -> NetworkManagerResult<NetworkRow> {
        let _guard = self.lock.lock();

        if self.store.get_network_by_name(name)?.is_some() {
            return Err(NetworkManagerError::NameInUse(name.to_string()));
        }

        let subnet = match user_subnet {
            Some(s) => s,
            None => ipam::allocate_subnet(&self.store)?,
        };
        let gateway = subnet.iter().nth(1).unwrap_or(subnet.ip());

        let row = NetworkRow {
            id: format!("{:x}", Uuid::new_v4().as_u128()),
            name: name.to_string(),
            kind: NetworkKind::User.as_str().to_string(),
            subnet: subnet.to_string(),
            gateway: gateway.to_string(),
            range: None,
            labels_json: labels,
            meta_json: json!({}),
        };
        self.store.insert_network(&row)?;
        Ok(row)
    }

    pub fn get(&self, id_or_name: &str) -> NetworkManagerResult<NetworkRow> {
        if let Some(row) = self.store.get_network(id_or_name)? {
            return Ok(row);
        }
        self.store
            .get_network_by_name(id_or_name)?
            .ok_or_else(|| NetworkManagerError::NotFound(id_or_name.to_string()))
    }

    pub fn list(&self, filters: &NetworkListFilters) -> NetworkManagerResult<Vec<NetworkRow>> {
        let mut rows = self.store.list_networks()?;

        if let Some(name) = &filters.name {
            rows.retain(|r| &r.name == name);
        }
        if let Some(id) = &filters.id {
            rows.retain(|r| r.id.starts_with(id.as_str()));
        }
        if let Some(builtin_only) = filters.builtin_only {
            rows.retain(|r| NetworkKind::from_str(&r.kind).is_builtin() == builtin_only);
        }
        if let Some(dangling) = filters.dangling {
            let mut kept = Vec::new();
            for row in rows {
                let attached = !self.store.list_ip_allocations(&row.id)?.is_empty();
                if attached != dangling {
                    kept.push(row);
                }
            }
            rows = kept;
        }
        for (key, value) in &filters.label {
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

    pub async fn remove(&self, id_or_name: &str, force: bool) -> NetworkManagerResult<()> {
        let row = self.get(id_or_name)?;
        let kind = NetworkKind::from_str(&row.kind);
        if kind.is_builtin() {
            return Err(NetworkManagerError::BuiltinUndeletable(row.name));
        }

        let attachments = self.store.list_ip_allocations(&row.id)?;
        if !attachments.is_empty() && !force {
            return Err(NetworkManagerError::HasActiveEndpoints(row.name));
        }

        self.bridge.delete_bridge(&row.id).await?;
        self.store.delete_network(&row.id)?;
        Ok(())
    }

    pub async fn attach(
        &self,
        network_id: &str,
        container_id: &str,
        requested_ip: Option<Ipv4Addr>,
    ) -> NetworkManagerResult<Endpoint> {
        let row = self.get(network_id)?;
        let subnet: Ipv4Network = row.subnet.parse().map_err(|_| NetworkManagerError::NotFound(row.id.clone()))?;
        let gateway: Ipv4Addr = Ipv4Addr::from_str(&row.gateway).unwrap_or(subnet.ip());
        let range = row.range.as_ref().and_then(|r| r.parse().ok());

        let ip = ipam::allocate_ip(&self.store, &row.id, subnet, gateway, range, requested_ip, container_id)?;
        let port_id = format!("{}-{}", row.id, container_id);
        let mac = derive_mac(&ip);

        let endpoint = self.bridge.attach_port(&row.id, &port_id, &ip.to_string(), &mac).await?;

        Ok(Endpoint {
            ip,
            mac: endpoint.mac,
            endpoint_id: port_id,
        })
    }

    pub async fn detach(&self, network_id: &str, container_id: &str, ip: Ipv4Addr) -> NetworkManagerResult<()> {
        let row = self.get(network_id)?;
        let port_id = format!("{}-{}", row.id, container_id);
        self.bridge.detach_port(&row.id, &port_id).await?;
        ipam::release_ip(&self.store, &row.id, ip)?;
        Ok(())
    }

    pub fn prune(&self, label_filter: &[(String, Option<String>)]) -> NetworkManagerResult<Vec<String>> {
        let mut removed = Vec::new();
        for row in self.store.list_networks()? {
            if NetworkKind::from_str(&row.kind).is_builtin() {
                continue;
            }
            if !self.store.list_ip_allocations(&row.id)?.is_empty() {
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
            if matches {
                self.store.delete_network(&row.id)?;
                removed.push(row.name);
            }
        }
        Ok(removed)
    }
}

/// Deterministic, locally-administered MAC derived from the assigned IP,
/// matching the "02:42:ip" convention Docker's own bridge driver uses.
fn derive_mac(ip: &Ipv4Addr) -> String {
    let octets = ip.octets();
    format!(
        "02:42:{:02x}:{:02x}:{:02x}:{:02x}",
        octets[0], octets[1], octets[2], octets[3]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::StubBridgeController;

    fn manager() -> NetworkManager {
        NetworkManager::new(
            Arc::new(StateStore::open_in_memory().unwrap()),
            Arc::new(StubBridgeController::new()),
        )
    }

    #[tokio::test]
    async fn ensure_builtins_is_idempotent() {
        let mgr = manager();
        mgr.ensure_builtins().await.unwrap();
        mgr.ensure_builtins().await.unwrap();
        assert_eq!(mgr.list(&NetworkListFilters {
            dangling: None,
            label: vec![],
            name: None,
            id: None,
            builtin_only: None,
        }).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn builtin_network_cannot_be_removed() {
        let mgr = manager();
        mgr.ensure_builtins().await.unwrap();
        let err = mgr.remove("bridge", false).await.unwrap_err();
        assert!(matches!(err, NetworkManagerError::BuiltinUndeletable(_)));
    }

    #[tokio::test]
    async fn attach_assigns_ip_in_subnet() {
        let mgr = manager();
        let row = mgr.create("mynet", None, json!({})).unwrap();
        let endpoint = mgr.attach(&row.id, "c1", None).await.unwrap();
        assert!(endpoint.ip.to_string().starts_with("172.18."));
    }
}
