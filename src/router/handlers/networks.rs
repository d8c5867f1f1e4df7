//! Network endpoints (spec §6, §4.4)

use std::collections::HashMap;
use std::net::Ipv4Addr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DaemonError, Result};
use crate::networks::NetworkListFilters;
use crate::router::extract::{filter_values, label_filter_pairs, query_bool, query_filters};
use crate::router::AppState;
use crate::state::NetworkRow;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkInspect {
    pub id: String,
    pub name: String,
    pub driver: String,
    #[serde(rename = "IPAM")]
    pub ipam: IpamInfo,
    pub labels: Value,
}

#[derive(Debug, Serialize)]
pub struct IpamInfo {
    #[serde(rename = "Config")]
    pub config: Vec<IpamConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpamConfig {
    pub subnet: String,
    pub gateway: String,
}

impl From<NetworkRow> for NetworkInspect {
    fn from(row: NetworkRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            driver: "bridge".to_string(),
            ipam: IpamInfo {
                config: vec![IpamConfig {
                    subnet: row.subnet,
                    gateway: row.gateway,
                }],
            },
            labels: row.labels_json,
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<NetworkInspect>>> {
    let filters = query_filters(&params);
    let list_filters = NetworkListFilters {
        dangling: filter_values(&filters, "dangling").first().map(|v| v == "true"),
        label: label_filter_pairs(filter_values(&filters, "label")),
        name: filter_values(&filters, "name").first().cloned(),
        id: filter_values(&filters, "id").first().cloned(),
        builtin_only: None,
    };
    let rows = state.networks.list(&list_filters)?;
    Ok(Json(rows.into_iter().map(NetworkInspect::from).collect()))
}

pub async fn inspect(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<NetworkInspect>> {
    let row = state.networks.get(&id)?;
    Ok(Json(row.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateNetworkRequest {
    pub name: String,
    #[serde(default, rename = "IPAM")]
    pub ipam: Option<IpamConfigRequest>,
    #[serde(default)]
    pub labels: Value,
}

#[derive(Debug, Deserialize)]
pub struct IpamConfigRequest {
    #[serde(default, rename = "Config")]
    pub config: Vec<IpamSubnetRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpamSubnetRequest {
    pub subnet: Option<String>,
}

pub async fn create(State(state): State<AppState>, Json(req): Json<CreateNetworkRequest>) -> Result<Json<Value>> {
    let subnet = req
        .ipam
        .and_then(|i| i.config.into_iter().next())
        .and_then(|c| c.subnet)
        .map(|s| s.parse::<Ipv4Network>())
        .transpose()
        .map_err(|_| DaemonError::InvalidRequest("invalid subnet".to_string()))?;

    let row = state.networks.create(&req.name, subnet, req.labels)?;
    Ok(Json(serde_json::json!({ "Id": row.id, "Warning": "" })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let force = query_bool(&params, "force", false);
    state.networks.remove(&id, force).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectRequest {
    pub container: String,
    #[serde(default)]
    pub endpoint_config: Option<EndpointConfigRequest>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointConfigRequest {
    pub ipam_config: Option<IpamAddressRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpamAddressRequest {
    pub ipv4_address: Option<String>,
}

pub async fn connect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ConnectRequest>,
) -> Result<StatusCode> {
    let requested_ip: Option<Ipv4Addr> = req
        .endpoint_config
        .and_then(|c| c.ipam_config)
        .and_then(|c| c.ipv4_address)
        .and_then(|s| s.parse().ok());
    state.networks.attach(&id, &req.container, requested_ip).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisconnectRequest {
    pub container: String,
}

pub async fn disconnect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DisconnectRequest>,
) -> Result<StatusCode> {
    let row = state.networks.get(&id)?;

    // The assigned IP isn't on the request; recover it from the container's
    // own record of its network attachments.
    let ip = find_container_ip(&state, &row.id, &req.container)?;
    state.networks.detach(&id, &req.container, ip).await?;
    Ok(StatusCode::OK)
}

fn find_container_ip(state: &AppState, network_id: &str, container_id: &str) -> Result<Ipv4Addr> {
    let container = state.containers.get(container_id)?;
    let _ = network_id;
    container
        .spec
        .networks
        .iter()
        .find(|n| n.network_id == network_id)
        .and_then(|n| n.ipv4.as_ref())
        .and_then(|ip| ip.parse().ok())
        .ok_or_else(|| DaemonError::InvalidRequest("container has no address on this network".to_string()))
}

pub async fn prune(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let filters = query_filters(&params);
    let label_filter = label_filter_pairs(filter_values(&filters, "label"));
    let removed = state.networks.prune(&label_filter)?;
    Ok(Json(serde_json::json!({ "NetworksDeleted": removed })))
}
