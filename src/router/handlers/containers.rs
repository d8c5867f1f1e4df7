//! Container endpoints (spec §6, §4.1)

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::containers::model::{
    Container, ContainerSpec, HealthcheckSpec, MountKind, MountSpec, NetworkRequest, Phase,
    PublishedPort, ResourceLimits, RestartPolicy,
};
use crate::error::{DaemonError, Result};
use crate::filesystem::SafePath;
use crate::logstore::{LogQuery, StreamType};
use crate::router::extract::{filter_values, label_filter_pairs, query_bool, query_filters, query_tail, query_u64, TailSpec};
use crate::router::upgrade;
use crate::router::AppState;
use crate::runtime::Io;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainerRequest {
    pub image: String,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub entrypoint: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    #[serde(default)]
    pub tty: bool,
    #[serde(default)]
    pub open_stdin: bool,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub healthcheck: Option<HealthcheckRequest>,
    #[serde(default)]
    pub host_config: HostConfigRequest,
    pub networking_config: Option<NetworkingConfigRequest>,
    #[serde(default = "default_stop_signal")]
    pub stop_signal: String,
}

fn default_stop_signal() -> String {
    "SIGTERM".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthcheckRequest {
    #[serde(default)]
    pub test: Vec<String>,
    #[serde(default)]
    pub interval: u64,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub start_period: u64,
    #[serde(default)]
    pub start_interval: u64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfigRequest {
    #[serde(default)]
    pub binds: Vec<String>,
    #[serde(default)]
    pub mounts: Vec<MountRequest>,
    #[serde(default)]
    pub port_bindings: HashMap<String, Vec<PortBindingRequest>>,
    pub restart_policy: Option<RestartPolicyRequest>,
    pub memory: Option<u64>,
    pub memory_reservation: Option<u64>,
    pub cpu_shares: Option<u32>,
    pub cpu_period: Option<i64>,
    pub cpu_quota: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountRequest {
    #[serde(rename = "Type")]
    pub kind: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBindingRequest {
    #[serde(default)]
    pub host_ip: String,
    pub host_port: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicyRequest {
    pub name: String,
    #[serde(default)]
    pub maximum_retry_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct NetworkingConfigRequest {
    #[serde(default, rename = "EndpointsConfig")]
    pub endpoints_config: HashMap<String, EndpointConfigRequest>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointConfigRequest {
    pub ipam_config: Option<IpamConfigRequest>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpamConfigRequest {
    pub ipv4_address: Option<String>,
}

fn build_spec(req: CreateContainerRequest) -> Result<ContainerSpec> {
    let restart_policy = match req.host_config.restart_policy {
        Some(p) => match p.name.as_str() {
            "always" => RestartPolicy::Always,
            "unless-stopped" => RestartPolicy::UnlessStopped,
            "on-failure" => RestartPolicy::OnFailure {
                max_retries: p.maximum_retry_count,
            },
            _ => RestartPolicy::No,
        },
        None => RestartPolicy::No,
    };

    let mut mounts: Vec<MountSpec> = req
        .host_config
        .binds
        .iter()
        .filter_map(|b| {
            let mut parts = b.splitn(3, ':');
            let source = parts.next()?.to_string();
            let target = parts.next()?.to_string();
            let read_only = parts.next().map(|o| o.contains("ro")).unwrap_or(false);
            Some(MountSpec {
                source,
                target,
                kind: MountKind::Bind,
                read_only,
            })
        })
        .collect();
    mounts.extend(req.host_config.mounts.iter().map(|m| MountSpec {
        source: m.source.clone(),
        target: m.target.clone(),
        kind: match m.kind.as_str() {
            "volume" => MountKind::Volume,
            "tmpfs" => MountKind::Tmpfs,
            _ => MountKind::Bind,
        },
        read_only: m.read_only,
    }));

    let mut published_ports = Vec::new();
    for (port_proto, bindings) in &req.host_config.port_bindings {
        let mut parts = port_proto.splitn(2, '/');
        let container_port: u16 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| DaemonError::InvalidRequest(format!("invalid port spec {port_proto}")))?;
        let proto = parts.next().unwrap_or("tcp").to_string();
        for binding in bindings {
            let host_port: u16 = binding
                .host_port
                .parse()
                .map_err(|_| DaemonError::InvalidRequest(format!("invalid host port {}", binding.host_port)))?;
            published_ports.push(PublishedPort {
                host_ip: if binding.host_ip.is_empty() {
                    "0.0.0.0".to_string()
                } else {
                    binding.host_ip.clone()
                },
                host_port,
                container_port,
                proto: proto.clone(),
            });
        }
    }

    let networks = req
        .networking_config
        .map(|nc| {
            nc.endpoints_config
                .into_iter()
                .map(|(name, cfg)| NetworkRequest {
                    network_id: name,
                    ipv4: cfg.ipam_config.and_then(|c| c.ipv4_address),
                    aliases: cfg.aliases,
                })
                .collect()
        })
        .unwrap_or_default();

    let healthcheck = req.healthcheck.and_then(|h| {
        if h.test.is_empty() || h.test == ["NONE"] {
            None
        } else {
            Some(HealthcheckSpec {
                test: h.test,
                interval_secs: h.interval / 1_000_000_000,
                timeout_secs: h.timeout / 1_000_000_000,
                retries: h.retries,
                start_period_secs: h.start_period / 1_000_000_000,
                start_interval_secs: h.start_interval / 1_000_000_000,
            })
        }
    });

    Ok(ContainerSpec {
        image_ref: req.image,
        command: req.cmd,
        entrypoint: req.entrypoint,
        env: req.env,
        working_dir: req.working_dir,
        user: req.user,
        tty: req.tty,
        stdin_open: req.open_stdin,
        labels: req.labels,
        healthcheck,
        restart_policy,
        limits: ResourceLimits {
            memory_bytes: req.host_config.memory,
            memory_reservation_bytes: req.host_config.memory_reservation,
            cpu_shares: req.host_config.cpu_shares,
            cpu_period: req.host_config.cpu_period,
            cpu_quota: req.host_config.cpu_quota,
        },
        mounts,
        networks,
        published_ports,
        stop_signal: req.stop_signal,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainerResponse {
    pub id: String,
    pub warnings: Vec<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    Json(req): Json<CreateContainerRequest>,
) -> Result<impl IntoResponse> {
    let name = params.get("name").cloned();
    let image_ref = req.image.clone();
    let image = state.images.inspect(&image_ref).await?;
    let spec = build_spec(req)?;
    let id = state.containers.create(name.as_deref(), &image_ref, &image.id, spec).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateContainerResponse {
            id,
            warnings: Vec::new(),
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub image_id: String,
    pub command: String,
    pub created: i64,
    pub state: String,
    pub status: String,
    pub labels: HashMap<String, String>,
}

impl From<&Container> for ContainerSummary {
    fn from(c: &Container) -> Self {
        Self {
            id: c.id.clone(),
            names: vec![format!("/{}", c.name)],
            image: c.image_ref.clone(),
            image_id: c.image_id.clone(),
            command: c.spec.command.join(" "),
            created: chrono::DateTime::parse_from_rfc3339(&c.created_at)
                .map(|d| d.timestamp())
                .unwrap_or_default(),
            state: c.phase.as_str().to_string(),
            status: c.phase.as_str().to_string(),
            labels: c.spec.labels.clone(),
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<ContainerSummary>>> {
    let all = query_bool(&params, "all", false);
    let containers = state.containers.list(all)?;
    Ok(Json(containers.iter().map(ContainerSummary::from).collect()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    pub name: String,
    pub image: String,
    pub created: String,
    pub state: ContainerState,
    pub config: InspectConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    pub status: String,
    pub running: bool,
    pub exit_code: i64,
    pub started_at: String,
    pub finished_at: String,
    pub health: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectConfig {
    pub image: String,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub tty: bool,
}

impl From<Container> for ContainerInspect {
    fn from(c: Container) -> Self {
        Self {
            id: c.id,
            name: format!("/{}", c.name),
            image: c.image_ref.clone(),
            created: c.created_at,
            state: ContainerState {
                status: c.phase.as_str().to_string(),
                running: c.phase == Phase::Running,
                exit_code: c.exit_code.unwrap_or(0),
                started_at: c.started_at.unwrap_or_default(),
                finished_at: c.finished_at.unwrap_or_default(),
                health: c.health.status.map(|_| serde_json::to_value(&c.health).unwrap()),
            },
            config: InspectConfig {
                image: c.image_ref,
                cmd: c.spec.command,
                env: c.spec.env,
                labels: c.spec.labels,
                tty: c.spec.tty,
            },
        }
    }
}

pub async fn inspect(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ContainerInspect>> {
    let container = state.containers.get(&id)?;
    Ok(Json(container.into()))
}

pub async fn start(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    state.containers.start(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let timeout = query_u64(&params, "t")?.unwrap_or(10);
    state.containers.stop(&id, timeout).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn kill(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let signal = params.get("signal").map(|s| parse_signal(s)).unwrap_or(15);
    state.containers.kill(&id, signal).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_signal(s: &str) -> i32 {
    s.parse().unwrap_or_else(|_| match s.trim_start_matches("SIG") {
        "KILL" => 9,
        "TERM" => 15,
        "HUP" => 1,
        "INT" => 2,
        _ => 15,
    })
}

pub async fn restart(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let timeout = query_u64(&params, "t")?.unwrap_or(10);
    state.containers.restart(&id, timeout).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pauses the guest's single process with SIGSTOP rather than anything
/// VM-level; `unpause` resumes it with SIGCONT.
pub async fn pause(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    state.containers.pause(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unpause(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    state.containers.unpause(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rename(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let name = params
        .get("name")
        .cloned()
        .ok_or_else(|| DaemonError::InvalidRequest("missing name query parameter".to_string()))?;
    state.containers.rename(&id, &name)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resize(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let rows = query_u64(&params, "h")?.unwrap_or(0) as u16;
    let cols = query_u64(&params, "w")?.unwrap_or(0) as u16;
    state.containers.resize(&id, rows, cols).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateRequest {
    pub memory: Option<u64>,
    pub memory_reservation: Option<u64>,
    pub cpu_shares: Option<u32>,
    pub cpu_period: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub restart_policy: Option<RestartPolicyRequest>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<Value>> {
    let limits = ResourceLimits {
        memory_bytes: req.memory,
        memory_reservation_bytes: req.memory_reservation,
        cpu_shares: req.cpu_shares,
        cpu_period: req.cpu_period,
        cpu_quota: req.cpu_quota,
    };
    let restart_policy = req.restart_policy.map(|p| match p.name.as_str() {
        "always" => RestartPolicy::Always,
        "unless-stopped" => RestartPolicy::UnlessStopped,
        "on-failure" => RestartPolicy::OnFailure {
            max_retries: p.maximum_retry_count,
        },
        _ => RestartPolicy::No,
    });
    state.containers.update(&id, limits, restart_policy)?;
    Ok(Json(serde_json::json!({ "Warnings": Vec::<String>::new() })))
}

pub async fn wait(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let code = state.containers.wait(&id).await?;
    Ok(Json(serde_json::json!({ "StatusCode": code })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let force = query_bool(&params, "force", false);
    let remove_volumes = query_bool(&params, "v", false);
    state.containers.remove(&id, force, remove_volumes).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn prune(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let filters = query_filters(&params);
    let label_filter = label_filter_pairs(filter_values(&filters, "label"));

    let containers = state.containers.list(true)?;
    let mut deleted = Vec::new();
    for c in containers {
        if c.phase == Phase::Running {
            continue;
        }
        if !matches_label_filter(&c.spec.labels, &label_filter) {
            continue;
        }
        if state.containers.remove(&c.id, false, false).await.is_ok() {
            deleted.push(c.id);
        }
    }
    Ok(Json(serde_json::json!({
        "ContainersDeleted": deleted,
        "SpaceReclaimed": 0,
    })))
}

fn matches_label_filter(labels: &HashMap<String, String>, filter: &[(String, Option<String>)]) -> bool {
    filter.iter().all(|(key, value)| match value {
        Some(v) => labels.get(key) == Some(v),
        None => labels.contains_key(key),
    })
}

/// Historical logs, optionally followed. Uses Docker's raw-stream framing
/// unless the container is a TTY, matching the live-attach path.
pub async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let container = state.containers.get(&id)?;
    let follow = query_bool(&params, "follow", false);
    let tail = query_tail(&params)?;
    let query = LogQuery {
        since: query_u64(&params, "since")?
            .and_then(|s| chrono::DateTime::from_timestamp(s as i64, 0)),
        until: query_u64(&params, "until")?
            .and_then(|s| chrono::DateTime::from_timestamp(s as i64, 0)),
        tail: match tail {
            TailSpec::All => None,
            TailSpec::Last(n) => Some(n),
        },
        stdout: query_bool(&params, "stdout", true),
        stderr: query_bool(&params, "stderr", true),
        timestamps: query_bool(&params, "timestamps", false),
    };

    let reader = state.containers.logs().reader(&id);
    let tty = container.spec.tty;

    let body = if follow {
        let rx = reader.follow(query)?;
        let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(move |record| {
            Ok::<_, Infallible>(record_to_chunk(&record, tty))
        });
        Body::from_stream(stream)
    } else {
        let records = reader.read_batch(&query)?;
        let chunks: Vec<_> = records.iter().map(|r| Ok::<_, Infallible>(record_to_chunk(r, tty))).collect();
        Body::from_stream(stream::iter(chunks))
    };

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/vnd.docker.raw-stream")
        .body(body)
        .unwrap())
}

fn record_to_chunk(record: &crate::logstore::LogRecord, tty: bool) -> axum::body::Bytes {
    let line = format!("{}\n", record.log);
    if tty {
        axum::body::Bytes::from(line.into_bytes())
    } else {
        let stream_type = if record.stream == "stderr" {
            StreamType::Stderr
        } else {
            StreamType::Stdout
        };
        axum::body::Bytes::from(crate::logstore::encode_frame(stream_type, line.as_bytes()))
    }
}

/// Connection-hijack attach (spec §4.3): replays historical logs when
/// `logs=true`, then forwards live stdin/stdout/stderr until the upgraded
/// connection closes. Vessel's single-stdio-per-start model means a true
/// live attach shares the container's original stream rather than opening
/// a second one, so in practice this tails the log store the same way
/// `logs?follow=true` does; exec attach (below) gets a genuinely private
/// bidirectional stream.
pub async fn attach(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    req: axum::extract::Request,
) -> Result<Response> {
    let container = state.containers.get(&id)?;
    if !upgrade::is_hijack_request(req.uri().path(), req.headers()) {
        return Err(DaemonError::InvalidRequest(
            "attach requires Connection: Upgrade / Upgrade: tcp".to_string(),
        ));
    }

    let replay_logs = query_bool(&params, "logs", false);
    let tty = container.spec.tty;
    let log_store_reader = state.containers.logs().reader(&id);

    Ok(upgrade::hijack(req, tty, move |io| async move {
        let Io { mut stdout, .. } = io;

        if replay_logs {
            if let Ok(records) = log_store_reader.read_batch(&LogQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }) {
                for record in records {
                    if tokio::io::AsyncWriteExt::write_all(&mut stdout, record.log.as_bytes())
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }

        if let Ok(mut rx) = log_store_reader.follow(LogQuery {
            stdout: true,
            stderr: true,
            ..Default::default()
        }) {
            while let Some(record) = rx.recv().await {
                if tokio::io::AsyncWriteExt::write_all(&mut stdout, record.log.as_bytes())
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }))
}

/// A single container shares one VM and has no cgroup/cAdvisor-style
/// collaborator to sample, so the numeric fields stay zeroed; they're kept
/// present (rather than omitted) since Docker clients commonly index into
/// `memory_stats.usage` etc. without a presence check.
fn stats_document(id: &str, name: &str) -> Value {
    serde_json::json!({
        "read": chrono::Utc::now().to_rfc3339(),
        "preread": "0001-01-01T00:00:00Z",
        "id": id,
        "name": format!("/{name}"),
        "pids_stats": { "current": 1 },
        "memory_stats": {
            "usage": 0,
            "limit": 0,
            "stats": {},
        },
        "cpu_stats": {
            "cpu_usage": {
                "total_usage": 0,
                "usage_in_kernelmode": 0,
                "usage_in_usermode": 0,
                "percpu_usage": Vec::<u64>::new(),
            },
            "system_cpu_usage": 0,
            "online_cpus": 0,
            "throttling_data": { "periods": 0, "throttled_periods": 0, "throttled_time": 0 },
        },
        "precpu_stats": {
            "cpu_usage": {
                "total_usage": 0,
                "usage_in_kernelmode": 0,
                "usage_in_usermode": 0,
            },
            "system_cpu_usage": 0,
            "online_cpus": 0,
            "throttling_data": { "periods": 0, "throttled_periods": 0, "throttled_time": 0 },
        },
        "blkio_stats": {
            "io_service_bytes_recursive": Vec::<Value>::new(),
            "io_serviced_recursive": Vec::<Value>::new(),
        },
        "networks": {},
    })
}

/// Streams one NDJSON stats document per second until the client
/// disconnects or the container is removed, matching the pull/load
/// progress idiom; `stream=false` collapses to Docker's one-shot mode.
pub async fn stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let container = state.containers.get(&id)?;
    let stream_mode = query_bool(&params, "stream", true);

    if !stream_mode {
        let doc = stats_document(&container.id, &container.name);
        return Ok(Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&doc).unwrap()))
            .unwrap());
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<axum::body::Bytes>(4);
    let manager = state.containers.clone();
    let container_id = container.id.clone();
    let container_name = container.name.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            if manager.get(&container_id).is_err() {
                break;
            }
            let mut line = serde_json::to_vec(&stats_document(&container_id, &container_name)).unwrap_or_default();
            line.push(b'\n');
            if tx.send(axum::body::Bytes::from(line)).await.is_err() {
                break;
            }
        }
    });

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(|chunk| Ok::<_, Infallible>(chunk));
    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from_stream(stream))
        .unwrap())
}

/// Vessel runs one guest process per container, so the table has a single
/// row for PID 1 built from the container's own command rather than a
/// real in-guest `ps` sample.
pub async fn top(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let container = state.containers.get(&id)?;
    if container.phase != Phase::Running {
        return Err(DaemonError::Conflict(format!("container {id} is not running")));
    }
    let cmd = if !container.spec.entrypoint.is_empty() {
        container.spec.entrypoint.join(" ")
    } else {
        container.spec.command.join(" ")
    };
    Ok(Json(serde_json::json!({
        "Titles": ["PID", "CMD"],
        "Processes": [["1", cmd]],
    })))
}

/// Resolves the host directory backing a mount (bind source, or a named
/// volume's mountpoint); tmpfs mounts have nothing on the host to walk.
fn mount_host_root(state: &AppState, mount: &MountSpec) -> Result<std::path::PathBuf> {
    match mount.kind {
        MountKind::Bind => Ok(std::path::PathBuf::from(&mount.source)),
        MountKind::Volume => {
            let volume = state.volumes.get(&mount.source)?;
            Ok(std::path::PathBuf::from(volume.mountpoint))
        }
        MountKind::Tmpfs => Err(DaemonError::InvalidRequest(format!(
            "mount {} is tmpfs and has no host-visible path",
            mount.target
        ))),
    }
}

/// Every file under a container's bind/volume mounts is reported as
/// `Kind: 1` (added): without a captured base layer there's no baseline
/// to diff against for true modified/deleted detection.
pub async fn changes(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let container = state.containers.get(&id)?;
    let mut changes = Vec::new();

    for mount in &container.spec.mounts {
        if mount.kind == MountKind::Tmpfs {
            continue;
        }
        let Ok(root) = mount_host_root(&state, mount) else { continue };
        if !root.is_dir() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&root).min_depth(1).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            changes.push(serde_json::json!({
                "Path": format!("{}/{}", mount.target.trim_end_matches('/'), relative.to_string_lossy()),
                "Kind": 1,
            }));
        }
    }

    Ok(Json(serde_json::json!(changes)))
}

/// Longest-prefix match of a requested archive path against the
/// container's mount targets, the same resolution order Docker's own
/// daemon uses when a path straddles multiple mounts.
fn find_mount_for_path<'a>(mounts: &'a [MountSpec], target_path: &str) -> Option<&'a MountSpec> {
    mounts
        .iter()
        .filter(|m| m.kind != MountKind::Tmpfs)
        .filter(|m| {
            let target = m.target.trim_end_matches('/');
            target_path == target || target_path.starts_with(&format!("{target}/"))
        })
        .max_by_key(|m| m.target.len())
}

pub async fn get_archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let container = state.containers.get(&id)?;
    let path = params
        .get("path")
        .cloned()
        .ok_or_else(|| DaemonError::InvalidRequest("missing path query parameter".to_string()))?;

    let mount = find_mount_for_path(&container.spec.mounts, &path)
        .ok_or_else(|| DaemonError::InvalidRequest(format!("no mount covers path {path}")))?;
    let root = mount_host_root(&state, mount)?;
    let relative = path.trim_start_matches(&mount.target).trim_start_matches('/');
    let safe = SafePath::new(&root, relative).map_err(|e| DaemonError::InvalidRequest(e.to_string()))?;
    if !safe.exists() {
        return Err(DaemonError::InvalidRequest(format!("path {path} not found in container")));
    }

    let mut buf = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut buf);
        let name = safe.file_name().unwrap_or("data");
        if safe.is_dir() {
            builder
                .append_dir_all(name, safe.resolved())
                .map_err(|e| DaemonError::Internal(e.to_string()))?;
        } else {
            let mut file = std::fs::File::open(safe.resolved()).map_err(|e| DaemonError::Internal(e.to_string()))?;
            builder.append_file(name, &mut file).map_err(|e| DaemonError::Internal(e.to_string()))?;
        }
        builder.finish().map_err(|e| DaemonError::Internal(e.to_string()))?;
    }

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/x-tar")
        .body(Body::from(buf))
        .unwrap())
}

pub async fn put_archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Result<StatusCode> {
    let container = state.containers.get(&id)?;
    let path = params
        .get("path")
        .cloned()
        .ok_or_else(|| DaemonError::InvalidRequest("missing path query parameter".to_string()))?;

    let mount = find_mount_for_path(&container.spec.mounts, &path)
        .ok_or_else(|| DaemonError::InvalidRequest(format!("no mount covers path {path}")))?;
    if mount.read_only {
        return Err(DaemonError::OperationNotPermitted(format!(
            "mount at {} is read-only",
            mount.target
        )));
    }
    let root = mount_host_root(&state, mount)?;
    let relative = path.trim_start_matches(&mount.target).trim_start_matches('/');
    let safe = SafePath::new(&root, relative).map_err(|e| DaemonError::InvalidRequest(e.to_string()))?;
    std::fs::create_dir_all(safe.resolved()).map_err(|e| DaemonError::Internal(e.to_string()))?;

    let mut archive = tar::Archive::new(std::io::Cursor::new(body.as_ref()));
    archive
        .unpack(safe.resolved())
        .map_err(|e| DaemonError::InvalidRequest(format!("invalid tar stream: {e}")))?;

    Ok(StatusCode::OK)
}
