//! Daemon-wide error taxonomy and its mapping to the Docker Engine API's
//! JSON error shape.
//!
//! Manager code returns one of the kind-level errors below; handlers never
//! construct HTTP status codes themselves, they propagate `DaemonError` and
//! let `IntoResponse` do the single table lookup spec'd in the error design.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("no such container: {0}")]
    ContainerNotFound(String),

    #[error("No such image: {0}")]
    ImageNotFound(String),

    #[error("network {0} not found")]
    NetworkNotFound(String),

    #[error("get {0}: no such volume")]
    VolumeNotFound(String),

    #[error("No such exec instance: {0}")]
    ExecNotFound(String),

    #[error("Conflict. The container name \"{0}\" is already in use")]
    NameInUse(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    OperationNotPermitted(String),

    #[error("{0}")]
    Transient(String),

    #[error("internal invariant broken: {0}")]
    Internal(String),

    #[error(transparent)]
    Runtime(#[from] crate::runtime::RuntimeError),

    #[error(transparent)]
    State(#[from] crate::state::StateError),
}

impl From<crate::containers::ContainerManagerError> for DaemonError {
    fn from(e: crate::containers::ContainerManagerError) -> Self {
        use crate::containers::ContainerManagerError as E;
        match e {
            E::NotFound(id) => DaemonError::ContainerNotFound(id),
            E::NameInUse(name) => DaemonError::NameInUse(name),
            E::AlreadyRunning(id) => DaemonError::Conflict(format!("container {id} is already running")),
            E::NotRunning(id) => DaemonError::Conflict(format!("container {id} is not running")),
            E::NotPaused(id) => DaemonError::Conflict(format!("container {id} is not paused")),
            E::InvalidSpec(msg) => DaemonError::InvalidRequest(msg),
            E::RunningNotForced(id) => {
                DaemonError::Conflict(format!("container {id} is running: stop it or use force"))
            }
            E::State(e) => DaemonError::State(e),
            E::Runtime(e) => DaemonError::Runtime(e),
            E::Network(e) => e.into(),
            E::Volume(e) => e.into(),
            E::PortMap(e) => e.into(),
        }
    }
}

impl From<crate::networks::NetworkManagerError> for DaemonError {
    fn from(e: crate::networks::NetworkManagerError) -> Self {
        use crate::networks::NetworkManagerError as E;
        match e {
            E::NotFound(id) => DaemonError::NetworkNotFound(id),
            E::NameInUse(name) => DaemonError::Conflict(format!("network with name {name} already exists")),
            E::BuiltinUndeletable(name) => {
                DaemonError::OperationNotPermitted(format!("{name} is a pre-defined network and cannot be removed"))
            }
            E::HasActiveEndpoints(name) => {
                DaemonError::Conflict(format!("network {name} has active endpoints"))
            }
            E::Ipam(e) => DaemonError::Conflict(e.to_string()),
            E::State(e) => DaemonError::State(e),
            E::Runtime(e) => DaemonError::Runtime(e),
        }
    }
}

impl From<crate::volumes::VolumeManagerError> for DaemonError {
    fn from(e: crate::volumes::VolumeManagerError) -> Self {
        use crate::volumes::VolumeManagerError as E;
        match e {
            E::NotFound(name) => DaemonError::VolumeNotFound(name),
            E::AlreadyExists(name) => DaemonError::Conflict(format!("volume {name} already exists")),
            E::InUse(name) => DaemonError::Conflict(format!("volume {name} is in use and cannot be removed")),
            E::Filesystem(e) => DaemonError::Internal(e.to_string()),
            E::State(e) => DaemonError::State(e),
        }
    }
}

impl From<crate::ports::PortMapError> for DaemonError {
    fn from(e: crate::ports::PortMapError) -> Self {
        match e {
            crate::ports::PortMapError::Conflict(ip, port, proto) => DaemonError::Conflict(format!(
                "Bind for {ip}:{port} failed: port is already allocated ({proto})"
            )),
            crate::ports::PortMapError::Bind(e) => DaemonError::Transient(e.to_string()),
            crate::ports::PortMapError::State(e) => DaemonError::State(e),
        }
    }
}

impl From<crate::images::ImageManagerError> for DaemonError {
    fn from(e: crate::images::ImageManagerError) -> Self {
        use crate::images::backend::ImageBackendError as B;
        use crate::images::ImageManagerError as E;
        match e {
            E::Backend(B::NotFound(r)) => DaemonError::ImageNotFound(r),
            E::Backend(B::InUse(r)) => {
                DaemonError::Conflict(format!("unable to delete {r}: image is being used by a container"))
            }
            E::Backend(B::PullFailed(msg)) => DaemonError::Transient(msg),
            E::Backend(B::Io(e)) => DaemonError::Internal(e.to_string()),
        }
    }
}

impl From<crate::exec::ExecManagerError> for DaemonError {
    fn from(e: crate::exec::ExecManagerError) -> Self {
        use crate::exec::ExecManagerError as E;
        match e {
            E::NotFound(id) => DaemonError::ExecNotFound(id),
            E::AlreadyStarted(id) => DaemonError::Conflict(format!("exec {id} has already started")),
            E::Container(e) => e.into(),
            E::Runtime(e) => DaemonError::Runtime(e),
        }
    }
}

impl From<crate::logstore::LogStoreError> for DaemonError {
    fn from(e: crate::logstore::LogStoreError) -> Self {
        DaemonError::Internal(e.to_string())
    }
}

impl DaemonError {
    fn status(&self) -> StatusCode {
        match self {
            DaemonError::ContainerNotFound(_)
            | DaemonError::ImageNotFound(_)
            | DaemonError::NetworkNotFound(_)
            | DaemonError::VolumeNotFound(_)
            | DaemonError::ExecNotFound(_) => StatusCode::NOT_FOUND,

            DaemonError::NameInUse(_) | DaemonError::Conflict(_) => StatusCode::CONFLICT,

            DaemonError::InvalidRequest(_) => StatusCode::BAD_REQUEST,

            DaemonError::OperationNotPermitted(_) => StatusCode::FORBIDDEN,

            DaemonError::Transient(_) => StatusCode::INTERNAL_SERVER_ERROR,

            DaemonError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,

            DaemonError::Runtime(e) => e.status(),
            DaemonError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, "handler returned server error");
        }

        (status, Json(json!({ "message": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
