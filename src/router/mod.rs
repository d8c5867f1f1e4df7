//! HTTP router
//!
//! Wires every resource's handlers under the version-normalizer and
//! request-logger middleware pipeline (spec §4.2). The normalizer is
//! applied first (`.layer()` calls wrap outward, so the last call becomes
//! the outermost layer) so it still runs before the router's pattern
//! matching, while the tracing layer remains outermost and times the whole
//! round trip including normalization.

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod upgrade;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::containers::ContainerManager;
use crate::events::EventBus;
use crate::exec::ExecManager;
use crate::images::ImageManager;
use crate::networks::NetworkManager;
use crate::ports::PortMapManager;
use crate::volumes::VolumeManager;
use crate::Configuration;

#[derive(Clone)]
pub struct AppState {
    pub containers: Arc<ContainerManager>,
    pub networks: Arc<NetworkManager>,
    pub volumes: Arc<VolumeManager>,
    pub ports: Arc<PortMapManager>,
    pub images: Arc<ImageManager>,
    pub exec: Arc<ExecManager>,
    pub events: EventBus,
    pub config: Arc<Configuration>,
}

pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/_ping", get(handlers::system::ping).head(handlers::system::ping))
        .route("/version", get(handlers::system::version))
        .route("/containers/json", get(handlers::containers::list))
        .route("/containers/create", post(handlers::containers::create))
        .route("/containers/prune", post(handlers::containers::prune))
        .route("/containers/:id/json", get(handlers::containers::inspect))
        .route("/containers/:id/start", post(handlers::containers::start))
        .route("/containers/:id/stop", post(handlers::containers::stop))
        .route("/containers/:id/kill", post(handlers::containers::kill))
        .route("/containers/:id/restart", post(handlers::containers::restart))
        .route("/containers/:id/pause", post(handlers::containers::pause))
        .route("/containers/:id/unpause", post(handlers::containers::unpause))
        .route("/containers/:id/rename", post(handlers::containers::rename))
        .route("/containers/:id/resize", post(handlers::containers::resize))
        .route("/containers/:id/update", post(handlers::containers::update))
        .route("/containers/:id/wait", post(handlers::containers::wait))
        .route("/containers/:id/logs", get(handlers::containers::logs))
        .route("/containers/:id/attach", post(handlers::containers::attach))
        .route("/containers/:id/stats", get(handlers::containers::stats))
        .route("/containers/:id/top", get(handlers::containers::top))
        .route("/containers/:id/changes", get(handlers::containers::changes))
        .route(
            "/containers/:id/archive",
            get(handlers::containers::get_archive).put(handlers::containers::put_archive),
        )
        .route("/containers/:id", delete(handlers::containers::remove))
        .route("/containers/:id/exec", post(handlers::exec::create))
        .route("/exec/:id/start", post(handlers::exec::start))
        .route("/exec/:id/resize", post(handlers::exec::resize))
        .route("/exec/:id/json", get(handlers::exec::inspect))
        .route("/images/json", get(handlers::images::list))
        .route("/images/create", post(handlers::images::create))
        .route("/images/prune", post(handlers::images::prune))
        .route("/images/load", post(handlers::images::load))
        .route("/images/:name/json", get(handlers::images::inspect))
        .route("/images/:name", delete(handlers::images::remove))
        .route("/networks", get(handlers::networks::list))
        .route("/networks/create", post(handlers::networks::create))
        .route("/networks/prune", post(handlers::networks::prune))
        .route("/networks/:id", get(handlers::networks::inspect).delete(handlers::networks::remove))
        .route("/networks/:id/connect", post(handlers::networks::connect))
        .route("/networks/:id/disconnect", post(handlers::networks::disconnect))
        .route("/volumes", get(handlers::volumes::list))
        .route("/volumes/create", post(handlers::volumes::create))
        .route("/volumes/prune", post(handlers::volumes::prune))
        .route("/volumes/:name", get(handlers::volumes::inspect).delete(handlers::volumes::remove))
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::normalize_version_prefix));

    Router::new().merge(routes).layer(TraceLayer::new_for_http())
}
