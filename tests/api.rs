//! End-to-end exercises against the router, built with stub collaborators.
//! No socket is bound; requests go straight through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use vessel_daemon::containers::ContainerManager;
use vessel_daemon::events::EventBus;
use vessel_daemon::exec::ExecManager;
use vessel_daemon::images::backend::StubImageBackend;
use vessel_daemon::images::ImageManager;
use vessel_daemon::logstore::LogStore;
use vessel_daemon::networks::NetworkManager;
use vessel_daemon::ports::PortMapManager;
use vessel_daemon::router::{build_router, AppState};
use vessel_daemon::runtime::{StubBridgeController, StubVmRuntime};
use vessel_daemon::state::StateStore;
use vessel_daemon::volumes::VolumeManager;

async fn test_app() -> (axum::Router, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let events = EventBus::new();
    let logs = Arc::new(LogStore::new(tmp.path().join("logs")));

    let bridge = Arc::new(StubBridgeController::new());
    let networks = Arc::new(NetworkManager::new(store.clone(), bridge));
    networks.ensure_builtins().await.unwrap();

    let volumes = Arc::new(VolumeManager::new(store.clone(), tmp.path().join("volumes")));
    let ports = Arc::new(PortMapManager::new(store.clone()));
    let runtime = Arc::new(StubVmRuntime::new());
    let containers = ContainerManager::new(
        store.clone(),
        runtime,
        networks.clone(),
        volumes.clone(),
        ports.clone(),
        logs.clone(),
        events.clone(),
    );
    let exec = Arc::new(ExecManager::new(containers.clone()));
    let images = Arc::new(ImageManager::new(Arc::new(StubImageBackend::new()), events.clone()));

    let config = Arc::new(vessel_daemon::Configuration::load_defaults(tmp.path()).unwrap());

    let state = AppState {
        containers,
        networks,
        volumes,
        ports,
        images,
        exec,
        events,
        config,
    };
    (build_router(state), tmp)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ping_responds_ok() {
    let (app, _tmp) = test_app().await;
    let res = app
        .oneshot(Request::get("/_ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn version_reports_api_version() {
    let (app, _tmp) = test_app().await;
    let res = app
        .oneshot(Request::get("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["ApiVersion"], "1.51");
}

#[tokio::test]
async fn unversioned_and_versioned_paths_reach_the_same_route() {
    let (app, _tmp) = test_app().await;
    let res = app
        .clone()
        .oneshot(Request::get("/v1.45/_ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn empty_daemon_lists_no_containers_or_images() {
    let (app, _tmp) = test_app().await;

    let res = app
        .clone()
        .oneshot(Request::get("/containers/json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body.as_array().unwrap().len(), 0);

    let res = app
        .oneshot(Request::get("/images/json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn default_bridge_network_exists_on_boot() {
    let (app, _tmp) = test_app().await;
    let res = app
        .oneshot(Request::get("/networks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    let names: Vec<&str> = body.as_array().unwrap().iter().map(|n| n["Name"].as_str().unwrap()).collect();
    assert!(names.contains(&"bridge"));
}

#[tokio::test]
async fn create_container_requires_an_existing_image() {
    let (app, _tmp) = test_app().await;
    let req = Request::post("/containers/create")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "Image": "does-not-exist:latest" }).to_string()))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn container_lifecycle_create_then_inspect_then_remove() {
    let (app, _tmp) = test_app().await;

    // Pulling registers the image with the stub backend.
    let res = app
        .clone()
        .oneshot(
            Request::post("/images/create?fromImage=alpine&tag=latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let _drain = res.into_body().collect().await.unwrap();

    let create_req = Request::post("/containers/create?name=api-test")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "Image": "alpine:latest", "Cmd": ["/bin/sh"] }).to_string()))
        .unwrap();
    let res = app.clone().oneshot(create_req).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = body_json(res).await;
    let id = body["Id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(
            Request::get(format!("/containers/{id}/json"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["Name"], "/api-test");
    assert_eq!(body["State"]["Status"], "created");

    let res = app
        .oneshot(
            Request::delete(format!("/containers/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn volume_create_list_remove_roundtrip() {
    let (app, _tmp) = test_app().await;

    let req = Request::post("/volumes/create")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "Name": "data" }).to_string()))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(Request::get("/volumes").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["Volumes"].as_array().unwrap().len(), 1);

    let res = app
        .oneshot(Request::delete("/volumes/data").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}
