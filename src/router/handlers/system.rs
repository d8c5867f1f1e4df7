//! `/_ping` and `/version` (spec §6)

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

pub async fn ping() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

pub async fn version() -> Json<serde_json::Value> {
    Json(json!({
        "Platform": { "Name": "vessel" },
        "Version": env!("CARGO_PKG_VERSION"),
        "ApiVersion": "1.51",
        "MinAPIVersion": "1.24",
        "Os": "linux",
        "Arch": "amd64",
    }))
}
