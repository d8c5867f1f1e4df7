//! Version-prefix normalization (spec §4.2)
//!
//! Docker clients prefix every path with `/vMAJOR.MINOR`. The normalizer
//! strips it to a canonical path before the router's pattern matching runs,
//! while keeping the original URI around (in an extension) for the
//! request-logger layer that wraps this one.

use std::sync::OnceLock;

use axum::body::Body;
use axum::extract::Request;
use axum::http::Uri;
use axum::middleware::Next;
use axum::response::Response;
use regex::Regex;

fn version_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/v\d+\.\d+(/|$)").unwrap())
}

/// The original request URI, stashed for the tracing layer to log.
#[derive(Debug, Clone)]
pub struct OriginalUri(pub Uri);

pub async fn normalize_version_prefix(mut req: Request<Body>, next: Next) -> Response {
    let original = req.uri().clone();

    if let Some(m) = version_prefix().find(original.path()) {
        let stripped = &original.path()[m.end() - 1..];
        let mut parts = original.clone().into_parts();
        let new_path_and_query = match original.query() {
            Some(q) => format!("{stripped}?{q}"),
            None => stripped.to_string(),
        };
        if let Ok(new_uri) = new_path_and_query.parse::<Uri>() {
            parts.path_and_query = new_uri.into_parts().path_and_query;
            if let Ok(rewritten) = Uri::from_parts(parts) {
                *req.uri_mut() = rewritten;
            }
        }
    }

    req.extensions_mut().insert(OriginalUri(original));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_version_prefix() {
        let caps = version_prefix().find("/v1.51/containers/json").unwrap();
        let stripped = &"/v1.51/containers/json"[caps.end() - 1..];
        assert_eq!(stripped, "/containers/json");
    }

    #[test]
    fn leaves_unversioned_paths_alone() {
        assert!(version_prefix().find("/containers/json").is_none());
    }

    #[test]
    fn strips_bare_version_root() {
        let caps = version_prefix().find("/v1.51").unwrap();
        let stripped = &"/v1.51"[caps.end() - 1..];
        assert_eq!(stripped, "/");
    }
}
