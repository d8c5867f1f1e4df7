//! Small typed-query helpers shared by handlers
//!
//! Docker's query strings are stringly-typed (`"1"`, `"true"`, a JSON blob
//! in `filters`), so each handler would otherwise repeat the same
//! parse-or-400 boilerplate. These helpers centralize it.

use std::collections::HashMap;

use crate::error::DaemonError;

pub fn query_bool(params: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match params.get(key).map(String::as_str) {
        Some("1") | Some("true") => true,
        Some("0") | Some("false") => false,
        _ => default,
    }
}

pub fn query_u64(params: &HashMap<String, String>, key: &str) -> Result<Option<u64>, DaemonError> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v
            .parse::<u64>()
            .map(Some)
            .map_err(|_| DaemonError::InvalidRequest(format!("invalid value for {key}: {v}"))),
    }
}

pub fn query_i64(params: &HashMap<String, String>, key: &str) -> Result<Option<i64>, DaemonError> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| DaemonError::InvalidRequest(format!("invalid value for {key}: {v}"))),
    }
}

/// `tail` accepts either a non-negative integer or the literal `"all"`.
#[derive(Debug, Clone, Copy)]
pub enum TailSpec {
    All,
    Last(usize),
}

pub fn query_tail(params: &HashMap<String, String>) -> Result<TailSpec, DaemonError> {
    match params.get("tail").map(String::as_str) {
        None | Some("all") => Ok(TailSpec::All),
        Some(v) => v
            .parse::<usize>()
            .map(TailSpec::Last)
            .map_err(|_| DaemonError::InvalidRequest(format!("invalid tail value: {v}"))),
    }
}

/// Docker's `filters` query parameter: a JSON object of `{key: [values]}`.
pub fn query_filters(params: &HashMap<String, String>) -> HashMap<String, Vec<String>> {
    params
        .get("filters")
        .and_then(|raw| serde_json::from_str::<HashMap<String, Vec<String>>>(raw).ok())
        .unwrap_or_default()
}

pub fn filter_values<'a>(filters: &'a HashMap<String, Vec<String>>, key: &str) -> &'a [String] {
    filters.get(key).map(Vec::as_slice).unwrap_or(&[])
}

pub fn label_filter_pairs(values: &[String]) -> Vec<(String, Option<String>)> {
    values
        .iter()
        .map(|v| match v.split_once('=') {
            Some((k, val)) => (k.to_string(), Some(val.to_string())),
            None => (v.clone(), None),
        })
        .collect()
}
