//! Environment overlay loading
//!
//! An optional `.env` file in the invocation directory supplies
//! `KEY=VALUE` pairs that are merged with same-named process environment
//! values (the environment wins) and injected into the harness document.
//! Values that parse as JSON are decoded so the page sees typed data;
//! everything else stays a raw string.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Overlay filename, resolved relative to the invocation directory.
pub const OVERLAY_FILENAME: &str = ".env";

/// Ordered key/value map injected into the harness document.
pub type EnvironmentMap = Map<String, Value>;

/// Load the overlay file from `dir` and merge it with `process_env`.
///
/// Never fails: a missing or unreadable overlay file is an empty overlay.
pub fn load_overlay(dir: &Path, process_env: &HashMap<String, String>) -> EnvironmentMap {
    let path = dir.join(OVERLAY_FILENAME);
    match std::fs::read_to_string(&path) {
        Ok(contents) => parse_overlay(&contents, process_env),
        Err(e) => {
            debug!("no environment overlay at {}: {}", path.display(), e);
            EnvironmentMap::new()
        }
    }
}

/// Parse overlay file contents and merge them with `process_env`.
///
/// Only keys named in the overlay file are exported; the process
/// environment overrides their values but cannot introduce new keys.
pub fn parse_overlay(contents: &str, process_env: &HashMap<String, String>) -> EnvironmentMap {
    let mut map = EnvironmentMap::new();
    for line in contents.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        // First '=' splits; a bare KEY line yields an empty value.
        let (key, raw) = line.split_once('=').unwrap_or((line, ""));
        let value = process_env.get(key).map(String::as_str).unwrap_or(raw);
        map.insert(key.to_string(), coerce(value));
    }
    map
}

/// JSON-decode a raw value when possible, otherwise keep it as a string.
fn coerce(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
