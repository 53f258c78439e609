//! Coverage ingestion and report rendering
//!
//! The harness page posts an istanbul-style coverage map to `/coverage`
//! once its run ends. The payload is rendered to a text table and parked
//! in a write-once slot that the report controller reads after the
//! session terminates. Source instrumentation itself is an external
//! concern behind [`InstrumentationHook`].

use crate::server::{AppState, SharedState};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Write-once slot carrying the rendered report text from the ingestion
/// endpoint to the report controller.
pub type ReportSlot = Arc<OnceLock<String>>;

/// Rewrites served sources to emit coverage counters.
///
/// Returning `None` delegates the request to the static handler chain.
pub trait InstrumentationHook: Send + Sync {
    fn instrument(&self, path: &Path, source: &str) -> Option<String>;
}

/// Hook that serves sources unmodified through the instrumentation
/// slot; a real instrumenter is plugged in at server construction.
pub struct PassthroughHook;

impl InstrumentationHook for PassthroughHook {
    fn instrument(&self, _path: &Path, source: &str) -> Option<String> {
        Some(source.to_string())
    }
}

/// POST /coverage — ingest a coverage map posted by the harness page.
///
/// Malformed JSON is rejected with 400 rather than dropped silently;
/// repeat payloads (watch-mode re-runs) are dropped once the slot is
/// taken. Always responds, so the connection is never left hanging.
pub async fn ingest(State(app): State<SharedState>, body: String) -> Response {
    match serde_json::from_str::<Value>(&body) {
        Ok(payload) => {
            let report = render_text_report(&payload);
            if app.report.set(report).is_err() {
                debug!("coverage report already captured; dropping repeat payload");
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            warn!("malformed coverage payload: {e}");
            (StatusCode::BAD_REQUEST, "malformed coverage payload\n").into_response()
        }
    }
}

/// Decide whether the instrumentation hook intercepts a request path.
///
/// Framework assets (`mocha.*`, `chai.js`) and directories pass through
/// untouched; everything else that names an existing file under the
/// served root is eligible.
pub fn hook_matches(root: &Path, url_path: &str) -> bool {
    if url_path.contains("mocha.") || url_path.contains("chai.js") {
        return false;
    }
    root.join(url_path.trim_start_matches('/')).is_file()
}

/// Instrumentation stage of the request chain. `None` delegates to the
/// static handlers.
pub(crate) async fn hook_response(app: &AppState, url_path: &str) -> Option<Response> {
    let hook = app.hook.as_ref()?;
    if !hook_matches(&app.root, url_path) {
        return None;
    }

    let full = app.root.join(url_path.trim_start_matches('/'));
    let source = tokio::fs::read_to_string(&full).await.ok()?;
    let instrumented = hook.instrument(&full, &source)?;
    let mime = mime_guess::from_path(&full)
        .first_or_octet_stream()
        .to_string();
    Some(([(header::CONTENT_TYPE, mime)], instrumented).into_response())
}

/// Render an istanbul-style coverage map as a text table with
/// per-file statement, branch, and function percentages.
pub fn render_text_report(payload: &Value) -> String {
    let mut rows: Vec<FileRow> = payload
        .as_object()
        .map(|files| {
            files
                .iter()
                .filter_map(|(key, entry)| FileRow::from_entry(key, entry))
                .collect()
        })
        .unwrap_or_default();

    if rows.is_empty() {
        return "no coverage data collected\n".to_string();
    }
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    let totals = FileRow {
        name: "All files".to_string(),
        statements: Tally::sum(rows.iter().map(|r| r.statements)),
        branches: Tally::sum(rows.iter().map(|r| r.branches)),
        functions: Tally::sum(rows.iter().map(|r| r.functions)),
    };

    let width = rows
        .iter()
        .map(|r| r.name.len())
        .chain([totals.name.len(), "File".len()])
        .max()
        .unwrap_or(4);
    let rule = format!("{}|---------|----------|---------|\n", "-".repeat(width + 2));

    let mut out = String::new();
    out.push_str(&rule);
    out.push_str(&format!(
        " {:<width$} | % Stmts | % Branch | % Funcs |\n",
        "File"
    ));
    out.push_str(&rule);
    for row in &rows {
        out.push_str(&row.render(width));
    }
    out.push_str(&rule);
    out.push_str(&totals.render(width));
    out.push_str(&rule);
    out
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    covered: u64,
    total: u64,
}

impl Tally {
    fn percent(self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.covered as f64 * 100.0 / self.total as f64
        }
    }

    fn sum(parts: impl Iterator<Item = Tally>) -> Tally {
        parts.fold(Tally::default(), |acc, t| Tally {
            covered: acc.covered + t.covered,
            total: acc.total + t.total,
        })
    }
}

#[derive(Debug)]
struct FileRow {
    name: String,
    statements: Tally,
    branches: Tally,
    functions: Tally,
}

impl FileRow {
    fn from_entry(key: &str, entry: &Value) -> Option<Self> {
        let entry = entry.as_object()?;
        let name = entry
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(key)
            .to_string();
        Some(Self {
            name,
            statements: tally_hits(entry.get("s")),
            branches: tally_hits(entry.get("b")),
            functions: tally_hits(entry.get("f")),
        })
    }

    fn render(&self, width: usize) -> String {
        format!(
            " {:<width$} | {:>7.2} | {:>8.2} | {:>7.2} |\n",
            self.name,
            self.statements.percent(),
            self.branches.percent(),
            self.functions.percent(),
        )
    }
}

/// Tally hit counters: `s`/`f` map counter id to a count, `b` maps
/// counter id to a per-branch count array.
fn tally_hits(counters: Option<&Value>) -> Tally {
    let mut tally = Tally::default();
    let Some(map) = counters.and_then(Value::as_object) else {
        return tally;
    };
    for value in map.values() {
        match value {
            Value::Array(branches) => {
                for hit in branches {
                    tally.total += 1;
                    if hit.as_u64().unwrap_or(0) > 0 {
                        tally.covered += 1;
                    }
                }
            }
            other => {
                tally.total += 1;
                if other.as_u64().unwrap_or(0) > 0 {
                    tally.covered += 1;
                }
            }
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_map() -> Value {
        json!({
            "src/a.js": {
                "path": "src/a.js",
                "s": { "0": 1, "1": 0 },
                "f": { "0": 2 },
                "b": { "0": [1, 0] }
            },
            "src/b.js": {
                "s": { "0": 3 },
                "f": {},
                "b": {}
            }
        })
    }

    #[test]
    fn test_report_lists_files_and_percentages() {
        let report = render_text_report(&sample_map());
        assert!(report.contains("src/a.js"));
        assert!(report.contains("src/b.js"));
        assert!(report.contains("% Stmts"));
        // a: 1/2 statements, 1/2 branches, 1/1 functions
        assert!(report.contains("50.00"));
        assert!(report.contains("100.00"));
    }

    #[test]
    fn test_report_totals_row() {
        let report = render_text_report(&sample_map());
        // 2/3 statements covered across both files
        assert!(report.contains("All files"));
        assert!(report.contains("66.67"));
    }

    #[test]
    fn test_empty_payload_has_explicit_text() {
        assert_eq!(render_text_report(&json!({})), "no coverage data collected\n");
        assert_eq!(
            render_text_report(&json!("not a map")),
            "no coverage data collected\n"
        );
    }

    #[test]
    fn test_report_slot_is_write_once() {
        let slot = ReportSlot::default();
        assert!(slot.set("first".to_string()).is_ok());
        assert!(slot.set("second".to_string()).is_err());
        assert_eq!(slot.get().map(String::as_str), Some("first"));
    }

    #[test]
    fn test_hook_matcher_skips_framework_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.js"), "x").unwrap();
        std::fs::write(dir.path().join("chai.js"), "x").unwrap();

        assert!(hook_matches(dir.path(), "/src/app.js"));
        assert!(!hook_matches(dir.path(), "/src"));
        assert!(!hook_matches(dir.path(), "/chai.js"));
        assert!(!hook_matches(dir.path(), "/node_modules/mocha/mocha.js"));
        assert!(!hook_matches(dir.path(), "/missing.js"));
    }

    #[test]
    fn test_passthrough_hook_returns_source_unchanged() {
        let hook = PassthroughHook;
        let out = hook.instrument(Path::new("a.js"), "const x = 1\n");
        assert_eq!(out.as_deref(), Some("const x = 1\n"));
    }
}
