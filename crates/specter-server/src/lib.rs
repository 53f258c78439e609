//! # specter-server
//!
//! Transient web server for the Specter harness: serves the rendered
//! harness document and the working directory's assets on a fixed local
//! hostname/port, ingests coverage payloads, and — in watch mode —
//! broadcasts reload notifications from a working-directory file
//! watcher.
//!
//! Both lifecycle variants (one-shot and watch) sit behind the
//! [`HarnessServer`] trait so the rest of the orchestrator is agnostic
//! to which mode is active.

pub mod assets;
pub mod coverage;
mod server;
pub mod sse;
pub mod watch;

pub use server::{
    build_router, build_server, AppState, HarnessServer, OneShotServer, ServerOptions,
    SharedState, WatchServer,
};

/// Fixed hostname the harness is served under. `*.localhost` names
/// resolve to loopback without /etc/hosts entries.
pub const HOST: &str = "specter.localhost";

/// Fixed port: 7357 spells TEST.
pub const PORT: u16 = 7357;

/// Loopback address the listener actually binds.
pub const BIND_ADDR: &str = "127.0.0.1:7357";

/// URL the browser session connects to.
pub fn harness_url() -> String {
    format!("http://{HOST}:{PORT}")
}

/// Embedded harness page template with `{test}` and `{env}` placeholders.
pub const HARNESS_TEMPLATE: &str = include_str!("../runner/test.html");
