//! # specter-core
//!
//! Core types and pure logic for the Specter test runner: run
//! configuration, environment overlay loading, test-module discovery,
//! and harness-document synthesis.
//!
//! Everything here is side-effect free apart from the filesystem reads
//! that discovery and overlay loading require; serving, browser driving,
//! and process lifecycle live in the sibling crates.

mod config;
mod discovery;
mod env;
mod error;
mod harness;

pub use config::RunConfig;
pub use discovery::{discover, discover_from, DEFAULT_TEST_GLOB};
pub use env::{load_overlay, parse_overlay, EnvironmentMap, OVERLAY_FILENAME};
pub use error::{Result, SpecterError};
pub use harness::{render_harness, script_tag, ENV_PLACEHOLDER, SCRIPT_TAGS_PLACEHOLDER};
