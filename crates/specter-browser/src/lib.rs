//! # specter-browser
//!
//! Browser session driver bridging the orchestrator to a headless
//! Chrome instance via the DevTools protocol. The driver navigates to
//! the served harness page, polls the run state the harness publishes,
//! and reports exactly one terminal [`RunOutcome`] per session.

mod session;

pub use session::{RunOutcome, SessionConfig, TestSession};
