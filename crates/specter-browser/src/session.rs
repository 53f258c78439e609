//! Browser session lifecycle over the Chrome DevTools Protocol

use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use specter_core::{Result, SpecterError};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Launch flags the harness page depends on: certificate tolerance for
/// local hostnames and fake media devices for tests touching
/// getUserMedia-style APIs.
const LAUNCH_FLAGS: [&str; 4] = [
    "--ignore-certificate-errors",
    "--allow-insecure-localhost",
    "--use-fake-device-for-media-stream",
    "--use-fake-ui-for-media-stream",
];

/// Interval between harness-state polls.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long a page reload may take before a re-run poll gives up
/// waiting for the fresh run to start.
const RESTART_GRACE: Duration = Duration::from_secs(10);

/// Configuration for one browser session, passed through verbatim from
/// the run configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Harness URL (scheme://host:port, no filename).
    pub url: String,
    /// Drop page exceptions instead of relaying them to the log.
    pub ignore_exceptions: bool,
    /// Ask the in-page framework for full stack traces.
    pub full_trace: bool,
    /// Subscribe the page to reload notifications.
    pub watch: bool,
    /// Upper bound on a single run.
    pub timeout_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            ignore_exceptions: false,
            full_trace: false,
            watch: false,
            timeout_seconds: 300,
        }
    }
}

/// Terminal state of one session. `Ended` means the tests finished,
/// however many passed; `Failed` means the session could not run to
/// completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Ended { passes: u64, failures: u64 },
    Failed(String),
}

/// Run state published by the harness page on `window.__specter.state`.
#[derive(Debug, Default, Deserialize)]
struct HarnessState {
    #[serde(default)]
    ended: bool,
    #[serde(default)]
    passes: u64,
    #[serde(default)]
    failures: u64,
    #[serde(default)]
    errors: Vec<String>,
}

/// Active headless browser session driving the harness page.
pub struct TestSession {
    /// Underlying browser instance (kept alive for tab lifetime)
    #[allow(dead_code)]
    browser: Browser,
    tab: Arc<Tab>,
    config: SessionConfig,
    errors_reported: usize,
}

impl TestSession {
    /// Launch a headless browser and open the tab for the harness.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        info!("Launching headless browser");

        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .map_err(|e| SpecterError::Connection(format!("launch options: {}", e)))?;
        for flag in LAUNCH_FLAGS {
            launch_options.args.push(OsStr::new(flag));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| SpecterError::Connection(format!("failed to launch browser: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| SpecterError::Connection(format!("failed to create tab: {}", e)))?;

        debug!("browser connected");
        Ok(Self {
            browser,
            tab,
            config,
            errors_reported: 0,
        })
    }

    /// Navigate to the harness page and drive one run to its terminal
    /// state. Never panics and never propagates an error: any driver
    /// failure becomes `RunOutcome::Failed` so the orchestrator can log
    /// it and proceed to teardown.
    pub async fn run(&mut self) -> RunOutcome {
        let url = self.page_url();
        info!("Running tests at {}", url);
        match self.navigate(&url) {
            Ok(()) => self.await_completion().await,
            Err(e) => RunOutcome::Failed(e.to_string()),
        }
    }

    /// Wait out a watch-mode page reload, then drive the fresh run to
    /// its terminal state. Reload notifications arrive before the page
    /// has re-registered its tests, so completion polling only starts
    /// once the previous ended state has been cleared by the reload.
    pub async fn await_rerun(&mut self) -> RunOutcome {
        let deadline = Instant::now() + RESTART_GRACE;
        while Instant::now() < deadline {
            match self.poll_state() {
                Ok(state) if !state.ended => break,
                Ok(_) => {}
                // Evaluation fails mid-reload while the context swaps out.
                Err(_) => {}
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        self.errors_reported = 0;
        self.await_completion().await
    }

    /// Poll the harness run state until it reports ended or the run
    /// times out.
    pub async fn await_completion(&mut self) -> RunOutcome {
        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_seconds);
        loop {
            match self.poll_state() {
                Ok(state) => {
                    self.relay_errors(&state);
                    if state.ended {
                        return RunOutcome::Ended {
                            passes: state.passes,
                            failures: state.failures,
                        };
                    }
                }
                Err(e) => return RunOutcome::Failed(e.to_string()),
            }

            if Instant::now() >= deadline {
                return RunOutcome::Failed(format!(
                    "harness did not finish within {}s",
                    self.config.timeout_seconds
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Close the browser session.
    pub async fn close(self) -> Result<()> {
        debug!("closing browser session");
        // Browser is dropped and cleaned up with the session.
        Ok(())
    }

    fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| SpecterError::Session(format!("failed to navigate to {}: {}", url, e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| SpecterError::Session(format!("navigation to {} timed out: {}", url, e)))?;
        Ok(())
    }

    /// Read `window.__specter.state` from the page. A page without the
    /// harness glue yet (mid-load) reads as the default state.
    fn poll_state(&self) -> Result<HarnessState> {
        let result = self
            .tab
            .evaluate(
                "JSON.stringify(window.__specter ? window.__specter.state : null)",
                false,
            )
            .map_err(|e| SpecterError::Session(format!("harness state poll failed: {}", e)))?;

        let Some(raw) = result.value.as_ref().and_then(|v| v.as_str()) else {
            return Ok(HarnessState::default());
        };
        if raw == "null" {
            return Ok(HarnessState::default());
        }
        serde_json::from_str(raw)
            .map_err(|e| SpecterError::Session(format!("unreadable harness state: {}", e)))
    }

    /// Relay page errors the harness collected, unless the session is
    /// configured to ignore exceptions.
    fn relay_errors(&mut self, state: &HarnessState) {
        if self.config.ignore_exceptions {
            return;
        }
        for error in state.errors.iter().skip(self.errors_reported) {
            warn!("page error: {}", error);
        }
        self.errors_reported = state.errors.len();
    }

    fn page_url(&self) -> String {
        page_url(&self.config)
    }
}

/// Harness URL with the run options the page reads from its query
/// string.
fn page_url(config: &SessionConfig) -> String {
    let mut params: Vec<&str> = Vec::new();
    if config.full_trace {
        params.push("fullTrace=1");
    }
    if config.watch {
        params.push("watch=1");
    }
    if params.is_empty() {
        config.url.clone()
    } else {
        format!("{}/?{}", config.url.trim_end_matches('/'), params.join("&"))
    }
}
