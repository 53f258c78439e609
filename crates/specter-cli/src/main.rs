//! Specter CLI - headless browser test runner
//!
//! Usage:
//!   specter                          Run the default test glob
//!   specter <glob>                   Run modules matching a glob
//!   specter <dir>                    Run all modules under a directory
//!   specter <file> [file...]         Run explicit module files
//!   specter --coverage               Collect and print coverage
//!   specter --watch                  Keep serving and re-run on changes

use anyhow::{Context, Result};
use clap::Parser;
use specter_browser::{RunOutcome, SessionConfig, TestSession};
use specter_core::{discover, load_overlay, render_harness, RunConfig};
use specter_server::coverage::{InstrumentationHook, PassthroughHook, ReportSlot};
use specter_server::{build_server, harness_url, HarnessServer, ServerOptions, HARNESS_TEMPLATE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Upper bound on a single in-page run.
const RUN_TIMEOUT_SECONDS: u64 = 300;

#[derive(Parser)]
#[command(name = "specter")]
#[command(author, version, about = "Headless browser test runner")]
struct Cli {
    /// Test files, a directory, or a glob pattern
    #[arg(value_name = "PATH", allow_hyphen_values = true)]
    paths: Vec<String>,

    /// Collect coverage and print a text report after the run
    #[arg(long)]
    coverage: bool,

    /// Suppress page exceptions and resource errors
    #[arg(long)]
    quiet: bool,

    /// Keep the server alive and re-run tests on file changes
    #[arg(long, alias = "live")]
    watch: bool,

    /// Show full stack traces for failing assertions
    #[arg(long)]
    trace: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cwd = std::env::current_dir().context("cannot resolve working directory")?;
    let process_env: HashMap<String, String> = std::env::vars().collect();
    let overlay = load_overlay(&cwd, &process_env);
    let config = RunConfig::resolve(cli.coverage, cli.quiet, cli.watch, cli.trace, &overlay);

    let modules = discover(&cli.paths).context("failed to resolve test modules")?;
    info!("Discovered {} test module(s)", modules.len());

    let harness_path = harness_document_path();
    let html = render_harness(HARNESS_TEMPLATE, &modules, &overlay)
        .context("failed to render harness document")?;
    tokio::fs::write(&harness_path, &html)
        .await
        .with_context(|| format!("failed to write {}", harness_path.display()))?;

    let report = ReportSlot::default();
    let hook: Option<Arc<dyn InstrumentationHook>> = config
        .coverage
        .then(|| Arc::new(PassthroughHook) as Arc<dyn InstrumentationHook>);
    let mut server = build_server(
        ServerOptions {
            root: cwd,
            harness_path: harness_path.clone(),
            watch: config.watch,
        },
        hook,
        report.clone(),
    );

    // The harness document is on disk before the listener accepts, and
    // the browser connects only after the bind succeeded.
    server.listen().await?;

    let outcome = run_sessions(
        config,
        SessionConfig {
            url: harness_url(),
            ignore_exceptions: !config.verbose_errors,
            full_trace: config.full_trace,
            watch: config.watch,
            timeout_seconds: RUN_TIMEOUT_SECONDS,
        },
        server.as_mut(),
    )
    .await;

    finish(config, server, report, &harness_path, outcome).await
}

/// Drive one session in one-shot mode, or keep re-running on reload
/// notifications until Ctrl-C in watch mode.
async fn run_sessions(
    config: RunConfig,
    session_config: SessionConfig,
    server: &mut dyn HarnessServer,
) -> RunOutcome {
    let mut session = match TestSession::connect(session_config).await {
        Ok(session) => session,
        Err(e) => return RunOutcome::Failed(e.to_string()),
    };

    let mut outcome = session.run().await;
    report_outcome(&outcome);

    if !config.watch {
        if let Err(e) = session.close().await {
            warn!("browser close failed: {e}");
        }
        return outcome;
    }

    println!("Watching for changes; reconnect at {}", harness_url());
    let mut reloads = server.reload_events();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
            event = reloads.recv() => match event {
                Ok(reload) => {
                    info!("Change detected: {}", reload.path.display());
                    outcome = session.await_rerun().await;
                    report_outcome(&outcome);
                    println!("Watching for changes; reconnect at {}", harness_url());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("missed {skipped} reload notification(s)");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    if let Err(e) = session.close().await {
        warn!("browser close failed: {e}");
    }
    outcome
}

fn report_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Ended { passes, failures } => {
            info!("{} passing, {} failing", passes, failures);
        }
        RunOutcome::Failed(reason) => error!("browser session failed: {reason}"),
    }
}

/// Report & exit controller: print any captured coverage report, tear
/// down (one-shot) or leave the server artifacts in place (watch), and
/// map the session outcome onto the process exit code.
async fn finish(
    config: RunConfig,
    mut server: Box<dyn HarnessServer>,
    report: ReportSlot,
    harness_path: &Path,
    outcome: RunOutcome,
) -> Result<()> {
    if config.coverage {
        match report.get() {
            Some(text) => println!("{text}"),
            None => warn!("coverage enabled but no payload was received"),
        }
    }

    if config.watch {
        // Keep the harness document for reconnection; only the listener
        // itself goes away with the process.
        if let Err(e) = server.close().await {
            error!("server close failed: {e}");
        }
        return Ok(());
    }

    if let Err(e) = server.close().await {
        error!("server close failed: {e}");
    }
    if let Err(e) = tokio::fs::remove_file(harness_path).await {
        warn!(
            "could not delete harness document {}: {}",
            harness_path.display(),
            e
        );
    }

    if let RunOutcome::Failed(_) = outcome {
        // Teardown is complete; reflect the failed session in the exit
        // code without unwinding.
        std::process::exit(1);
    }
    Ok(())
}

/// Fixed on-disk location of the rendered harness document. Lives in
/// the temp directory so the working-directory static handler and the
/// watch-mode file watcher never see it.
fn harness_document_path() -> PathBuf {
    std::env::temp_dir().join("specter-index.html")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse_in_any_position() {
        let cli = Cli::try_parse_from(["specter", "--coverage", "a.js", "--watch", "b.js"])
            .unwrap();
        assert!(cli.coverage);
        assert!(cli.watch);
        assert_eq!(cli.paths, vec!["a.js".to_string(), "b.js".to_string()]);
    }

    #[test]
    fn test_positional_order_is_preserved() {
        let cli = Cli::try_parse_from(["specter", "z.js", "a.js", "m.js"]).unwrap();
        assert_eq!(
            cli.paths,
            vec!["z.js".to_string(), "a.js".to_string(), "m.js".to_string()]
        );
    }

    #[test]
    fn test_deprecated_watch_alias() {
        let cli = Cli::try_parse_from(["specter", "--live"]).unwrap();
        assert!(cli.watch);
    }

    #[test]
    fn test_defaults_are_off() {
        let cli = Cli::try_parse_from(["specter"]).unwrap();
        assert!(!cli.coverage);
        assert!(!cli.quiet);
        assert!(!cli.watch);
        assert!(!cli.trace);
        assert!(cli.paths.is_empty());
    }

    #[test]
    fn test_harness_document_path_is_outside_cwd() {
        let path = harness_document_path();
        assert!(path.starts_with(std::env::temp_dir()));
        assert_eq!(path.file_name().unwrap(), "specter-index.html");
    }
}
