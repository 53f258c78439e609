//! Working-directory file watcher for watch mode
//!
//! Bridges notify's callback API onto a broadcast channel. Change
//! notifications fan out to the SSE endpoint (page reload) and to the
//! orchestrator run loop (session re-arm).

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use specter_core::{Result, SpecterError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Change notification broadcast to reload subscribers.
#[derive(Debug, Clone)]
pub struct Reload {
    pub path: PathBuf,
}

/// Extensions that trigger a reload.
const WATCHED_EXTENSIONS: [&str; 6] = ["js", "mjs", "cjs", "html", "css", "json"];

/// Quiet period collapsing editor write bursts into one reload.
const DEBOUNCE: Duration = Duration::from_millis(200);

/// Recursive watcher over the served root, forwarding relevant change
/// events to a broadcast channel until stopped.
pub struct AssetWatcher {
    watcher: Option<RecommendedWatcher>,
    handle: Option<JoinHandle<()>>,
}

impl AssetWatcher {
    /// Watch `root` recursively and broadcast relevant changes on `tx`.
    pub fn spawn(root: &Path, tx: broadcast::Sender<Reload>) -> Result<Self> {
        let (fs_tx, fs_rx) = std::sync::mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // A send error means the forwarder is gone; the watcher
                // itself is about to be dropped.
                let _ = fs_tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| SpecterError::Watcher(e.to_string()))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| SpecterError::Watcher(e.to_string()))?;
        debug!("watching {} for asset changes", root.display());

        let handle = tokio::task::spawn_blocking(move || {
            let mut last_reload: Option<Instant> = None;
            while let Ok(res) = fs_rx.recv() {
                match res {
                    Ok(event) => {
                        let Some(path) = relevant_path(&event) else {
                            continue;
                        };
                        if last_reload.is_some_and(|at| at.elapsed() < DEBOUNCE) {
                            continue;
                        }
                        last_reload = Some(Instant::now());
                        debug!("change detected: {}", path.display());
                        if tx.send(Reload { path }).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("file watcher error: {e}"),
                }
            }
        });

        Ok(Self {
            watcher: Some(watcher),
            handle: Some(handle),
        })
    }

    /// Stop watching and wait for the forwarding task to drain.
    pub async fn stop(&mut self) {
        // Dropping the watcher closes the callback channel, which ends
        // the forwarding loop.
        self.watcher.take();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("watcher task join error: {e}");
            }
        }
    }
}

/// Pick the first watchable path out of a filesystem event.
fn relevant_path(event: &Event) -> Option<PathBuf> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return None;
    }
    event.paths.iter().find(|p| is_watched(p)).cloned()
}

/// Watch filter: matching extension, outside node_modules and hidden
/// directories.
fn is_watched(path: &Path) -> bool {
    let extension_matches = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| WATCHED_EXTENSIONS.contains(&ext));
    if !extension_matches {
        return false;
    }

    !path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        name == "node_modules" || (name.len() > 1 && name != ".." && name.starts_with('.'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watches_script_and_markup_files() {
        assert!(is_watched(Path::new("/work/src/app.js")));
        assert!(is_watched(Path::new("/work/index.html")));
        assert!(is_watched(Path::new("/work/style.css")));
        assert!(is_watched(Path::new("/work/config.json")));
    }

    #[test]
    fn test_ignores_unrelated_extensions() {
        assert!(!is_watched(Path::new("/work/README.md")));
        assert!(!is_watched(Path::new("/work/binary")));
        assert!(!is_watched(Path::new("/work/photo.png")));
    }

    #[test]
    fn test_ignores_dependency_and_hidden_directories() {
        assert!(!is_watched(Path::new("/work/node_modules/pkg/index.js")));
        assert!(!is_watched(Path::new("/work/.git/hooks/pre-commit.js")));
    }

    #[test]
    fn test_relative_paths_are_watched() {
        assert!(is_watched(Path::new("./src/app.js")));
        assert!(is_watched(Path::new("../sibling/app.js")));
    }
}
