//! Server lifecycle variants behind a uniform interface
//!
//! One-shot mode binds a plain listener that the report controller
//! closes after the single session; watch mode adds a working-directory
//! watcher whose change events feed the `/events` SSE stream and the
//! orchestrator run loop. Both variants expose the same
//! `listen`/`close`/`reload_events` shape so the orchestrator never
//! branches on the mode.

use crate::coverage::{self, InstrumentationHook, ReportSlot};
use crate::watch::{AssetWatcher, Reload};
use crate::{assets, sse};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use specter_core::{Result, SpecterError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

/// Capacity of the reload broadcast channel.
const RELOAD_CHANNEL_CAPACITY: usize = 16;

/// Construction-time options shared by both server variants.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Static asset root (the invocation directory).
    pub root: PathBuf,
    /// On-disk location of the rendered harness document.
    pub harness_path: PathBuf,
    /// Select the watch variant instead of one-shot.
    pub watch: bool,
}

/// Shared request-handler state.
pub struct AppState {
    pub root: PathBuf,
    pub harness_path: PathBuf,
    /// Present only when coverage is enabled.
    pub hook: Option<Arc<dyn InstrumentationHook>>,
    pub report: ReportSlot,
    pub reload_tx: broadcast::Sender<Reload>,
}

pub type SharedState = Arc<AppState>;

/// Uniform lifecycle over the one-shot and watch server variants.
#[async_trait]
pub trait HarnessServer: Send {
    /// Bind the fixed host/port and begin serving. Resolves only after
    /// a successful bind, so a port conflict fails fast and distinctly
    /// from a browser-session failure.
    async fn listen(&mut self) -> Result<()>;

    /// Stop accepting requests and wait for the serve task to finish.
    async fn close(&mut self) -> Result<()>;

    /// Subscribe to reload notifications. The one-shot variant's
    /// channel never fires.
    fn reload_events(&self) -> broadcast::Receiver<Reload>;
}

/// Select the server variant once, at construction.
pub fn build_server(
    options: ServerOptions,
    hook: Option<Arc<dyn InstrumentationHook>>,
    report: ReportSlot,
) -> Box<dyn HarnessServer> {
    if options.watch {
        Box::new(WatchServer::new(&options, hook, report))
    } else {
        Box::new(OneShotServer::new(&options, hook, report))
    }
}

/// Assemble the request router over shared state. The `/events` route
/// exists only in watch mode so one-shot pages never hold an SSE
/// connection open across teardown.
pub fn build_router(state: SharedState, watch: bool) -> Router {
    let mut router = Router::new()
        .route("/", get(serve_harness))
        .route("/index.html", get(serve_harness))
        .route("/coverage", post(coverage::ingest));
    if watch {
        router = router.route("/events", get(sse::reload_handler));
    }
    router
        .fallback(chain_handler)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the rendered harness document from its on-disk path.
async fn serve_harness(State(app): State<SharedState>) -> Response {
    match tokio::fs::read(&app.harness_path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(
                "harness document unreadable at {}: {}",
                app.harness_path.display(),
                e
            );
            (StatusCode::NOT_FOUND, "harness document not generated\n").into_response()
        }
    }
}

/// Fallback handler chain: instrumentation hook (coverage mode only) →
/// embedded runner assets → working-directory static files. Each stage
/// delegates on non-match; `ServeDir` owns not-found.
async fn chain_handler(State(app): State<SharedState>, req: Request) -> Response {
    let path = req.uri().path().to_string();

    if let Some(response) = coverage::hook_response(&app, &path).await {
        return response;
    }

    if let Some(response) = assets::runner_asset(&path) {
        return response;
    }

    match ServeDir::new(&app.root).oneshot(req).await {
        Ok(response) => response.map(Body::new),
        Err(e) => {
            warn!("static handler error: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Running accept loop plus the signal that shuts it down.
struct ServeTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ServeTask {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            error!("serve task join error: {e}");
        }
    }
}

async fn spawn_server(state: SharedState, watch: bool) -> Result<ServeTask> {
    let router = build_router(state, watch);
    let listener = TcpListener::bind(crate::BIND_ADDR)
        .await
        .map_err(|e| SpecterError::Bind(crate::BIND_ADDR.to_string(), e))?;
    info!("Serving harness at {}", crate::harness_url());

    let (shutdown, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = rx.await;
        });
        if let Err(e) = serve.await {
            error!("server error: {e}");
        }
    });

    Ok(ServeTask { shutdown, handle })
}

fn shared_state(
    options: &ServerOptions,
    hook: Option<Arc<dyn InstrumentationHook>>,
    report: ReportSlot,
) -> SharedState {
    let (reload_tx, _) = broadcast::channel(RELOAD_CHANNEL_CAPACITY);
    Arc::new(AppState {
        root: options.root.clone(),
        harness_path: options.harness_path.clone(),
        hook,
        report,
        reload_tx,
    })
}

/// Fixed listener serving exactly one test session; closed explicitly
/// by the report controller after that session completes.
pub struct OneShotServer {
    state: SharedState,
    task: Option<ServeTask>,
}

impl OneShotServer {
    pub fn new(
        options: &ServerOptions,
        hook: Option<Arc<dyn InstrumentationHook>>,
        report: ReportSlot,
    ) -> Self {
        Self {
            state: shared_state(options, hook, report),
            task: None,
        }
    }
}

#[async_trait]
impl HarnessServer for OneShotServer {
    async fn listen(&mut self) -> Result<()> {
        self.task = Some(spawn_server(self.state.clone(), false).await?);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.stop().await;
        }
        Ok(())
    }

    fn reload_events(&self) -> broadcast::Receiver<Reload> {
        self.state.reload_tx.subscribe()
    }
}

/// Persistent live-reload listener: the one-shot server plus a
/// working-directory watcher feeding the reload channel. Page reload is
/// delegated to the harness page's `/events` subscription.
pub struct WatchServer {
    state: SharedState,
    task: Option<ServeTask>,
    watcher: Option<AssetWatcher>,
}

impl WatchServer {
    pub fn new(
        options: &ServerOptions,
        hook: Option<Arc<dyn InstrumentationHook>>,
        report: ReportSlot,
    ) -> Self {
        Self {
            state: shared_state(options, hook, report),
            task: None,
            watcher: None,
        }
    }
}

#[async_trait]
impl HarnessServer for WatchServer {
    async fn listen(&mut self) -> Result<()> {
        self.task = Some(spawn_server(self.state.clone(), true).await?);
        self.watcher = Some(AssetWatcher::spawn(
            &self.state.root,
            self.state.reload_tx.clone(),
        )?);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop().await;
        }
        if let Some(task) = self.task.take() {
            task.stop().await;
        }
        Ok(())
    }

    fn reload_events(&self) -> broadcast::Receiver<Reload> {
        self.state.reload_tx.subscribe()
    }
}
