//! JSON API over a [`Session`], reloading the dataset when its files change

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use notify::{Event, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{self, Error};
use crate::graph::Hour;
use crate::loader::DatasetReader;
use crate::session::Session;
use crate::transform::{DisplayMode, Frame};

/// Shared server state
pub struct AppState {
    session: Mutex<Session>,
    reader: Box<dyn DatasetReader + Send + Sync>,
}

impl AppState {
    pub fn new(session: Session, reader: Box<dyn DatasetReader + Send + Sync>) -> Self {
        Self {
            session: Mutex::new(session),
            reader,
        }
    }

    fn session(&self) -> error::Result<MutexGuard<'_, Session>> {
        self.session.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Re-read the dataset and swap the graph in. The old graph stays if
    /// the new one fails to load.
    pub fn reload(&self) -> error::Result<()> {
        let graph = self.reader.load_graph()?;
        self.session()?.set_graph(graph)
    }

    /// Apply the query to the session, advance it one tick and return the
    /// frame. A tick may run a whole relaxation, so callers on the async
    /// runtime go through [`frame`].
    pub fn advance(&self, query: &FrameQuery) -> error::Result<Frame> {
        let mut session = self.session()?;
        if let Some(hour) = query.hour {
            session.set_hour(Hour::new(hour)?)?;
        }
        if let Some(source) = &query.source {
            let index = session.graph().require_index(source)?;
            if index != session.source() {
                session.set_source(index)?;
            }
        }
        if let Some(mode) = query.mode {
            session.set_mode(mode);
        }
        if let Some(transition) = query.transition {
            session.set_transition(transition);
        }
        session.tick()?;
        session.frame()
    }
}

/// Query parameters of `GET /api/frame`. Omitted parameters keep the
/// session's current value.
#[derive(Debug, Default, Deserialize)]
pub struct FrameQuery {
    pub source: Option<String>,
    pub hour: Option<u8>,
    pub mode: Option<DisplayMode>,
    pub transition: Option<bool>,
}

/// Response of `GET /api/stats`
#[derive(Debug, Serialize)]
pub struct Stats {
    pub nodes: usize,
    pub edges: usize,
    pub active_edges: usize,
    pub source: Option<String>,
    pub hour: u8,
    pub mode: DisplayMode,
    pub transition: bool,
    pub passes: usize,
    pub animating: bool,
    pub reached: usize,
}

/// Error body returned by the API
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::UnknownNode(_) | Error::HourOutOfRange(_) | Error::NodeOutOfRange { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// `GET /api/frame`: [`AppState::advance`] on the blocking pool
pub async fn frame(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FrameQuery>,
) -> Result<Json<Frame>, ApiError> {
    let frame = tokio::task::spawn_blocking(move || state.advance(&query))
        .await
        .map_err(|e| ApiError::internal(format!("frame task failed: {e}")))??;
    Ok(Json(frame))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<Stats>, ApiError> {
    let session = state.session()?;
    let graph = session.graph();
    Ok(Json(Stats {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        active_edges: graph.active_edge_count(session.hour()),
        source: graph.node(session.source()).map(|n| n.id.clone()),
        hour: session.hour().get(),
        mode: session.mode(),
        transition: session.transition(),
        passes: session.passes_run(),
        animating: session.is_animating(),
        reached: session.field()?.reached_count(),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/frame", get(frame))
        .route("/api/stats", get(stats))
        .with_state(state)
}

/// Load the dataset, then serve the API and reload on file changes
pub async fn serve(
    reader: Box<dyn DatasetReader + Send + Sync>,
    config: EngineConfig,
    port: u16,
) -> anyhow::Result<()> {
    let graph = reader.load_graph()?;
    let session = Session::new(graph, config)?;
    let watched: HashSet<PathBuf> = reader.paths().into_iter().collect();
    let state = Arc::new(AppState::new(session, reader));

    // Create channel for file change notifications
    let (tx, mut rx) = mpsc::channel::<()>(1);
    let filter = watched.clone();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, _>| {
        if let Ok(event) = res {
            let relevant = event
                .paths
                .iter()
                .any(|p| filter.iter().any(|w| p.ends_with(w) || w.ends_with(p)));
            if relevant && (event.kind.is_modify() || event.kind.is_create()) {
                let _ = tx.try_send(());
            }
        }
    })?;

    // Watch the parent directories so editors that replace files are seen
    let parents: HashSet<PathBuf> = watched
        .iter()
        .map(|p| {
            p.parent()
                .filter(|d| !d.as_os_str().is_empty())
                .map(|d| d.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        })
        .collect();
    for dir in &parents {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }

    let reload_state = state.clone();
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            // Debounce: wait a bit for rapid changes to settle
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            while rx.try_recv().is_ok() {}

            let state = reload_state.clone();
            let outcome = tokio::task::spawn_blocking(move || state.reload()).await;
            match outcome {
                Ok(Ok(())) => info!("dataset reloaded"),
                Ok(Err(e)) => warn!(error = %e, "dataset reload failed, keeping previous graph"),
                Err(e) => warn!(error = %e, "dataset reload task failed"),
            }
        }
    });

    let app = router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "serving isochron API");
    println!("API server running at http://localhost:{port}/api/frame");
    println!("Press Ctrl+C to stop");

    // Keep watcher alive
    let _watcher = watcher;

    axum::serve(listener, app).await?;
    Ok(())
}
