use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::{
    engine::{merge_records, select_accessible, Engine},
    journal::LogEntry,
    types::{GroupRecord, Progress, ResetTally, Scope},
};

/// Log entries kept for `/api/log`.
const LOG_BACKLOG: usize = 100;

#[derive(Clone)]
pub struct AppState {
    engine: Engine,
    inner: Arc<RwLock<ServerState>>, // shared mutable state for progress/results
}

#[derive(Debug, Default)]
struct ServerState {
    status: Status,
    results: Option<Vec<GroupRecord>>,
    cancel: Option<CancellationToken>,
    log: VecDeque<LogEntry>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Status {
    pub state: String, // "idle" | "scanning" | "resetting" | "done"
    pub message: String,
    pub done: usize,
    pub total: usize,
    pub last_reset: Option<ResetTally>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub group: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    /// `STORE:SCO` ids; empty means every accessible checkout of the last scan.
    #[serde(default)]
    pub targets: Vec<String>,
    pub value: i32,
}

impl AppState {
    /// Wrap `engine` and start collecting its log entries.
    pub fn new(engine: Engine) -> Self {
        let state = AppState {
            inner: Arc::new(RwLock::new(ServerState {
                status: Status { state: "idle".into(), ..Default::default() },
                ..Default::default()
            })),
            engine,
        };

        let mut rx = state.engine.subscribe_log();
        let inner = state.inner.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(entry) => {
                        let mut s = inner.write().await;
                        s.log.push_back(entry);
                        while s.log.len() > LOG_BACKLOG {
                            s.log.pop_front();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!("log view skipped {n} entries");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        state
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/results", get(get_results))
        .route("/reset", post(post_reset))
        .route("/log", get(get_log))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, engine: Engine) -> Result<()> {
    let app = router(AppState::new(engine));
    tracing::info!("serving API on http://{}", bind);
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    (StatusCode::OK, Json(s.status.clone()))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(res) = s.results.as_ref() {
        (StatusCode::OK, Json(res.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn get_log(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let entries: Vec<LogEntry> = s.log.iter().cloned().collect();
    (StatusCode::OK, Json(entries))
}

/// Feed progress notifications into the shared status until the sender side is dropped.
///
/// Once `cancel` fires the status belongs to whoever replaced the run, so later updates are
/// discarded.
fn track_progress(
    app: &AppState,
    cancel: CancellationToken,
) -> (mpsc::UnboundedSender<Progress>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
    let inner = app.inner.clone();
    let handle = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            let mut s = inner.write().await;
            if cancel.is_cancelled() {
                continue;
            }
            s.status.message = p.message;
            s.status.done = p.done;
            s.status.total = p.total;
        }
    });
    (tx, handle)
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    let scope = match req.group {
        Some(g) => {
            if let Err(e) = app.engine.address_space().check_group(g) {
                return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
            }
            Scope::Group(g)
        }
        None => Scope::All,
    };

    let cancel = CancellationToken::new();
    {
        let mut s = app.inner.write().await;
        if s.status.state == "resetting" {
            return (StatusCode::CONFLICT, "a reset is in progress").into_response();
        }
        // Cancel any existing scan
        if let Some(c) = s.cancel.take() {
            c.cancel();
        }
        s.status = Status { state: "scanning".into(), message: "Scanning network...".into(), ..Default::default() };
        s.results = None;
        s.cancel = Some(cancel.clone());
    }

    let app2 = app.clone();
    tokio::spawn(async move {
        let (tx, forward) = track_progress(&app2, cancel.clone());
        let res = match scope {
            // A single store is reported even when none of its checkouts answered.
            Scope::Group(g) => app2
                .engine
                .scan_group_until(g, Some(&tx), &cancel)
                .await
                .map(|group| vec![group]),
            Scope::All => app2.engine.scan(scope, Some(&tx), &cancel).await,
        };
        drop(tx);
        let _ = forward.await;

        let mut s = app2.inner.write().await;
        if cancel.is_cancelled() {
            // A newer scan owns the state now.
            return;
        }
        s.cancel = None;
        match res {
            Ok(groups) => {
                s.status.state = "done".into();
                s.results = Some(groups);
            }
            Err(e) => {
                s.status.state = "idle".into();
                s.status.message = e.to_string();
                tracing::error!("scan error: {e}");
            }
        }
    });

    (StatusCode::ACCEPTED, Json(Status { state: "scanning".into(), ..Default::default() })).into_response()
}

async fn post_reset(State(app): State<AppState>, Json(req): Json<ResetRequest>) -> impl IntoResponse {
    let targets = if req.targets.is_empty() {
        None
    } else {
        match app.engine.parse_targets(req.targets.as_slice()) {
            Ok(t) => Some(t),
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    };

    let mut selection = {
        let mut s = app.inner.write().await;
        if s.status.state == "scanning" || s.status.state == "resetting" {
            return (StatusCode::CONFLICT, format!("busy: {}", s.status.state)).into_response();
        }
        let Some(results) = s.results.as_ref() else {
            return (StatusCode::CONFLICT, "no scan results; run a scan first").into_response();
        };
        let selection = select_accessible(results, targets.as_deref());
        if selection.is_empty() {
            return (StatusCode::BAD_REQUEST, "no accessible checkouts selected").into_response();
        }
        s.status = Status {
            state: "resetting".into(),
            message: format!("Resetting {} checkout(s)...", selection.len()),
            total: selection.len(),
            ..Default::default()
        };
        selection
    };

    let app2 = app.clone();
    let value = req.value;
    let total = selection.len();
    tokio::spawn(async move {
        let (tx, forward) = track_progress(&app2, CancellationToken::new());
        let tally = app2.engine.apply_value(&mut selection, value, Some(&tx)).await;
        drop(tx);
        let _ = forward.await;

        let mut s = app2.inner.write().await;
        if let Some(results) = s.results.as_mut() {
            merge_records(results, &selection);
        }
        s.status.state = "done".into();
        s.status.message = format!(
            "Complete: {} successful, {} failed",
            tally.success, tally.failure
        );
        s.status.last_reset = Some(tally);
    });

    (
        StatusCode::ACCEPTED,
        Json(Status { state: "resetting".into(), total, ..Default::default() }),
    )
        .into_response()
}
