use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::RwLock;

use crate::{
    config::EngineOptions,
    export::ScanReport,
    protocols::ProtocolResolver,
    reporter::ProgressReporter,
    scanner::{Scanner, SessionState},
    stats::PingSummary,
    types::{ScanConfig, Verdict},
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>,
    options: Arc<EngineOptions>,
    resolver: Arc<ProtocolResolver>,
}

#[derive(Default)]
struct ServerState {
    scanner: Option<Arc<Scanner>>,
    live: Option<Arc<LiveCounters>>,
    report: Option<ScanReport>,
    summary: Option<PingSummary>,
    started: Option<String>,
}

/// Progress as last reported by the running session.
#[derive(Debug, Default)]
struct LiveCounters {
    percent: AtomicU8,
    positives: AtomicU64,
}

impl ProgressReporter for LiveCounters {
    fn on_progress(&self, percent: u8) {
        self.percent.fetch_max(percent, Ordering::Relaxed);
    }

    fn on_result(&self, verdict: &Verdict) {
        let positive = match verdict {
            Verdict::HostUp { .. } | Verdict::PortOpen { .. } => true,
            Verdict::PingSample(sample) => sample.success,
        };
        if positive {
            self.positives.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: &'static str, // "idle" | "pending" | "running" | "stopping" | "done"
    pub percent: u8,
    pub positives: u64,
    pub started: Option<String>,
    pub summary: Option<PingSummary>,
}

impl AppState {
    pub fn new(options: EngineOptions, resolver: Arc<ProtocolResolver>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ServerState::default())),
            options: Arc::new(options),
            resolver,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/stop", post(post_stop))
        .route("/results", get(get_results))
        .with_state(state);

    Router::new().nest("/api", api)
}

pub async fn spawn_server(bind: (Ipv4Addr, u16), state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("serving API on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let state = match s.scanner.as_ref().map(|sc| sc.state()) {
        None => "idle",
        Some(SessionState::Pending) => "pending",
        Some(SessionState::Running) => "running",
        Some(SessionState::Stopping) => "stopping",
        Some(SessionState::Completed) => "done",
    };
    let (percent, positives) = s.live.as_ref().map_or((0, 0), |l| {
        (
            l.percent.load(Ordering::Relaxed),
            l.positives.load(Ordering::Relaxed),
        )
    });
    let out = Status {
        state,
        percent,
        positives,
        started: s.started.clone(),
        summary: s.summary.clone(),
    };
    (StatusCode::OK, Json(out))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(report) = s.report.as_ref() {
        (StatusCode::OK, Json(report.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn post_stop(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    match s.scanner.as_ref() {
        Some(scanner) => {
            scanner.request_stop();
            StatusCode::ACCEPTED
        }
        None => StatusCode::CONFLICT,
    }
}

async fn post_scan(State(app): State<AppState>, Json(config): Json<ScanConfig>) -> impl IntoResponse {
    let scanner = match Scanner::new(config, (*app.options).clone(), Arc::clone(&app.resolver)) {
        Ok(s) => Arc::new(s),
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let live = Arc::new(LiveCounters::default());
    let started = OffsetDateTime::now_utc().format(&Rfc3339).ok();

    {
        let mut s = app.inner.write().await;
        // a new request replaces whatever is running
        if let Some(old) = s.scanner.take() {
            old.shutdown();
        }
        s.scanner = Some(Arc::clone(&scanner));
        s.live = Some(Arc::clone(&live));
        s.report = None;
        s.summary = None;
        s.started = started.clone();
    }

    let app2 = app.clone();
    tokio::spawn(async move {
        let res = scanner.start(live).await;

        let mut s = app2.inner.write().await;
        let current = s.scanner.as_ref().is_some_and(|sc| Arc::ptr_eq(sc, &scanner));
        match res {
            Ok(outcome) if current => {
                s.report = Some(ScanReport::from_outcome(&outcome));
                s.summary = outcome.summary;
            }
            Ok(_) => {}
            Err(e) => error!("scan error: {e}"),
        }
    });

    let out = Status {
        state: "running",
        percent: 0,
        positives: 0,
        started,
        summary: None,
    };
    (StatusCode::ACCEPTED, Json(out)).into_response()
}
