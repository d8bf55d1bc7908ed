use std::{path::Path, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    backend::ScanBackend,
    classify::{view, Category, SortDirection, SortKey, SortState},
    dictionary::{Dictionary, DictionaryError, PathEntry},
    error::SessionError,
    report::rfc3339,
    session::{ScanController, ScanInput},
    types::{Credentials, ScanMode},
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>, // controller, dictionary editor and cancel handle
    backend: Arc<dyn ScanBackend>,
}

struct ServerState {
    controller: ScanController,
    dictionary: Dictionary,
    cancel: Option<CancellationToken>,
}

impl AppState {
    pub fn new(backend: Arc<dyn ScanBackend>, dictionary: Dictionary) -> Self {
        Self::with_controller(backend, dictionary, ScanController::new())
    }

    pub fn with_controller(backend: Arc<dyn ScanBackend>, dictionary: Dictionary, controller: ScanController) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ServerState { controller, dictionary, cancel: None })),
            backend,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Status {
    pub scan_id: u64,
    pub state: String, // "idle" | "running" | "completed" | "failed"
    pub finished: bool,
    pub reportable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub targets: usize,
    pub findings: usize,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

impl Status {
    fn of(c: &ScanController) -> Self {
        let session = c.session();
        let meta = session.metadata.as_ref();
        Self {
            scan_id: session.id,
            state: session.state.as_str().into(),
            finished: session.state.is_terminal(),
            reportable: session.is_reportable(),
            error: session.outcome().err().map(|e| match e {
                SessionError::Backend(msg) => msg,
                other => other.to_string(),
            }),
            targets: meta.map(|m| m.request.targets.len()).unwrap_or(0),
            findings: session.findings.len(),
            started_at: meta.map(|m| rfc3339(m.started_at)),
            ended_at: meta.and_then(|m| m.ended_at).map(rfc3339),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanPayload {
    pub targets: Vec<String>,
    #[serde(default)]
    pub mode: ScanMode,
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub respect_robots_txt: Option<bool>,
    #[serde(default)]
    pub session_cookies_string: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ScanPayload {
    fn into_input(self, dictionary: Dictionary) -> ScanInput {
        let defaults = ScanInput::default();
        ScanInput {
            targets: self.targets,
            mode: self.mode,
            exclusions: self.exclusions,
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            respect_robots: self.respect_robots_txt.unwrap_or(defaults.respect_robots),
            credentials: Credentials::from_parts(self.username, self.password, self.session_cookies_string),
            dictionary,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PathBody {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct BaselineBody {
    pub use_baseline: bool,
}

/// API under `/api`, static UI files from `ui_dir` for everything else.
pub fn router(state: AppState, ui_dir: impl AsRef<Path>) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/cancel", post(post_cancel))
        .route("/results", get(get_results))
        .route("/summary", get(get_summary))
        .route("/report", get(get_report))
        .route("/dictionary", get(get_dictionary))
        .route("/dictionary/paths", post(add_dictionary_path).delete(remove_dictionary_path))
        .route("/dictionary/baseline", put(put_dictionary_baseline))
        .with_state(state);

    let static_svc = ServeDir::new(ui_dir.as_ref()).append_index_html_on_directories(true);

    Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, state: AppState, ui_dir: impl AsRef<Path>) -> Result<()> {
    let app = router(state, ui_dir);
    info!("serving UI on http://{}", bind);
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

fn error_response(e: SessionError) -> Response {
    let code = match e {
        SessionError::Validation(_) => StatusCode::BAD_REQUEST,
        SessionError::StateConflict | SessionError::IncompleteSession => StatusCode::CONFLICT,
        SessionError::Backend(_) => StatusCode::BAD_GATEWAY,
    };
    (code, Json(json!({ "error": e.to_string() }))).into_response()
}

fn bad_request(msg: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    (StatusCode::OK, Json(Status::of(&s.controller)))
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanPayload>) -> Response {
    let (ticket, cancel, status) = {
        let mut s = app.inner.write().await;
        let input = req.into_input(s.dictionary.clone());
        let ticket = match s.controller.begin(input) {
            Ok(t) => t,
            Err(e) => return error_response(e),
        };
        let cancel = CancellationToken::new();
        s.cancel = Some(cancel.clone());
        (ticket, cancel, Status::of(&s.controller))
    };

    // The backend call runs without holding the state lock.
    let app2 = app.clone();
    tokio::spawn(async move {
        let outcome = tokio::select! {
            res = app2.backend.scan(&ticket.request) => Some(res),
            _ = cancel.cancelled() => None,
        };
        let Some(outcome) = outcome else {
            return;
        };
        let mut s = app2.inner.write().await;
        if s.controller.complete(&ticket, outcome) {
            s.cancel = None;
        }
    });

    (StatusCode::ACCEPTED, Json(status)).into_response()
}

async fn post_cancel(State(app): State<AppState>) -> Response {
    let mut s = app.inner.write().await;
    if let Some(c) = s.cancel.take() {
        c.cancel();
    }
    if s.controller.cancel() {
        (StatusCode::OK, Json(Status::of(&s.controller))).into_response()
    } else {
        (StatusCode::CONFLICT, Json(json!({ "error": "no scan is running" }))).into_response()
    }
}

async fn get_results(State(app): State<AppState>, Query(q): Query<ResultsQuery>) -> Response {
    let category = match q.filter.as_deref().map(str::parse::<Category>).transpose() {
        Ok(c) => c.unwrap_or_default(),
        Err(e) => return bad_request(e),
    };
    let key = match q.sort.as_deref().map(str::parse::<SortKey>).transpose() {
        Ok(k) => k,
        Err(e) => return bad_request(e),
    };
    let direction = match q.order.as_deref().map(str::parse::<SortDirection>).transpose() {
        Ok(d) => d.unwrap_or_default(),
        Err(e) => return bad_request(e),
    };
    let sort = key.map(|key| SortState { key, direction });

    let s = app.inner.read().await;
    let rows = view(s.controller.findings(), category, sort);
    let body = json!({
        "state": s.controller.state().as_str(),
        "filter": category.as_str(),
        "count": rows.len(),
        "results": rows,
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn get_summary(State(app): State<AppState>) -> Response {
    let s = app.inner.read().await;
    match s.controller.summary() {
        Some(summary) => (StatusCode::OK, Json(summary)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn get_report(State(app): State<AppState>) -> Response {
    let s = app.inner.read().await;
    match s.controller.report() {
        Ok(doc) => (StatusCode::OK, Json(doc)).into_response(),
        Err(e) => error_response(e),
    }
}

fn dictionary_view(d: &Dictionary) -> serde_json::Value {
    json!({
        "use_baseline": d.use_baseline(),
        "paths": d.paths(),
        "operations": d.operations(),
    })
}

async fn get_dictionary(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    Json(dictionary_view(&s.dictionary))
}

async fn add_dictionary_path(State(app): State<AppState>, Json(body): Json<PathBody>) -> Response {
    let mut s = app.inner.write().await;
    match s.dictionary.add_path(&body.path) {
        Ok(path) => (StatusCode::CREATED, Json(json!({ "path": path }))).into_response(),
        Err(e @ DictionaryError::Duplicate(_)) => {
            warn!(error = %e, "dictionary add rejected");
            (StatusCode::CONFLICT, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => bad_request(e.to_string()),
    }
}

async fn remove_dictionary_path(State(app): State<AppState>, Json(body): Json<PathBody>) -> Response {
    let mut s = app.inner.write().await;
    let removed = s.dictionary.remove_path(&body.path);
    let path = PathEntry::normalize(&body.path);
    (StatusCode::OK, Json(json!({ "path": path, "removed": removed }))).into_response()
}

async fn put_dictionary_baseline(State(app): State<AppState>, Json(body): Json<BaselineBody>) -> impl IntoResponse {
    let mut s = app.inner.write().await;
    s.dictionary.set_use_baseline(body.use_baseline);
    Json(dictionary_view(&s.dictionary))
}
