// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Web UI for Shelfscan
//!
//! Two tabs: analysis (photo upload or camera capture) and settings (prompt
//! editing, statistics, reset). Every failure renders as a message; the
//! server keeps running.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use minijinja::{context, Environment, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::client::AnalysisClient;
use crate::config::AppConfig;
use crate::history::HistoryEntry;
use crate::request::ShelfImage;
use crate::session::{AnalysisOutcome, InFlight, Session};
use crate::store::{Document, PersistStatus, ResetTicket};
use crate::{Result, ShelfError};

/// Shared application state
pub struct AppState {
    pub session: Mutex<Session>,
    pub client: Arc<dyn AnalysisClient>,
    pages: Environment<'static>,
    in_flight: AtomicBool,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(session: Session, client: Arc<dyn AnalysisClient>, max_upload_bytes: usize) -> Result<Self> {
        Ok(Self {
            pages: page_environment(client.name())?,
            session: Mutex::new(session),
            client,
            in_flight: AtomicBool::new(false),
            max_upload_bytes,
        })
    }
}

fn page_environment(engine: &str) -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_global("version", env!("CARGO_PKG_VERSION"));
    env.add_global("engine", engine);
    env.add_template("base.html", include_str!("templates/base.html"))?;
    env.add_template("stats.html", include_str!("templates/stats.html"))?;
    env.add_template("index.html", include_str!("templates/index.html"))?;
    env.add_template("result.html", include_str!("templates/result.html"))?;
    env.add_template("settings.html", include_str!("templates/settings.html"))?;
    env.add_template("reset_confirm.html", include_str!("templates/reset_confirm.html"))?;
    env.add_template("error.html", include_str!("templates/error.html"))?;
    Ok(env)
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.max_upload_bytes;

    Router::new()
        // Pages
        .route("/", get(index_page))
        .route("/analyze", post(analyze))
        .route("/settings", get(settings_page))
        .route("/settings/prompts", post(update_prompt))
        .route("/settings/prompts/remove", post(remove_prompt))
        .route("/settings/save", post(save_document))
        .route("/settings/reset", post(request_reset))
        .route("/settings/reset/confirm", post(confirm_reset))
        .route("/settings/reset/cancel", post(cancel_reset))
        // API endpoints
        .route("/api/stats", get(api_get_stats))
        .route("/api/prompts", get(api_get_prompts))
        .route("/api/history", get(api_get_history))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Rendering helpers ===

fn format_cost(value: f64) -> String {
    format!("${:.4}", value)
}

fn stats_context(doc: &Document) -> Value {
    context! {
        total_analyses => doc.total_analyses(),
        total_cost => format_cost(doc.total_cost()),
        cost_per_analysis => format_cost(doc.cost_per_analysis()),
        saved => doc.is_saved(),
    }
}

fn status_for(err: &ShelfError) -> StatusCode {
    match err {
        ShelfError::InvalidTemplate(_) | ShelfError::Validation(_) => StatusCode::BAD_REQUEST,
        ShelfError::Busy => StatusCode::CONFLICT,
        ShelfError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ShelfError::ExternalCall(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn render(state: &AppState, status: StatusCode, name: &str, ctx: Value) -> Response {
    match state.pages.get_template(name).and_then(|t| t.render(ctx)) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Failed to render {}: {}", name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Template error: {}", e)).into_response()
        }
    }
}

fn error_page(state: &AppState, err: &ShelfError) -> Response {
    render(state, status_for(err), "error.html", context! { error => err.to_string() })
}

fn settings_view(
    state: &AppState,
    session: &Session,
    status: StatusCode,
    message: Option<&str>,
    error: Option<String>,
) -> Response {
    let doc = session.document();
    render(state, status, "settings.html", context! {
        prompts => doc.prompts(),
        stats => stats_context(doc),
        autosave => session.autosave(),
        message => message,
        error => error,
    })
}

/// Render settings after an edit, showing either a confirmation or the error
fn settings_result(state: &AppState, session: &Session, result: Result<()>, message: &str) -> Response {
    match result {
        Ok(()) => settings_view(state, session, StatusCode::OK, Some(message), None),
        Err(e) => {
            warn!("Settings change failed: {}", e);
            settings_view(state, session, status_for(&e), None, Some(e.to_string()))
        }
    }
}

// === Page Handlers ===

async fn index_page(State(state): State<Arc<AppState>>) -> Response {
    let session = state.session.lock().await;
    let doc = session.document();
    render(&state, StatusCode::OK, "index.html", context! {
        templates => doc.template_names(),
        selected => doc.template_names().first().copied(),
        stats => stats_context(doc),
    })
}

/// Read the `template` and `image` fields of the upload form
async fn read_upload(multipart: &mut Multipart, limit: usize) -> Result<(String, Vec<u8>)> {
    let upload_error = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ShelfError::UploadTooLarge { limit }
        } else {
            ShelfError::Validation(format!("invalid upload: {}", e))
        }
    };

    let mut template = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "template" => template = Some(field.text().await.map_err(upload_error)?),
            "image" => image = Some(field.bytes().await.map_err(upload_error)?.to_vec()),
            _ => {}
        }
    }

    let template = template
        .ok_or_else(|| ShelfError::Validation("no analysis type selected".to_string()))?;
    let image = image
        .ok_or_else(|| ShelfError::Validation("no photo uploaded".to_string()))?;
    Ok((template, image))
}

async fn run_analysis(state: &AppState, mut multipart: Multipart) -> Result<AnalysisOutcome> {
    let _in_flight = InFlight::acquire(&state.in_flight)?;

    let (template, bytes) = read_upload(&mut multipart, state.max_upload_bytes).await?;
    let image = ShelfImage::from_bytes(bytes)?;

    // The session lock is not held across the model call.
    let request = state.session.lock().await.prepare(&template, image)?;

    let started = Instant::now();
    let text = state.client.analyze(&request).await?;
    let elapsed = started.elapsed();

    info!("Analysis with '{}' finished in {:.1}s", template, elapsed.as_secs_f64());
    Ok(state.session.lock().await.complete(&request, text, elapsed))
}

async fn analyze(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    match run_analysis(&state, multipart).await {
        Ok(outcome) => {
            let session = state.session.lock().await;
            render(&state, StatusCode::OK, "result.html", context! {
                outcome => context! {
                    template => outcome.template,
                    text => outcome.text,
                    cost => format_cost(outcome.cost),
                    elapsed => format!("{:.1}s", outcome.elapsed.as_secs_f64()),
                    save_error => outcome.save_error,
                    history_error => outcome.history_error,
                },
                stats => stats_context(session.document()),
            })
        }
        Err(e) => {
            warn!("Analysis failed: {}", e);
            error_page(&state, &e)
        }
    }
}

async fn settings_page(State(state): State<Arc<AppState>>) -> Response {
    let session = state.session.lock().await;
    settings_view(&state, &session, StatusCode::OK, None, None)
}

#[derive(Deserialize)]
struct PromptForm {
    name: String,
    body: String,
}

async fn update_prompt(State(state): State<Arc<AppState>>, Form(form): Form<PromptForm>) -> Response {
    let mut session = state.session.lock().await;
    let result = session.update_prompt(&form.name, &form.body);
    settings_result(&state, &session, result, "Saved!")
}

#[derive(Deserialize)]
struct RemoveForm {
    name: String,
}

async fn remove_prompt(State(state): State<Arc<AppState>>, Form(form): Form<RemoveForm>) -> Response {
    let mut session = state.session.lock().await;
    let result = session.remove_prompt(&form.name);
    settings_result(&state, &session, result, "Template removed")
}

async fn save_document(State(state): State<Arc<AppState>>) -> Response {
    let mut session = state.session.lock().await;
    let result = session.save();
    settings_result(&state, &session, result, "Saved!")
}

async fn request_reset(State(state): State<Arc<AppState>>) -> Response {
    let mut session = state.session.lock().await;
    let ticket = session.request_reset();
    render(&state, StatusCode::OK, "reset_confirm.html", context! {
        ticket => ticket.to_string(),
        stats => stats_context(session.document()),
    })
}

#[derive(Deserialize)]
struct ConfirmForm {
    ticket: String,
}

async fn confirm_reset(State(state): State<Arc<AppState>>, Form(form): Form<ConfirmForm>) -> Response {
    let mut session = state.session.lock().await;
    let result = form
        .ticket
        .parse::<ResetTicket>()
        .and_then(|ticket| session.confirm_reset(ticket));
    settings_result(&state, &session, result, "Statistics reset!")
}

async fn cancel_reset(State(state): State<Arc<AppState>>) -> Response {
    let mut session = state.session.lock().await;
    session.document_mut().cancel_reset();
    settings_view(&state, &session, StatusCode::OK, Some("Reset cancelled"), None)
}

// === API Handlers ===

#[derive(Serialize)]
struct StatsResponse {
    total_analyses: u64,
    total_cost: f64,
    cost_per_analysis: f64,
    status: PersistStatus,
    autosave: bool,
}

async fn api_get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let session = state.session.lock().await;
    let doc = session.document();
    Json(StatsResponse {
        total_analyses: doc.total_analyses(),
        total_cost: doc.total_cost(),
        cost_per_analysis: doc.cost_per_analysis(),
        status: doc.status(),
        autosave: session.autosave(),
    })
}

async fn api_get_prompts(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, String>> {
    let session = state.session.lock().await;
    Json(session.document().prompts().clone())
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn api_get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50);
    let session = state.session.lock().await;
    let entries: Result<Vec<HistoryEntry>> = match session.log() {
        Some(log) => log.get_recent(limit),
        None => Ok(Vec::new()),
    };

    match entries {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            warn!("Failed to read history: {}", e);
            (status_for(&e), Json(serde_json::json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// Start the web server with a loaded session
pub async fn start_server(config: AppConfig, session: Session, client: Arc<dyn AnalysisClient>) -> Result<()> {
    let state = Arc::new(AppState::new(session, client, config.web.max_upload_bytes)?);

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Web UI available at http://{}", addr);

    let router = create_router(state);
    axum::serve(listener, router).await
        .map_err(|e| ShelfError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
