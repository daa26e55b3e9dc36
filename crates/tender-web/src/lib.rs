//! Axum JSON API over the tender repository, analysis and scraper control.

mod error;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tender_core::{
    ApiResponse, AskAnswer, PaginatedResponse, ScraperJob, ScraperStatus, Tender, TenderDetail,
    TenderQuery, TenderStats,
};
use tender_storage::TenderRepository;
use tender_sync::{AnalysisService, Platform, ScrapeRequest, ScraperController};
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

pub use error::ApiError;

pub const CRATE_NAME: &str = "tender-web";

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn TenderRepository>,
    pub analysis: Arc<AnalysisService>,
    pub controller: ScraperController,
}

impl AppState {
    pub fn from_platform(platform: &Platform) -> Self {
        Self {
            repository: platform.repository.clone(),
            analysis: platform.analysis.clone(),
            controller: platform.controller.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    stopped: bool,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/tenders", get(list_tenders_handler))
        .route("/api/tenders/{id}", get(tender_detail_handler))
        .route("/api/tenders/{id}/analyze", post(analyze_handler))
        .route("/api/tenders/{id}/ask", post(ask_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/scraper/run", post(scraper_run_handler))
        .route("/api/scraper/status", get(scraper_status_handler))
        .route("/api/scraper/stop", post(scraper_stop_handler))
        .with_state(Arc::new(state))
}

/// Binds `0.0.0.0:{TENDER_WEB_PORT}` and serves until the process exits.
pub async fn serve(platform: &Platform) -> anyhow::Result<()> {
    let port = platform.config.web_port;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding tender API on port {port}"))?;
    info!(port, "tender API listening");
    axum::serve(listener, app(AppState::from_platform(platform))).await?;
    Ok(())
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid tender id `{raw}`")))
}

async fn health_handler() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::ok(serde_json::json!({
        "status": "healthy",
        "service": "tender-api",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn list_tenders_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TenderQuery>, QueryRejection>,
) -> ApiResult<PaginatedResponse<Tender>> {
    let Query(query) = query?;
    let page = state.repository.list_tenders(&query).await?;
    Ok(Json(ApiResponse::ok(page)))
}

async fn tender_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<TenderDetail> {
    let detail = state.analysis.detail(parse_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Tender> {
    let tender = state.analysis.analyze(parse_id(&id)?).await?;
    Ok(Json(
        ApiResponse::ok(tender).with_message("Deep analysis completed"),
    ))
}

async fn ask_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Result<Json<AskRequest>, JsonRejection>,
) -> ApiResult<AskAnswer> {
    let Json(request) = request?;
    let answer = state.analysis.ask(parse_id(&id)?, &request.question).await?;
    Ok(Json(ApiResponse::ok(answer)))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> ApiResult<TenderStats> {
    let stats = state.repository.tender_stats().await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// Body is optional; an empty body scrapes yesterday.
async fn scraper_run_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<ScraperJob> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ScrapeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::BadRequest(format!("Invalid scraper request: {err}")))?
    };
    let job = state.controller.start(request).await?;
    let message = format!("Scraper started for {} to {}", job.target_date, job.end_date);
    Ok(Json(ApiResponse::ok(job).with_message(message)))
}

async fn scraper_status_handler(State(state): State<Arc<AppState>>) -> ApiResult<ScraperStatus> {
    let status = state.controller.status().await?;
    Ok(Json(ApiResponse::ok(status)))
}

async fn scraper_stop_handler(State(state): State<Arc<AppState>>) -> ApiResult<StopResponse> {
    let stopped = state.controller.stop().await;
    let response = ApiResponse::ok(StopResponse { stopped });
    Ok(Json(if stopped {
        response.with_message("Stop requested")
    } else {
        response.with_message("No scraper running")
    }))
}

#[cfg(test)]
mod tests;
