//! HTTP surface: the form page, lookup, download sessions and progress polling.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path as AxumPath, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::signal;

use crate::config::AppConfig;
use crate::downloader::tools::{ToolInfo, ToolManager};
use crate::downloader::{
    DownloadError, Downloader, LookupResult, ProgressState, SessionId, SessionStatus,
};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub downloader: Downloader,
    pub tools: Arc<ToolManager>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        log::warn!("[Server] Request failed: {}", err);
        let status = match err {
            DownloadError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            DownloadError::NotFound(_) => StatusCode::NOT_FOUND,
            DownloadError::UpstreamFailure(_) | DownloadError::ParseError(_) => {
                StatusCode::BAD_GATEWAY
            }
            DownloadError::FileMissing(_) | DownloadError::ToolNotFound(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.user_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    pub format_id: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadStarted {
    pub id: SessionId,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/lookup", post(lookup))
        .route("/api/downloads", post(start_download))
        .route("/api/downloads/{id}", get(download_status))
        .route("/api/health", get(health))
        .route("/progress", get(latest_progress))
        .with_state(state)
}

pub async fn serve(config: AppConfig, state: AppState) -> Result<()> {
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    log::info!("[Server] Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running HTTP server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        log::error!("[Server] Failed to install Ctrl+C handler: {}", err);
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn lookup(
    State(state): State<AppState>,
    Json(payload): Json<LookupRequest>,
) -> ApiResult<Json<LookupResult>> {
    let result = state.downloader.lookup(payload.url.trim()).await?;
    Ok(Json(result))
}

async fn start_download(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> ApiResult<Json<DownloadStarted>> {
    let format_id = payload.format_id.trim();
    if format_id.is_empty() {
        return Err(ApiError::bad_request("Please choose a format."));
    }
    let id = state
        .downloader
        .start_download(payload.url.trim(), format_id)?;
    Ok(Json(DownloadStarted { id }))
}

async fn download_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<SessionStatus>> {
    let status = state
        .downloader
        .progress()
        .status(&SessionId::from(id))
        .ok_or_else(|| ApiError::not_found("download not found"))?;
    Ok(Json(status))
}

async fn latest_progress(State(state): State<AppState>) -> Json<ProgressState> {
    Json(state.downloader.progress().latest_snapshot())
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<Vec<ToolInfo>>> {
    let tools = state.tools.clone();
    let info = tokio::task::spawn_blocking(move || tools.get_all_tools())
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(info))
}
