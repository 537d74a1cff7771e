//! HTTP control and polling surface.
use crate::downloader::manager::{DownloadManager, StartStatus};
use crate::errors::{AppError, Result};
use crate::state::ProcessingState;
use crate::storage::TrackListFile;
use crate::track::Track;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub download_manager: Arc<DownloadManager>,
    pub track_list: TrackListFile,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub tracks: Vec<String>,
    /// Also append the newly queued tracks to the track-list file.
    #[serde(default)]
    pub persist: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnqueueResponse {
    pub added: usize,
    pub total: usize,
    pub pending: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartResponse {
    pub status: StartStatus,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelResponse {
    pub status: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyRunning | AppError::EmptyQueue => StatusCode::CONFLICT,
            AppError::ToolUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/queue", post(enqueue_tracks))
        .route("/api/start", post(start_download))
        .route("/api/cancel", post(cancel_download))
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Serving progress API on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub async fn get_status(State(state): State<AppState>) -> Json<ProcessingState> {
    Json(state.download_manager.reporter().report().await)
}

pub async fn enqueue_tracks(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> std::result::Result<Json<EnqueueResponse>, AppError> {
    let tracks: Vec<Track> = request
        .tracks
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(Track::from)
        .collect();

    if tracks.is_empty() {
        return Err(AppError::InvalidInput("No tracks in request".to_string()));
    }

    let manager = &state.download_manager;
    let submitted = tracks.len();
    let added = manager.state().enqueue_new(tracks).await;
    log::info!("Queued {} of {} submitted tracks", added.len(), submitted);

    if request.persist && !added.is_empty() {
        // Best effort: the queue already holds the tracks.
        if let Err(e) = state.track_list.append(&added).await {
            log::error!("{}", e);
            manager.state().log(format!("Error: {}", e)).await;
        }
    }

    let report = manager.reporter().report().await;
    Ok(Json(EnqueueResponse {
        added: added.len(),
        total: report.total,
        pending: report.pending,
    }))
}

pub async fn start_download(
    State(state): State<AppState>,
) -> std::result::Result<Json<StartResponse>, AppError> {
    let status = state.download_manager.start_status().await?;
    log::info!("Start requested: {:?}", status);
    Ok(Json(StartResponse { status }))
}

pub async fn cancel_download(State(state): State<AppState>) -> Json<CancelResponse> {
    let status = if state.download_manager.cancel().await {
        "cancelled"
    } else {
        "idle"
    };
    Json(CancelResponse { status: status.to_string() })
}
