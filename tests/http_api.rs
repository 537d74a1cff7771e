use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use playlist_downloader::commands::{
    cancel_download, enqueue_tracks, get_status, start_download, AppState, EnqueueRequest,
};
use playlist_downloader::config::AudioFormat;
use playlist_downloader::downloader::attempt::{AttemptSettings, AttemptStrategy};
use playlist_downloader::downloader::manager::{DownloadManager, StartStatus};
use playlist_downloader::downloader::{DownloadTool, ToolOutput};
use playlist_downloader::errors::{AppError, Result};
use playlist_downloader::state::SharedState;
use playlist_downloader::storage::{FailureLog, TrackListFile};
use playlist_downloader::track::Track;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

struct SlowTool;

#[async_trait::async_trait]
impl DownloadTool for SlowTool {
    async fn check_available(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch(&self, _query: &str, _format: AudioFormat, _output_dir: &Path) -> Result<ToolOutput> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(ToolOutput::ok("done"))
    }

    fn get_name(&self) -> &str {
        "slow"
    }
}

fn app_state(dir: &TempDir) -> AppState {
    let state = SharedState::new();
    let settings = AttemptSettings {
        output_dir: dir.path().join("downloads"),
        preferred_format: AudioFormat::Flac,
        fallback_format: AudioFormat::Mp3,
        allow_fallback: true,
        rate_limit_delay: Duration::ZERO,
        timeout: Duration::from_secs(5),
    };
    let strategy = AttemptStrategy::new(
        Arc::new(SlowTool),
        state.clone(),
        FailureLog::new(dir.path().join("failed_tracks.txt")),
        settings,
    );

    AppState {
        download_manager: Arc::new(DownloadManager::new(state, strategy, 2)),
        track_list: TrackListFile::new(dir.path().join("track_list.txt")),
    }
}

fn request(tracks: &[&str], persist: bool) -> Json<EnqueueRequest> {
    Json(EnqueueRequest {
        tracks: tracks.iter().map(|t| t.to_string()).collect(),
        persist,
    })
}

#[tokio::test]
async fn test_enqueue_trims_dedups_and_persists_new_tracks() {
    let dir = tempdir().unwrap();
    let state = app_state(&dir);

    let Json(response) = enqueue_tracks(State(state.clone()), request(&["  A - X ", "", "B - Y", "A - X"], true))
        .await
        .unwrap();
    assert_eq!(response.added, 2);
    assert_eq!(response.total, 2);
    assert_eq!(response.pending, 2);

    let Json(response) = enqueue_tracks(State(state.clone()), request(&["B - Y", "C - Z"], true))
        .await
        .unwrap();
    assert_eq!(response.added, 1);
    assert_eq!(response.pending, 3);

    assert_eq!(
        state.track_list.read().await.unwrap(),
        vec![Track::from("A - X"), Track::from("B - Y"), Track::from("C - Z")]
    );
}

#[tokio::test]
async fn test_enqueue_without_tracks_is_bad_request() {
    let dir = tempdir().unwrap();
    let state = app_state(&dir);

    let err = enqueue_tracks(State(state), request(&["  ", ""], false))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_status_and_cancel_flow() {
    let dir = tempdir().unwrap();
    let state = app_state(&dir);

    let Json(response) = start_download(State(state.clone())).await.unwrap();
    assert_eq!(response.status, StartStatus::EmptyQueue);

    let Json(response) = cancel_download(State(state.clone())).await;
    assert_eq!(response.status, "idle");

    enqueue_tracks(State(state.clone()), request(&["A - X", "B - Y", "C - Z"], false))
        .await
        .unwrap();

    let Json(response) = start_download(State(state.clone())).await.unwrap();
    assert_eq!(response.status, StartStatus::Started);
    let Json(response) = start_download(State(state.clone())).await.unwrap();
    assert_eq!(response.status, StartStatus::AlreadyRunning);

    let Json(status) = get_status(State(state.clone())).await;
    assert!(status.is_downloading);
    assert_eq!(status.total, 3);

    let Json(response) = cancel_download(State(state.clone())).await;
    assert_eq!(response.status, "cancelled");

    loop {
        let Json(status) = get_status(State(state.clone())).await;
        if !status.is_downloading {
            assert_eq!(status.success + status.failed, status.completed);
            assert_eq!(status.pending, status.total - status.completed);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[test]
fn test_error_status_codes() {
    assert_eq!(AppError::AlreadyRunning.into_response().status(), StatusCode::CONFLICT);
    assert_eq!(
        AppError::ToolUnavailable("spotdl".to_string()).into_response().status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        AppError::Persistence("disk full".to_string()).into_response().status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
