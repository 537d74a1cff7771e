//! Process-scoped queue and progress counters.
//!
//! [`SharedState`] is a cheap cloneable handle. Every operation takes the lock
//! once, so readers always see a consistent point-in-time view and no caller
//! ever holds the lock across a download.
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use crate::downloader::AttemptResult;
use crate::errors::{AppError, Result};
use crate::track::Track;
use crate::utils::{last_meaningful_line, truncate_chars};

/// Maximum number of entries kept in the recent log ring.
pub const RECENT_LOG_CAPACITY: usize = 50;

/// Maximum length of the error excerpt written into a "Failed:" log line.
const LOG_ERROR_EXCERPT: usize = 100;

/// Point-in-time copy of the processing state, as served to polling clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingState {
    pub is_downloading: bool,
    pub total: usize,
    pub completed: usize,
    pub success: usize,
    pub failed: usize,
    pub current_track: String,
    pub in_flight: Vec<Track>,
    pub pending: usize,
    pub recent_logs: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<Track>,
    queued: HashSet<Track>,
    is_downloading: bool,
    total: usize,
    completed: usize,
    success: usize,
    failed: usize,
    current_track: Option<Track>,
    in_flight: Vec<Track>,
    recent_logs: VecDeque<String>,
}

impl Inner {
    fn push_log(&mut self, message: &str) {
        let timestamp = chrono::Local::now().format("%H:%M:%S");
        self.recent_logs.push_front(format!("[{}] {}", timestamp, message));
        self.recent_logs.truncate(RECENT_LOG_CAPACITY);
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<Inner>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends tracks that are not already waiting in the queue, keeping
    /// first-seen order. Returns how many were actually added.
    pub async fn enqueue<I, T>(&self, tracks: I) -> usize
    where
        I: IntoIterator<Item = T>,
        T: Into<Track>,
    {
        self.enqueue_new(tracks).await.len()
    }

    /// Same as [`enqueue`](Self::enqueue), returning the tracks that were added.
    pub async fn enqueue_new<I, T>(&self, tracks: I) -> Vec<Track>
    where
        I: IntoIterator<Item = T>,
        T: Into<Track>,
    {
        let mut inner = self.inner.lock().await;
        let mut added = Vec::new();

        for track in tracks {
            let track = track.into();
            if inner.queued.insert(track.clone()) {
                inner.queue.push_back(track.clone());
                added.push(track);
            }
        }

        inner.total += added.len();
        if !added.is_empty() {
            inner.push_log(&format!("Added {} tracks to queue.", added.len()));
        }
        added
    }

    /// Removes and returns the head of the queue.
    pub async fn dequeue_next(&self) -> Option<Track> {
        let mut inner = self.inner.lock().await;
        let track = inner.queue.pop_front()?;
        inner.queued.remove(&track);
        Some(track)
    }

    /// Marks a track as held by a worker slot.
    pub async fn mark_started(&self, track: &Track) {
        let mut inner = self.inner.lock().await;
        inner.current_track = Some(track.clone());
        inner.in_flight.push(track.clone());
    }

    /// Applies the final outcome of one track to the counters and the log.
    pub async fn record_outcome(&self, track: &Track, result: &AttemptResult) {
        let mut inner = self.inner.lock().await;

        if let Some(pos) = inner.in_flight.iter().position(|t| t == track) {
            inner.in_flight.remove(pos);
        }
        if inner.current_track.as_ref() == Some(track) {
            inner.current_track = inner.in_flight.last().cloned();
        }

        inner.completed += 1;
        let message = if result.success {
            inner.success += 1;
            if result.fallback {
                format!("Success ({}): {}", result.format.label(), track)
            } else {
                format!("Success: {}", track)
            }
        } else {
            inner.failed += 1;
            let excerpt = truncate_chars(last_meaningful_line(&result.message), LOG_ERROR_EXCERPT);
            format!("Failed: {} - {}", track, excerpt)
        };
        inner.push_log(&message);
    }

    /// Pushes a timestamped line onto the recent log ring.
    pub async fn log(&self, message: impl AsRef<str>) {
        self.inner.lock().await.push_log(message.as_ref());
    }

    pub async fn snapshot(&self) -> ProcessingState {
        let inner = self.inner.lock().await;
        ProcessingState {
            is_downloading: inner.is_downloading,
            total: inner.total,
            completed: inner.completed,
            success: inner.success,
            failed: inner.failed,
            current_track: inner
                .current_track
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_default(),
            in_flight: inner.in_flight.clone(),
            pending: inner.queue.len(),
            recent_logs: inner.recent_logs.iter().cloned().collect(),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.is_downloading
    }

    /// Moves from idle to running. Counters restart so that `total` is the
    /// number of tracks pending at the start of the run.
    pub async fn begin_run(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        if inner.is_downloading {
            return Err(AppError::AlreadyRunning);
        }
        if inner.queue.is_empty() {
            return Err(AppError::EmptyQueue);
        }

        inner.is_downloading = true;
        inner.total = inner.queue.len();
        inner.completed = 0;
        inner.success = 0;
        inner.failed = 0;
        inner.current_track = None;
        inner.in_flight.clear();
        inner.push_log("Download processor started.");
        Ok(inner.total)
    }

    /// Goes idle only if nothing was enqueued since the last empty dequeue.
    /// Shares the lock with `enqueue`, so a track added concurrently is
    /// either seen here or stays queued for the next run.
    pub async fn finish_run(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.queue.is_empty() {
            return false;
        }
        inner.is_downloading = false;
        inner.current_track = None;
        inner.push_log("Queue empty. Processing finished.");
        true
    }

    /// Goes idle regardless of what is left in the queue.
    pub async fn stop_run(&self, message: impl AsRef<str>) {
        let mut inner = self.inner.lock().await;
        inner.is_downloading = false;
        inner.current_track = None;
        inner.push_log(message.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioFormat;

    fn failure(message: &str) -> AttemptResult {
        AttemptResult::failure(message, AudioFormat::Flac)
    }

    #[tokio::test]
    async fn test_enqueue_deduplicates_against_queue() {
        let state = SharedState::new();

        let added = state.enqueue(["A - X", "B - Y", "A - X"]).await;
        assert_eq!(added, 2);

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.pending, 2);
        assert_eq!(state.dequeue_next().await, Some(Track::from("A - X")));
        assert_eq!(state.dequeue_next().await, Some(Track::from("B - Y")));
        assert_eq!(state.dequeue_next().await, None);
    }

    #[tokio::test]
    async fn test_uniqueness_is_checked_against_current_queue_only() {
        let state = SharedState::new();
        state.enqueue(["A - X"]).await;
        state.dequeue_next().await;

        assert_eq!(state.enqueue(["A - X"]).await, 1);
        assert_eq!(state.enqueue(["A - X"]).await, 0);
    }

    #[tokio::test]
    async fn test_enqueue_logs_only_when_something_was_added() {
        let state = SharedState::new();
        state.enqueue(["A - X"]).await;
        state.enqueue(["A - X"]).await;

        let logs = state.snapshot().await.recent_logs;
        assert_eq!(logs.len(), 1);
        assert!(logs[0].ends_with("Added 1 tracks to queue."));
    }

    #[tokio::test]
    async fn test_log_ring_is_capped_and_newest_first() {
        let state = SharedState::new();
        for i in 0..75 {
            state.log(format!("line {}", i)).await;
        }

        let logs = state.snapshot().await.recent_logs;
        assert_eq!(logs.len(), RECENT_LOG_CAPACITY);
        assert!(logs[0].ends_with("line 74"));
        assert!(logs[RECENT_LOG_CAPACITY - 1].ends_with("line 25"));
    }

    #[tokio::test]
    async fn test_begin_run_rejects_empty_and_running() {
        let state = SharedState::new();
        assert!(matches!(state.begin_run().await, Err(AppError::EmptyQueue)));
        assert!(!state.is_running().await);

        state.enqueue(["A - X"]).await;
        assert_eq!(state.begin_run().await.ok(), Some(1));
        assert!(matches!(state.begin_run().await, Err(AppError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_record_outcome_updates_counters_and_log() {
        let state = SharedState::new();
        state.enqueue(["A - X", "B - Y"]).await;
        state.begin_run().await.ok();

        let a = state.dequeue_next().await.unwrap();
        let b = state.dequeue_next().await.unwrap();
        state.mark_started(&a).await;
        state.mark_started(&b).await;
        assert_eq!(state.snapshot().await.current_track, "B - Y");

        state.record_outcome(&b, &failure("noise\nLookupError: nothing found")).await;
        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.current_track, "A - X");
        assert_eq!(snapshot.failed, 1);
        assert!(snapshot.recent_logs[0].ends_with("Failed: B - Y - LookupError: nothing found"));

        state.record_outcome(&a, &AttemptResult::success(AudioFormat::Mp3, true)).await;
        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.current_track, "");
        assert!(snapshot.in_flight.is_empty());
        assert!(snapshot.recent_logs[0].ends_with("Success (MP3): A - X"));
    }

    #[tokio::test]
    async fn test_failed_log_line_truncates_error() {
        let state = SharedState::new();
        let track = Track::from("A - X");
        state.record_outcome(&track, &failure(&"e".repeat(500))).await;

        let line = &state.snapshot().await.recent_logs[0];
        assert!(line.ends_with(&format!("Failed: A - X - {}", "e".repeat(100))));
    }

    #[tokio::test]
    async fn test_finish_run_waits_for_late_enqueues() {
        let state = SharedState::new();
        state.enqueue(["A - X"]).await;
        state.begin_run().await.ok();
        state.dequeue_next().await;

        state.enqueue(["B - Y"]).await;
        assert!(!state.finish_run().await);
        assert!(state.is_running().await);

        state.dequeue_next().await;
        assert!(state.finish_run().await);
        assert!(!state.is_running().await);
    }
}
