use crate::config::AppConfig;
use crate::downloader::attempt::{AttemptSettings, AttemptStrategy};
use crate::downloader::progress::ProgressReporter;
use crate::downloader::DownloadTool;
use crate::errors::{AppError, Result};
use crate::state::SharedState;
use crate::storage::{FailureLog, TrackListFile};
use crate::track::Track;
use crate::utils::{ensure_dir_exists, generate_run_id};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// What a caller gets back from [`DownloadManager::start_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    Started,
    AlreadyRunning,
    EmptyQueue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// The run stopped before touching the queue (tool missing, output dir unusable).
    pub aborted: bool,
    pub cancelled: bool,
}

/// Handle to one background drain loop.
pub struct RunHandle {
    run_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Stops dispatching new tracks. Attempts already running are finished
    /// and whatever is left stays in the queue.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<RunSummary> {
        Ok(self.handle.await?)
    }
}

/// Queue processor: drains the shared queue in batch mode with at most
/// `max_concurrent` attempts in flight.
pub struct DownloadManager {
    state: SharedState,
    strategy: Arc<AttemptStrategy>,
    max_concurrent: usize,
    track_list: Option<TrackListFile>,
    active_run: Mutex<Option<CancellationToken>>,
}

impl DownloadManager {
    pub fn new(state: SharedState, strategy: AttemptStrategy, max_concurrent: usize) -> Self {
        Self {
            state,
            strategy: Arc::new(strategy),
            max_concurrent: max_concurrent.max(1),
            track_list: None,
            active_run: Mutex::new(None),
        }
    }

    /// Wires a manager from configuration around an already-built tool adapter.
    pub fn from_config(config: &AppConfig, tool: Arc<dyn DownloadTool>, state: SharedState) -> Self {
        let strategy = AttemptStrategy::new(
            tool,
            state.clone(),
            FailureLog::new(&config.failed_tracks_path),
            AttemptSettings::from_config(config),
        );

        let manager = Self::new(state, strategy, config.max_concurrent_downloads);
        if config.prune_track_list {
            manager.with_track_list_pruning(TrackListFile::new(&config.track_list_path))
        } else {
            manager
        }
    }

    /// Removes each successfully downloaded track from `track_list`.
    pub fn with_track_list_pruning(mut self, track_list: TrackListFile) -> Self {
        self.track_list = Some(track_list);
        self
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn reporter(&self) -> ProgressReporter {
        ProgressReporter::new(self.state.clone())
    }

    pub async fn enqueue<I, T>(&self, tracks: I) -> usize
    where
        I: IntoIterator<Item = T>,
        T: Into<Track>,
    {
        self.state.enqueue(tracks).await
    }

    /// Launches a drain loop in the background.
    ///
    /// Fails with [`AppError::AlreadyRunning`] or [`AppError::EmptyQueue`]
    /// without touching the state.
    pub async fn start(&self) -> Result<RunHandle> {
        // Held across begin_run so cancel() never sees a running state paired
        // with the previous run's token.
        let mut active_run = self.active_run.lock().await;
        let total = self.state.begin_run().await?;
        let run_id = generate_run_id();
        let cancel = CancellationToken::new();
        *active_run = Some(cancel.clone());
        drop(active_run);

        log::info!(
            "Starting queue processor (run {}): {} tracks, {} concurrent, tool '{}'",
            run_id,
            total,
            self.max_concurrent,
            self.strategy.tool().get_name()
        );

        let drain = DrainLoop {
            run_id: run_id.clone(),
            state: self.state.clone(),
            strategy: self.strategy.clone(),
            semaphore: Arc::new(Semaphore::new(self.max_concurrent)),
            track_list: self.track_list.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(drain.run());

        Ok(RunHandle { run_id, cancel, handle })
    }

    /// Like [`start`](Self::start), but reports the non-fatal refusals as a
    /// status instead of an error. The run keeps going after this returns.
    pub async fn start_status(&self) -> Result<StartStatus> {
        match self.start().await {
            Ok(_) => Ok(StartStatus::Started),
            Err(AppError::AlreadyRunning) => Ok(StartStatus::AlreadyRunning),
            Err(AppError::EmptyQueue) => Ok(StartStatus::EmptyQueue),
            Err(e) => Err(e),
        }
    }

    /// Cancels the active run, if any. Returns whether there was one.
    pub async fn cancel(&self) -> bool {
        let active_run = self.active_run.lock().await;
        if !self.state.is_running().await {
            return false;
        }
        match active_run.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

struct DrainLoop {
    run_id: String,
    state: SharedState,
    strategy: Arc<AttemptStrategy>,
    semaphore: Arc<Semaphore>,
    track_list: Option<TrackListFile>,
    cancel: CancellationToken,
}

impl DrainLoop {
    async fn run(self) -> RunSummary {
        let prepared = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            prepared = self.prepare() => Some(prepared),
        };

        match prepared {
            None => return self.stop_cancelled().await,
            Some(Err(e)) => {
                let message = format!("Critical: {}", e);
                log::error!("{}", message);
                self.state.stop_run(message).await;
                return self.summary(true, false).await;
            }
            Some(Ok(())) => {}
        }

        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut cancelled = false;

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.state.dequeue_next().await {
                Some(track) => {
                    let strategy = self.strategy.clone();
                    let state = self.state.clone();
                    let track_list = self.track_list.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        let result = strategy.attempt(&track).await;
                        if result.success {
                            if let Some(track_list) = track_list {
                                prune_track(&track_list, &state, &track).await;
                            }
                        }
                    });
                    reap_finished(&mut in_flight);
                }
                None => {
                    drop(permit);
                    if in_flight.is_empty() {
                        if self.state.finish_run().await {
                            break;
                        }
                        continue;
                    }
                    // Attempts still running may be followed by late enqueues;
                    // wait for them and look at the queue again.
                    Self::join_all(&mut in_flight).await;
                }
            }
        }

        Self::join_all(&mut in_flight).await;

        if cancelled {
            return self.stop_cancelled().await;
        }

        let summary = self.summary(false, false).await;
        log::info!(
            "Batch Finished! Success: {}, Failed: {}",
            summary.succeeded,
            summary.failed
        );
        summary
    }

    async fn prepare(&self) -> Result<()> {
        self.strategy.tool().check_available().await?;
        ensure_dir_exists(&self.strategy.settings().output_dir).await
    }

    async fn stop_cancelled(&self) -> RunSummary {
        let message = "Run cancelled; remaining tracks stay queued.";
        log::warn!("{}", message);
        self.state.stop_run(message).await;

        let summary = self.summary(false, true).await;
        log::info!(
            "Batch Finished! Success: {}, Failed: {}",
            summary.succeeded,
            summary.failed
        );
        summary
    }

    async fn join_all(in_flight: &mut JoinSet<()>) {
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                log::error!("Download task failed: {}", e);
            }
        }
    }

    async fn summary(&self, aborted: bool, cancelled: bool) -> RunSummary {
        let snapshot = self.state.snapshot().await;
        RunSummary {
            run_id: self.run_id.clone(),
            total: snapshot.total,
            completed: snapshot.completed,
            succeeded: snapshot.success,
            failed: snapshot.failed,
            aborted,
            cancelled,
        }
    }
}

/// Drops the slots of attempts that already finished, without waiting.
fn reap_finished(in_flight: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = in_flight.try_join_next() {
        if let Err(e) = joined {
            log::error!("Download task failed: {}", e);
        }
        reaped += 1;
    }
    reaped
}

async fn prune_track(track_list: &TrackListFile, state: &SharedState, track: &Track) {
    match track_list.remove(track).await {
        Ok(true) => log::info!("Removed '{}' from {}", track, track_list.path().display()),
        Ok(false) => {}
        Err(e) => {
            log::warn!("{}", e);
            state.log(format!("Error: {}", e)).await;
        }
    }
}
