use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use crate::config::{AppConfig, AudioFormat};
use crate::downloader::{AttemptResult, DownloadTool};
use crate::errors::AppError;
use crate::state::SharedState;
use crate::storage::FailureLog;
use crate::track::Track;

/// Knobs for a single track download, taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct AttemptSettings {
    pub output_dir: PathBuf,
    pub preferred_format: AudioFormat,
    pub fallback_format: AudioFormat,
    pub allow_fallback: bool,
    pub rate_limit_delay: Duration,
    pub timeout: Duration,
}

impl AttemptSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            output_dir: config.download_path.clone(),
            preferred_format: config.preferred_format,
            fallback_format: config.fallback_format,
            allow_fallback: config.allow_quality_fallback,
            rate_limit_delay: config.rate_limit_delay(),
            timeout: config.timeout_per_track(),
        }
    }

    fn should_fall_back(&self) -> bool {
        self.allow_fallback && self.preferred_format != self.fallback_format
    }
}

/// Downloads one track: preferred format first, then at most one retry in
/// the fallback format.
pub struct AttemptStrategy {
    tool: Arc<dyn DownloadTool>,
    state: SharedState,
    failure_log: FailureLog,
    settings: AttemptSettings,
}

impl AttemptStrategy {
    pub fn new(
        tool: Arc<dyn DownloadTool>,
        state: SharedState,
        failure_log: FailureLog,
        settings: AttemptSettings,
    ) -> Self {
        Self { tool, state, failure_log, settings }
    }

    pub fn tool(&self) -> &Arc<dyn DownloadTool> {
        &self.tool
    }

    pub fn settings(&self) -> &AttemptSettings {
        &self.settings
    }

    /// Runs the attempt chain for `track` and records the outcome in the
    /// shared state exactly once. Never fails: every error ends up in the
    /// returned result, the recent log and the failure log.
    pub async fn attempt(&self, track: &Track) -> AttemptResult {
        self.state.mark_started(track).await;
        let start_time = Instant::now();
        log::info!("Started Downloading: {}", track);

        let preferred = self.settings.preferred_format;
        let result = match self.try_format(track, preferred).await {
            Ok(()) => AttemptResult::success(preferred, false),
            Err(e) if self.settings.should_fall_back() => {
                let fallback = self.settings.fallback_format;
                log::warn!("{} failed for '{}': {}", preferred.label(), track, failure_message(&e));
                self.state
                    .log(format!("Retrying ({}): {}", fallback.label(), track))
                    .await;

                match self.try_format(track, fallback).await {
                    Ok(()) => {
                        log::warn!("Downloaded '{}' in {} (Fallback)", track, fallback.label());
                        AttemptResult::success(fallback, true)
                    }
                    Err(e) => self.give_up(track, e, fallback).await,
                }
            }
            Err(e) => self.give_up(track, e, preferred).await,
        };

        if result.success {
            log::info!(
                "Completed Download: {} as {} (took {:.2} seconds)",
                track,
                result.format.label(),
                start_time.elapsed().as_secs_f64()
            );
        }

        self.state.record_outcome(track, &result).await;
        result
    }

    /// One tool invocation, preceded by the rate-limit delay and bounded by
    /// the per-track timeout.
    async fn try_format(&self, track: &Track, format: AudioFormat) -> Result<(), AppError> {
        if !self.settings.rate_limit_delay.is_zero() {
            tokio::time::sleep(self.settings.rate_limit_delay).await;
        }

        let fetch = self.tool.fetch(track.as_str(), format, &self.settings.output_dir);
        match tokio::time::timeout(self.settings.timeout, fetch).await {
            Err(_) => Err(AppError::AttemptTimeout),
            Ok(Err(e)) => Err(AppError::AttemptFailed(e.to_string())),
            Ok(Ok(output)) if output.success => Ok(()),
            Ok(Ok(output)) => {
                let output = output.output.trim();
                let message = if output.is_empty() { "Unknown error" } else { output };
                Err(AppError::AttemptFailed(message.to_string()))
            }
        }
    }

    async fn give_up(&self, track: &Track, error: AppError, format: AudioFormat) -> AttemptResult {
        let message = failure_message(&error);
        log::error!("Failed to download '{}': {}", track, message);

        if let Err(e) = self.failure_log.append(track, &message).await {
            log::error!("{}", e);
            self.state.log(format!("Error: {}", e)).await;
        }

        AttemptResult::failure(message, format)
    }
}

fn failure_message(error: &AppError) -> String {
    match error {
        AppError::AttemptFailed(message) => message.clone(),
        other => other.to_string(),
    }
}
