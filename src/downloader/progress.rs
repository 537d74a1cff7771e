use crate::downloader::manager::{RunHandle, RunSummary};
use crate::errors::Result;
use crate::state::{ProcessingState, SharedState};
use crate::utils::truncate_chars;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Read-only view over the shared state for polling consumers.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    state: SharedState,
}

impl ProgressReporter {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Copies the current counters and recent log lines. Only the state lock
    /// is taken, never anything held by an in-flight download.
    pub async fn report(&self) -> ProcessingState {
        self.state.snapshot().await
    }
}

/// Terminal progress bar driven by polling a [`ProgressReporter`].
pub struct ConsoleProgress {
    reporter: ProgressReporter,
    refresh: Duration,
}

impl ConsoleProgress {
    pub fn new(reporter: ProgressReporter) -> Self {
        Self {
            reporter,
            refresh: Duration::from_millis(250),
        }
    }

    /// Renders progress until `run` finishes and returns its summary.
    pub async fn follow(&self, run: RunHandle) -> Result<RunSummary> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let wait = run.wait();
        tokio::pin!(wait);
        let mut ticker = tokio::time::interval(self.refresh);

        let summary = loop {
            tokio::select! {
                summary = &mut wait => break summary,
                _ = ticker.tick() => {
                    let report = self.reporter.report().await;
                    bar.set_length(report.total as u64);
                    bar.set_position(report.completed as u64);
                    if report.current_track.is_empty() {
                        bar.set_message("");
                    } else {
                        bar.set_message(format!("Downloading: {}...", truncate_chars(&report.current_track, 30)));
                    }
                }
            }
        };

        let report = self.reporter.report().await;
        bar.set_length(report.total as u64);
        bar.set_position(report.completed as u64);
        bar.finish_and_clear();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_is_a_copy() {
        let state = SharedState::new();
        let reporter = ProgressReporter::new(state.clone());
        state.enqueue(["A - X"]).await;

        let before = reporter.report().await;
        state.enqueue(["B - Y"]).await;

        assert_eq!(before.total, 1);
        assert_eq!(reporter.report().await.total, 2);
    }
}
