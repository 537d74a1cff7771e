pub mod attempt;
pub mod http_pool;
pub mod manager;
pub mod progress;
pub mod strategies;

use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::config::AudioFormat;
use crate::errors::Result;

/// Raw result of one invocation of an external download tool.
///
/// `success` mirrors a zero exit status or a 2xx response; `output` is the
/// combined stdout+stderr or response body, kept even on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into() }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self { success: false, output: output.into() }
    }
}

/// Outcome of downloading one track, after any fallback retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub success: bool,
    pub message: String,
    pub format: AudioFormat,
    /// Set when the success came from the fallback format.
    pub fallback: bool,
}

impl AttemptResult {
    pub fn success(format: AudioFormat, fallback: bool) -> Self {
        Self {
            success: true,
            message: "Success".to_string(),
            format,
            fallback,
        }
    }

    pub fn failure(message: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            success: false,
            message: message.into(),
            format,
            fallback: false,
        }
    }
}

/// Boundary to the external download executable or API.
///
/// Implementations report tool-level failures through `ToolOutput::success`
/// and reserve `Err` for problems reaching the tool at all.
#[async_trait::async_trait]
pub trait DownloadTool: Send + Sync {
    /// Verifies the tool can be reached before a run starts.
    async fn check_available(&self) -> Result<()>;

    /// Downloads `query` in `format` into `output_dir`.
    async fn fetch(&self, query: &str, format: AudioFormat, output_dir: &Path) -> Result<ToolOutput>;

    fn get_name(&self) -> &str;
}
