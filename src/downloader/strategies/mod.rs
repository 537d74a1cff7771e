pub mod cli_tool;
pub mod hifi_api;

// Re-export adapters for easy access
pub use cli_tool::CliTool;
pub use hifi_api::HifiApiTool;

use std::sync::Arc;
use crate::config::{AppConfig, ToolBackend};
use crate::downloader::DownloadTool;
use crate::errors::Result;

/// Builds the adapter selected by `config.backend`.
pub fn build_tool(config: &AppConfig) -> Result<Arc<dyn DownloadTool>> {
    let tool: Arc<dyn DownloadTool> = match config.backend {
        ToolBackend::Cli => Arc::new(CliTool::new(&config.tool_path).with_args(config.tool_args.clone())),
        ToolBackend::HifiApi => Arc::new(HifiApiTool::new(
            &config.api_base_url,
            config.max_concurrent_downloads,
            config.timeout_per_track(),
        )?),
    };
    log::info!("Using download tool: {}", tool.get_name());
    Ok(tool)
}
