pub mod commands;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod import;
pub mod state;
pub mod storage;
pub mod track;
pub mod utils;

pub use config::AppConfig;
pub use downloader::manager::DownloadManager;
pub use errors::{AppError, Result};
pub use state::{ProcessingState, SharedState};
pub use track::Track;
