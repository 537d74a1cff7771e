use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Background task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("A download run is already in progress")]
    AlreadyRunning,

    #[error("The download queue is empty")]
    EmptyQueue,

    #[error("Timeout")]
    AttemptTimeout,

    #[error("Download attempt failed: {0}")]
    AttemptFailed(String),

    #[error("Download tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
