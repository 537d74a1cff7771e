use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use dirs;
use crate::errors::{AppError, Result};

const ENV_PREFIX: &str = "PLAYLIST_DL";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub download_path: PathBuf,
    pub track_list_path: PathBuf,
    pub failed_tracks_path: PathBuf,
    pub log_file: PathBuf,
    pub backend: ToolBackend,
    pub tool_path: String,
    /// Arguments for the CLI backend; `{query}`, `{format}` and `{output}` are substituted.
    pub tool_args: Vec<String>,
    pub api_base_url: String,
    pub max_concurrent_downloads: usize,
    pub rate_limit_delay_ms: u64,
    pub timeout_per_track_secs: u64,
    pub preferred_format: AudioFormat,
    pub fallback_format: AudioFormat,
    pub allow_quality_fallback: bool,
    pub prune_track_list: bool,
    pub server_addr: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolBackend {
    /// spotdl-style executable driven through a subprocess
    Cli,
    /// hifi REST API returning a base64 stream manifest
    HifiApi,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Flac,
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "MP3",
            AudioFormat::M4a => "M4A",
            AudioFormat::Flac => "FLAC",
            AudioFormat::Wav => "WAV",
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Flac | AudioFormat::Wav)
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from("downloads"),
            track_list_path: PathBuf::from("track_list.txt"),
            failed_tracks_path: PathBuf::from("failed_tracks.txt"),
            log_file: PathBuf::from("download.log"),
            backend: ToolBackend::Cli,
            tool_path: "spotdl".to_string(),
            tool_args: crate::downloader::strategies::cli_tool::default_args(),
            api_base_url: "https://tidal.401658.xyz".to_string(),
            max_concurrent_downloads: 3,
            rate_limit_delay_ms: 1000,
            timeout_per_track_secs: 300,
            preferred_format: AudioFormat::Flac,
            fallback_format: AudioFormat::Mp3,
            allow_quality_fallback: true,
            prune_track_list: false,
            server_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the JSON config file (writing the defaults if it does not exist yet)
    /// and applies `PLAYLIST_DL_*` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::get_config_path()?,
        };

        if !config_path.exists() {
            AppConfig::default().save_to(&config_path)?;
        }

        let config: AppConfig = config::Config::builder()
            .add_source(
                config::File::from(config_path.as_path())
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(config_dir) = config_path.parent() {
            if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
                std::fs::create_dir_all(config_dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config(config::ConfigError::Message("Could not find config directory".to_string())))?;

        Ok(config_dir.join("playlist-downloader").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(AppError::InvalidInput("max_concurrent_downloads must be at least 1".to_string()));
        }
        if self.timeout_per_track_secs == 0 {
            return Err(AppError::InvalidInput("timeout_per_track_secs must be at least 1".to_string()));
        }
        if self.tool_path.trim().is_empty() {
            return Err(AppError::InvalidInput("tool_path cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn timeout_per_track(&self) -> Duration {
        Duration::from_secs(self.timeout_per_track_secs)
    }
}
