//! Adapter for the hifi REST API (Tidal proxy).
//!
//! `GET <base>/song/?q=<query>&quality=<LOSSLESS|HIGH>` answers with a JSON
//! array: the first element describes the song, the second carries a base64
//! encoded manifest whose `urls` point at the actual audio stream.
use std::path::Path;
use std::time::Duration;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;
use crate::config::AudioFormat;
use crate::downloader::http_pool::HttpPool;
use crate::downloader::{DownloadTool, ToolOutput};
use crate::errors::{AppError, Result};
use crate::track::Track;
use crate::utils::{ensure_dir_exists, sanitize_track_filename};

/// Anything this size or smaller is an error page or a preview clip, not a track.
const MIN_AUDIO_BYTES: u64 = 10_000;

fn is_too_small(written: u64) -> bool {
    written <= MIN_AUDIO_BYTES
}

#[derive(Debug, Deserialize)]
struct SongInfo {
    title: Option<String>,
    artist: Option<ArtistInfo>,
}

#[derive(Debug, Deserialize)]
struct ArtistInfo {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestEnvelope {
    manifest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamManifest {
    #[serde(default)]
    urls: Vec<String>,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

/// What the song endpoint resolved a query to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSong {
    pub title: String,
    pub artist: String,
    pub stream_url: String,
    pub mime_type: Option<String>,
}

impl ResolvedSong {
    fn extension(&self, requested: AudioFormat) -> &'static str {
        match self.mime_type.as_deref() {
            Some(mime) if mime.contains("flac") => "flac",
            Some(mime) if mime.contains("mp4") || mime.contains("aac") => "m4a",
            _ => requested.extension(),
        }
    }
}

pub struct HifiApiTool {
    name: String,
    base_url: Url,
    http: HttpPool,
}

impl HifiApiTool {
    pub fn new(base_url: &str, max_connections: usize, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| AppError::InvalidInput(format!("Invalid API base URL '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            name: format!("hifi-api:{}", base_url.host_str().unwrap_or("unknown")),
            base_url,
            http: HttpPool::new(max_connections, timeout)?,
        })
    }

    pub fn quality_for(format: AudioFormat) -> &'static str {
        if format.is_lossless() {
            "LOSSLESS"
        } else {
            "HIGH"
        }
    }

    pub fn song_url(&self, query: &str, format: AudioFormat) -> Result<Url> {
        let mut url = self
            .base_url
            .join("song/")
            .map_err(|e| AppError::InvalidInput(format!("Invalid API URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("quality", Self::quality_for(format));
        Ok(url)
    }
}

/// Decodes the song endpoint body. Errors are human-readable failure reasons.
pub fn parse_song_response(body: &str, query: &str) -> std::result::Result<ResolvedSong, String> {
    let items: Vec<serde_json::Value> =
        serde_json::from_str(body).map_err(|_| "Invalid API response format".to_string())?;
    if items.len() < 2 {
        return Err("Invalid API response format".to_string());
    }

    let song: SongInfo = serde_json::from_value(items[0].clone())
        .map_err(|e| format!("Invalid song info: {}", e))?;
    let envelope: ManifestEnvelope = serde_json::from_value(items[1].clone())
        .map_err(|e| format!("Invalid manifest envelope: {}", e))?;

    let encoded = envelope
        .manifest
        .filter(|m| !m.is_empty())
        .ok_or_else(|| "No manifest in API response".to_string())?;
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("Failed to decode manifest: {}", e))?;
    let manifest: StreamManifest = serde_json::from_slice(&decoded)
        .map_err(|e| format!("Failed to decode manifest: {}", e))?;

    let stream_url = manifest
        .urls
        .into_iter()
        .next()
        .ok_or_else(|| "No URL found in manifest".to_string())?;

    let query = Track::from(query);
    let (query_title, query_artist) = query.title_artist().unwrap_or((query.as_str(), "Unknown"));

    Ok(ResolvedSong {
        title: song.title.unwrap_or_else(|| query_title.to_string()),
        artist: song
            .artist
            .and_then(|a| a.name)
            .unwrap_or_else(|| query_artist.to_string()),
        stream_url,
        mime_type: manifest.mime_type,
    })
}

#[async_trait]
impl DownloadTool for HifiApiTool {
    async fn check_available(&self) -> Result<()> {
        // Any HTTP answer means the API host is reachable.
        self.http
            .get_client()
            .get(self.base_url.clone())
            .send()
            .await
            .map(|_| ())
            .map_err(|e| AppError::ToolUnavailable(format!("{} unreachable: {}", self.base_url, e)))
    }

    async fn fetch(&self, query: &str, format: AudioFormat, output_dir: &Path) -> Result<ToolOutput> {
        let url = self.song_url(query, format)?;
        log::info!("🔗 [HIFI] Fetching {}", url);

        let response = self.http.get_client().get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(ToolOutput::failed("Track not available"));
        }
        if !status.is_success() {
            return Ok(ToolOutput::failed(format!("HTTP {}: {}", status, body.trim())));
        }

        let song = match parse_song_response(&body, query) {
            Ok(song) => song,
            Err(reason) => return Ok(ToolOutput::failed(reason)),
        };

        ensure_dir_exists(output_dir).await?;
        let filename = format!(
            "{}.{}",
            sanitize_track_filename(&song.artist, &song.title),
            song.extension(format)
        );
        let path = output_dir.join(&filename);

        let written = match self.http.download_to_file(&song.stream_url, &path).await {
            Ok(written) => written,
            Err(e) => return Ok(ToolOutput::failed(format!("Download error: {}", e))),
        };

        if is_too_small(written) {
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(ToolOutput::failed(format!("Downloaded file too small ({} bytes)", written)));
        }

        Ok(ToolOutput::ok(format!(
            "Saved: {} ({:.1} MB)",
            filename,
            written as f64 / 1024.0 / 1024.0
        )))
    }

    fn get_name(&self) -> &str {
        &self.name
    }
}
