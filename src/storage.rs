//! Append-only text files shared by concurrent attempts.
//!
//! Each file sits behind its own async mutex so that lines written by
//! different attempts never interleave.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use crate::errors::{AppError, Result};
use crate::track::Track;

async fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{}\n", line).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Durable record of tracks that failed every attempt.
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `"<track> | Reason: <reason>"`. Newlines in the reason are
    /// flattened so one failure stays on one line.
    pub async fn append(&self, track: &Track, reason: &str) -> Result<()> {
        let reason = reason.trim().replace(['\r', '\n'], " ");
        let _guard = self.lock.lock().await;
        append_line(&self.path, &format!("{} | Reason: {}", track, reason))
            .await
            .map_err(|e| AppError::Persistence(format!("{}: {}", self.path.display(), e)))
    }
}

/// The `track_list.txt` source file: one "Title - Artist" per line.
#[derive(Debug, Clone)]
pub struct TrackListFile {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl TrackListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all non-blank, trimmed lines. A missing file is an empty list.
    pub async fn read(&self) -> Result<Vec<Track>> {
        let _guard = self.lock.lock().await;
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_track_lines(&content))
    }

    pub async fn append(&self, tracks: &[Track]) -> Result<()> {
        let _guard = self.lock.lock().await;
        for track in tracks {
            append_line(&self.path, track.as_str())
                .await
                .map_err(|e| AppError::Persistence(format!("{}: {}", self.path.display(), e)))?;
        }
        Ok(())
    }

    /// Overwrites the file with `tracks`, one per line.
    pub async fn write_all(&self, tracks: &[Track]) -> Result<()> {
        let _guard = self.lock.lock().await;
        tokio::fs::write(&self.path, render_track_lines(tracks)).await?;
        Ok(())
    }

    /// Drops every line equal to `track` after trimming.
    pub async fn remove(&self, track: &Track) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(AppError::Persistence(format!("{}: {}", self.path.display(), e))),
        };

        let lines: Vec<&str> = content.lines().collect();
        let remaining: Vec<Track> = lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && *line != track.as_str())
            .map(Track::from)
            .collect();

        let removed = remaining.len() != lines.iter().filter(|l| !l.trim().is_empty()).count();
        if removed {
            tokio::fs::write(&self.path, render_track_lines(&remaining))
                .await
                .map_err(|e| AppError::Persistence(format!("{}: {}", self.path.display(), e)))?;
        }
        Ok(removed)
    }
}

pub fn parse_track_lines(content: &str) -> Vec<Track> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Track::from)
        .collect()
}

fn render_track_lines(tracks: &[Track]) -> String {
    let mut out = String::new();
    for track in tracks {
        out.push_str(track.as_str());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_failure_log_appends_one_line_per_failure() -> Result<()> {
        let dir = tempdir()?;
        let log = FailureLog::new(dir.path().join("failed_tracks.txt"));

        log.append(&Track::from("A - X"), "first line\nsecond line\n").await?;
        log.append(&Track::from("B - Y"), "Timeout").await?;

        let content = tokio::fs::read_to_string(log.path()).await?;
        assert_eq!(content, "A - X | Reason: first line second line\nB - Y | Reason: Timeout\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() -> Result<()> {
        let dir = tempdir()?;
        let log = FailureLog::new(dir.path().join("failed.txt"));

        let mut handles = Vec::new();
        for i in 0..20 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append(&Track::new(format!("Song {} - Artist", i)), &"x".repeat(2000)).await
            }));
        }
        for handle in handles {
            handle.await.map_err(|e| AppError::Persistence(e.to_string()))??;
        }

        let content = tokio::fs::read_to_string(log.path()).await?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 20);
        assert!(lines.iter().all(|l| l.ends_with(&"x".repeat(2000))));
        Ok(())
    }

    #[tokio::test]
    async fn test_track_list_read_skips_blank_lines() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("track_list.txt");
        tokio::fs::write(&path, "A - X\n\n   \n  B - Y  \n").await?;

        let tracks = TrackListFile::new(&path).read().await?;
        assert_eq!(tracks, vec![Track::from("A - X"), Track::from("B - Y")]);
        Ok(())
    }

    #[tokio::test]
    async fn test_track_list_missing_file_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let tracks = TrackListFile::new(dir.path().join("nope.txt")).read().await?;
        assert!(tracks.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_track_list_remove() -> Result<()> {
        let dir = tempdir()?;
        let file = TrackListFile::new(dir.path().join("track_list.txt"));
        file.append(&[Track::from("A - X"), Track::from("B - Y")]).await?;

        assert!(file.remove(&Track::from("A - X")).await?);
        assert!(!file.remove(&Track::from("Z - Z")).await?);
        assert_eq!(file.read().await?, vec![Track::from("B - Y")]);
        Ok(())
    }
}
