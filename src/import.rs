//! Playlist CSV import (Exportify-style exports).
use std::collections::HashSet;
use std::path::Path;
use regex::Regex;
use crate::errors::{AppError, Result};
use crate::track::Track;

/// Column positions found by sniffing the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    track: usize,
    artist: usize,
}

fn sniff_columns(headers: &csv::StringRecord) -> Option<Columns> {
    let find = |keyword: &str| {
        headers.iter().position(|h| {
            let h = h.trim().to_lowercase();
            h.contains(keyword) && h.contains("name")
        })
    };

    Some(Columns {
        track: find("track")?,
        artist: find("artist")?,
    })
}

/// First artist of a `;`/`,` separated list, with whitespace collapsed.
fn first_artist(raw: &str, whitespace: &Regex) -> String {
    let first = raw.split([';', ',']).next().unwrap_or("").trim();
    whitespace.replace_all(first, " ").into_owned()
}

/// Reads "Title - Artist" tracks out of CSV text.
///
/// Rows missing a title or artist are skipped, and repeated entries
/// (compared case-insensitively) keep only their first occurrence.
pub fn parse_playlist_csv(content: &str) -> Result<Vec<Track>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = csv_reader.headers()?.clone();
    let columns = sniff_columns(&headers).ok_or_else(|| {
        AppError::InvalidInput("Could not identify Track/Artist columns in CSV header".to_string())
    })?;

    let whitespace = Regex::new(r"\s+").map_err(|e| AppError::InvalidInput(e.to_string()))?;
    let mut seen = HashSet::new();
    let mut tracks = Vec::new();

    for result in csv_reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Failed to parse CSV record: {}", e);
                continue;
            }
        };

        let title = record.get(columns.track).unwrap_or("").trim();
        let artist = first_artist(record.get(columns.artist).unwrap_or(""), &whitespace);
        if title.is_empty() || artist.is_empty() {
            continue;
        }

        let track = Track::from_parts(title, &artist);
        if seen.insert(track.as_str().to_lowercase()) {
            tracks.push(track);
        }
    }

    Ok(tracks)
}

pub async fn read_playlist_csv(path: &Path) -> Result<Vec<Track>> {
    log::info!("Importing CSV playlist from: {}", path.display());
    let bytes = tokio::fs::read(path).await?;
    let content = String::from_utf8_lossy(&bytes);
    let tracks = parse_playlist_csv(&content)?;
    log::info!("Extracted {} unique tracks from {}", tracks.len(), path.display());
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exportify_columns() -> Result<()> {
        let csv = "Track URI,Track Name,Album Name,Artist Name(s)\n\
                   spotify:1,Song One,Album,Artist A;Artist B\n\
                   spotify:2,Song Two,Album,\"Artist  C, Artist D\"\n";

        let tracks = parse_playlist_csv(csv)?;

        assert_eq!(tracks, vec![Track::from("Song One - Artist A"), Track::from("Song Two - Artist C")]);
        Ok(())
    }

    #[test]
    fn test_skips_incomplete_rows_and_duplicates() -> Result<()> {
        let csv = "track_name,artist_name\n\
                   Song,Artist\n\
                   ,Nobody\n\
                   Lonely,\n\
                   song,artist\n\
                   Other,Artist\n";

        let tracks = parse_playlist_csv(csv)?;

        assert_eq!(tracks, vec![Track::from("Song - Artist"), Track::from("Other - Artist")]);
        Ok(())
    }

    #[test]
    fn test_unknown_header_is_rejected() {
        let result = parse_playlist_csv("title,performer\nA,B\n");
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
