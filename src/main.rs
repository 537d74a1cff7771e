use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use playlist_downloader::commands::{self, AppState};
use playlist_downloader::config::AppConfig;
use playlist_downloader::downloader::manager::{DownloadManager, RunSummary};
use playlist_downloader::downloader::progress::ConsoleProgress;
use playlist_downloader::downloader::strategies::build_tool;
use playlist_downloader::import::read_playlist_csv;
use playlist_downloader::state::SharedState;
use playlist_downloader::storage::TrackListFile;
use playlist_downloader::track::Track;
use playlist_downloader::utils::init_logging;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "playlist-downloader", version, about = "Download a playlist of \"Title - Artist\" tracks")]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download every track in the track list (or a playlist CSV)
    Run {
        /// Track list to read instead of the configured one
        #[arg(long, conflicts_with = "csv")]
        tracks: Option<PathBuf>,
        /// Read tracks from an exported playlist CSV instead
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Convert a playlist CSV into a track list file
    Import {
        csv: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Serve the queue/progress API over HTTP
    Serve {
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.log_file).context("Failed to initialize logging")?;
    info!("Starting playlist downloader");

    match cli.command {
        Command::Run { tracks, csv } => run(&config, tracks, csv).await,
        Command::Import { csv, out } => import(&config, csv, out).await,
        Command::Serve { addr } => serve(&config, addr).await,
    }
}

async fn run(config: &AppConfig, tracks: Option<PathBuf>, csv: Option<PathBuf>) -> anyhow::Result<()> {
    let queue: Vec<Track> = match csv {
        Some(csv) => read_playlist_csv(&csv).await?,
        None => {
            let path = tracks.unwrap_or_else(|| config.track_list_path.clone());
            let list = TrackListFile::new(&path).read().await?;
            info!("Loaded {} tracks from {}", list.len(), path.display());
            list
        }
    };

    if queue.is_empty() {
        println!("No tracks to download.");
        return Ok(());
    }

    let tool = build_tool(config)?;
    let manager = DownloadManager::from_config(config, tool, SharedState::new());
    manager.enqueue(queue).await;

    let handle = manager.start().await?;
    info!("Run {} started", handle.run_id());

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, finishing in-flight downloads");
            cancel.cancel();
        }
    });

    let summary = ConsoleProgress::new(manager.reporter()).follow(handle).await?;
    print_summary(config, &summary);
    Ok(())
}

fn print_summary(config: &AppConfig, summary: &RunSummary) {
    if summary.aborted {
        println!("Run aborted before any download. See {}", config.log_file.display());
        return;
    }

    println!("Finished. Success: {}, Failed: {}", summary.succeeded, summary.failed);
    if summary.cancelled {
        println!("Cancelled with {} of {} tracks processed.", summary.completed, summary.total);
    }
    if summary.failed > 0 {
        println!("Failed tracks were written to {}", config.failed_tracks_path.display());
    }
}

async fn import(config: &AppConfig, csv: PathBuf, out: Option<PathBuf>) -> anyhow::Result<()> {
    let tracks = read_playlist_csv(&csv).await?;
    let out = out.unwrap_or_else(|| config.track_list_path.clone());

    TrackListFile::new(&out)
        .write_all(&tracks)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!("Wrote {} tracks to {}", tracks.len(), out.display());
    Ok(())
}

async fn serve(config: &AppConfig, addr: Option<String>) -> anyhow::Result<()> {
    let tool = build_tool(config)?;
    let track_list = TrackListFile::new(&config.track_list_path);
    let manager = DownloadManager::from_config(config, tool, SharedState::new());

    // Whatever is already on disk is queued but not started.
    let existing = track_list.read().await?;
    if !existing.is_empty() {
        manager.enqueue(existing).await;
    }

    let state = AppState {
        download_manager: Arc::new(manager),
        track_list,
    };

    let addr = addr.unwrap_or_else(|| config.server_addr.clone());
    commands::serve(&addr, state).await?;
    Ok(())
}
