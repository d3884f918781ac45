// Clover - headless music player
// Scans a library, lists it, then plays through it driven by line commands on stdin

use anyhow::{Context, Result};
use clap::Parser;
use clover::audio::{PlaybackState, ScanProgress};
use clover::events::{spawn_cover_art_loader, spawn_progress_ticker};
use clover::logging::init_logging;
use clover::{Config, Library, MusicScanner, PlaybackController, PlaybackSession, PlayerEvent};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "clover")]
#[command(about = "Scan a music library and play it from the terminal")]
struct Args {
    /// Music directory or single file (defaults to the configured directory)
    path: Option<PathBuf>,

    /// Index of the first track to play
    #[arg(long, default_value_t = 0)]
    play: usize,

    /// List the library and exit
    #[arg(long)]
    list: bool,

    /// Enable developer logging (stderr + debug output)
    #[arg(long)]
    dev: bool,
}

const HELP: &str = "commands: p pause/resume, f/b seek, n next, s stop, <index> play, q quit";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;
    let _log_guard = init_logging(args.dev, &config.log_directory)?;

    info!("Clover starting up");
    let root = args.path.unwrap_or_else(|| config.music_directory.clone());

    let library = Arc::new(scan(&config, root).await?);
    print_library(&library);
    if args.list {
        return Ok(());
    }

    let controller = Arc::new(PlaybackController::with_default_output(
        config.playback.buffer_duration(),
    ));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = PlaybackSession::new(Arc::clone(&controller), Arc::clone(&library), event_tx.clone());
    let _ticker = spawn_progress_ticker(
        Arc::clone(&controller),
        config.playback.progress_interval(),
        event_tx.clone(),
    );
    let mut commands = spawn_command_reader();

    println!("{}", HELP);
    start(&mut session, &config, &event_tx, args.play).await;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    PlayerEvent::Advance { next } => start(&mut session, &config, &event_tx, next).await,
                    PlayerEvent::Halted { index } => debug!("Track {} halted", index),
                    PlayerEvent::Progress(fraction) => show_progress(&controller, fraction),
                    PlayerEvent::CoverArtReady { index, art } => {
                        if session.current() == Some(index) {
                            println!("\n{}", art);
                        }
                    }
                    PlayerEvent::Error(message) => eprintln!("\n{}", message),
                }
            }
            line = commands.recv() => {
                let Some(line) = line else { break };
                match line.trim() {
                    "" => {}
                    "q" => break,
                    "p" => println!("{:?}", controller.pause_resume()),
                    "f" => seek(&controller, config.playback.seek_step_seconds, &event_tx),
                    "b" => seek(&controller, -config.playback.seek_step_seconds, &event_tx),
                    "n" => {
                        let next = session.current().map_or(0, |i| (i + 1) % library.len());
                        start(&mut session, &config, &event_tx, next).await;
                    }
                    "s" => session.stop(),
                    other => match other.parse::<usize>() {
                        Ok(index) => start(&mut session, &config, &event_tx, index).await,
                        Err(_) => println!("{}", HELP),
                    },
                }
            }
        }
    }

    session.stop();
    info!("Clover shutting down");
    Ok(())
}

async fn scan(config: &Config, root: PathBuf) -> Result<Library> {
    let (progress_tx, mut progress_rx) = mpsc::channel(64);
    let reporter = tokio::spawn(async move {
        while let Some(update) = progress_rx.recv().await {
            match update {
                ScanProgress::Started { root, candidates } => {
                    println!("Scanning {} ({} candidate files)", root.display(), candidates)
                }
                ScanProgress::TrackFound { found, total, .. } => {
                    print!("\r{}/{}", found, total);
                    let _ = std::io::stdout().flush();
                }
                ScanProgress::Completed { total_tracks } => println!("\rFound {} tracks", total_tracks),
                ScanProgress::Failed { path, error } => {
                    eprintln!("\rFailed on {}: {}", path.display(), error)
                }
            }
        }
    });

    let scanner = MusicScanner::with_config(&config.scan);
    let library = scanner
        .scan_incremental(&root, progress_tx)
        .await
        .with_context(|| format!("scanning {}", root.display()));
    let _ = reporter.await;
    library
}

fn print_library(library: &Library) {
    for (i, track) in library.iter().enumerate() {
        let year = if track.has_known_year() {
            track.release_year().to_string()
        } else {
            "----".to_string()
        };
        println!(
            "{:>4}. {} - {} ({}, {})",
            i,
            track.name(),
            track.artist(),
            track.album(),
            year
        );
    }
}

async fn start(
    session: &mut PlaybackSession,
    config: &Config,
    events: &mpsc::UnboundedSender<PlayerEvent>,
    index: usize,
) {
    match session.play_at(index).await {
        Ok(()) => {
            if let Some(track) = session.queue().get(index).cloned() {
                println!("\nNow playing [{}] {} - {}", index, track.name(), track.artist());
                spawn_cover_art_loader(
                    track,
                    index,
                    config.cover_art.height,
                    config.cover_art.width,
                    events.clone(),
                );
            }
        }
        Err(err) => {
            warn!("Could not play track {}: {}", index, err);
            let _ = events.send(PlayerEvent::Error(format!("Could not play track {}: {}", index, err)));
        }
    }
}

fn seek(controller: &PlaybackController, seconds: i64, events: &mpsc::UnboundedSender<PlayerEvent>) {
    if let Err(err) = controller.seek_seconds(seconds) {
        let _ = events.send(PlayerEvent::Error(err.to_string()));
    }
}

fn show_progress(controller: &PlaybackController, fraction: f64) {
    if controller.state() == PlaybackState::Idle {
        return;
    }
    let position = controller.position().unwrap_or_default();
    let duration = controller.duration().unwrap_or_default();
    print!(
        "\r{:>5.1}%  {} / {}",
        fraction * 100.0,
        clock(position),
        clock(duration)
    );
    let _ = std::io::stdout().flush();
}

fn clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

// stdin is blocking, so lines are read on a plain thread and forwarded
fn spawn_command_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
