//! Notifications the core pushes to whatever front end is attached: queue
//! advances, progress ticks and lazily rendered cover art.

use crate::audio::{PlaybackController, Track};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::warn;

/// Shown in place of cover art when the file could not be read
pub const COVER_ART_ERROR: &str = "ERROR";

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The track finished on its own; `next` should play now
    Advance { next: usize },
    /// The waiter for `index` was stopped; nothing follows
    Halted { index: usize },
    /// Fraction of the current track played, 0 when idle
    Progress(f64),
    CoverArtReady { index: usize, art: String },
    Error(String),
}

/// Emits [`PlayerEvent::Progress`] every `every` until the receiver is gone.
pub fn spawn_progress_ticker(
    controller: Arc<PlaybackController>,
    every: Duration,
    events: mpsc::UnboundedSender<PlayerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let progress = controller.progress().unwrap_or(0.0);
            if events.send(PlayerEvent::Progress(progress)).is_err() {
                break;
            }
        }
    })
}

/// Renders `track`'s cover off the runtime and emits
/// [`PlayerEvent::CoverArtReady`] tagged with `index`.
pub fn spawn_cover_art_loader(
    track: Track,
    index: usize,
    height: u32,
    width: u32,
    events: mpsc::UnboundedSender<PlayerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let rendered = task::spawn_blocking(move || track.cover_art_text(height, width)).await;
        let art = match rendered {
            Ok(Ok(art)) => art,
            Ok(Err(err)) => {
                warn!("Cover art unavailable: {}", err);
                COVER_ART_ERROR.to_string()
            }
            Err(err) => {
                warn!("Cover art task failed: {}", err);
                COVER_ART_ERROR.to_string()
            }
        };
        let _ = events.send(PlayerEvent::CoverArtReady { index, art });
    })
}
