//! Walks a queue of tracks through the controller, one waiter per play.

use super::{Library, PlaybackController};
use crate::error::PlaybackError;
use crate::events::PlayerEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task;
use tracing::{debug, info};

pub struct PlaybackSession {
    controller: Arc<PlaybackController>,
    queue: Arc<Library>,
    current: Option<usize>,
    stop_signal: Option<oneshot::Sender<()>>,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl PlaybackSession {
    pub fn new(
        controller: Arc<PlaybackController>,
        queue: Arc<Library>,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        Self {
            controller,
            queue,
            current: None,
            stop_signal: None,
            events,
        }
    }

    /// Plays `queue[index]` and starts a waiter for it.
    ///
    /// Any waiter from an earlier call is stopped first. The new waiter sends
    /// [`PlayerEvent::Advance`] with the next index (wrapping to 0 after the
    /// last track) when the track ends on its own, or
    /// [`PlayerEvent::Halted`] if it is stopped. Callers replay the advance by
    /// calling `play_at` again. On error no waiter is started.
    pub async fn play_at(&mut self, index: usize) -> Result<(), PlaybackError> {
        let len = self.queue.len();
        let track = self
            .queue
            .get(index)
            .cloned()
            .ok_or(PlaybackError::IndexOutOfRange { index, len })?;

        self.retire_waiter();
        self.current = Some(index);

        let controller = Arc::clone(&self.controller);
        let completion = task::spawn_blocking(move || controller.play(&track)).await??;

        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);
        let events = self.events.clone();

        tokio::spawn(async move {
            // Both may be ready at once; select! picks either.
            let event = tokio::select! {
                finished = completion => match finished {
                    Ok(()) => PlayerEvent::Advance { next: (index + 1) % len },
                    Err(_) => PlayerEvent::Halted { index },
                },
                _ = stop_rx => PlayerEvent::Halted { index },
            };
            debug!("Waiter for track {} resolved: {:?}", index, event);
            let _ = events.send(event);
        });

        Ok(())
    }

    /// Stops the waiter and the controller. No advance follows.
    pub fn stop(&mut self) {
        self.retire_waiter();
        if self.controller.stop() {
            info!("Session stopped at {:?}", self.current);
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn queue(&self) -> &Library {
        &self.queue
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.controller
    }

    fn retire_waiter(&mut self) {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
    }
}
