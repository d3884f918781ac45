use super::output::{DeviceFormat, OutputBackend, RodioOutput};
use super::stream::DecodedStream;
use super::Track;
use crate::error::PlaybackError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// Resolves once the stream it was armed for plays to its end. If the stream
/// is stopped or replaced first, the sender is dropped and it resolves with
/// an error instead.
pub type Completion = oneshot::Receiver<()>;

struct ActiveStream {
    track: Track,
    stream: DecodedStream,
    paused: bool,
    done: Option<oneshot::Sender<()>>,
}

/// Everything the render callback reads. Guarded by the device lock.
#[derive(Default)]
struct DeviceState {
    format: Option<DeviceFormat>,
    active: Option<ActiveStream>,
}

struct OutputSlot {
    backend: Box<dyn OutputBackend>,
    opened: bool,
}

/// Drives the single output device: one decoded stream at a time, with
/// pause, seek and progress.
pub struct PlaybackController {
    device: Arc<Mutex<DeviceState>>,
    output: Mutex<OutputSlot>,
    buffer_duration: Duration,
}

impl PlaybackController {
    pub fn new(backend: Box<dyn OutputBackend>, buffer_duration: Duration) -> Self {
        Self {
            device: Arc::new(Mutex::new(DeviceState::default())),
            output: Mutex::new(OutputSlot {
                backend,
                opened: false,
            }),
            buffer_duration,
        }
    }

    /// Controller on the system's default output device.
    pub fn with_default_output(buffer_duration: Duration) -> Self {
        Self::new(Box::new(RodioOutput::new()), buffer_duration)
    }

    /// Decodes `track` and makes it the active stream, retiring whatever was
    /// playing. The first successful call opens the output device using this
    /// track's sample rate; later tracks reuse it as is.
    ///
    /// Decode and device failures leave the current stream untouched.
    pub fn play(&self, track: &Track) -> Result<Completion, PlaybackError> {
        let stream = DecodedStream::open(track)?;
        self.ensure_output(&stream)?;

        let (done_tx, done_rx) = oneshot::channel();
        let stream_rate = stream.sample_rate();
        let previous = {
            let mut device = self.lock_device();
            if let Some(format) = device.format {
                if format.sample_rate != stream_rate {
                    warn!(
                        "'{}' is {} Hz but the device runs at {} Hz",
                        track.name(),
                        stream_rate,
                        format.sample_rate
                    );
                }
            }
            device.active.replace(ActiveStream {
                track: track.clone(),
                stream,
                paused: false,
                done: Some(done_tx),
            })
        };

        if let Some(previous) = previous {
            debug!("Retired stream for {}", previous.track.path().display());
        }
        info!("Playing '{}' ({})", track.name(), track.path().display());
        Ok(done_rx)
    }

    fn ensure_output(&self, stream: &DecodedStream) -> Result<(), PlaybackError> {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        if output.opened {
            return Ok(());
        }

        let format = DeviceFormat::new(stream.sample_rate(), stream.channels(), self.buffer_duration);
        self.lock_device().format = Some(format);
        if let Err(err) = output.backend.open(format, self.renderer()) {
            self.lock_device().format = None;
            return Err(err);
        }
        output.opened = true;
        Ok(())
    }

    /// Toggles pause on the active stream. Does nothing when idle.
    pub fn pause_resume(&self) -> PlaybackState {
        let mut device = self.lock_device();
        match device.active.as_mut() {
            Some(active) => {
                active.paused = !active.paused;
                debug!("Paused: {}", active.paused);
                if active.paused {
                    PlaybackState::Paused
                } else {
                    PlaybackState::Playing
                }
            }
            None => PlaybackState::Idle,
        }
    }

    /// Moves the play position by `delta_seconds` of the stream's own sample
    /// rate, clamped to the start and end of the stream.
    ///
    /// Holding the device lock keeps the render callback out for the whole
    /// seek, including a seek by decoding on codecs that cannot jump. The
    /// pause state is left as it was.
    pub fn seek_seconds(&self, delta_seconds: i64) -> Result<(), PlaybackError> {
        let mut device = self.lock_device();
        let active = device.active.as_mut().ok_or(PlaybackError::Idle)?;

        let rate = active.stream.sample_rate() as i64;
        let len = active.stream.len() as i64;
        let target = (active.stream.position() as i64)
            .saturating_add(delta_seconds.saturating_mul(rate))
            .clamp(0, len);
        active.stream.seek(target as usize)?;

        debug!("Seeked {}s to frame {} of {}", delta_seconds, target, len);
        Ok(())
    }

    /// Fraction of the active stream already played, in `[0, 1]`.
    pub fn progress(&self) -> Result<f64, PlaybackError> {
        let device = self.lock_device();
        let active = device.active.as_ref().ok_or(PlaybackError::Idle)?;
        let len = active.stream.len();
        if len == 0 {
            return Ok(0.0);
        }
        Ok((active.stream.position() as f64 / len as f64).min(1.0))
    }

    pub fn position(&self) -> Result<Duration, PlaybackError> {
        let device = self.lock_device();
        let active = device.active.as_ref().ok_or(PlaybackError::Idle)?;
        Ok(frames_to_duration(active.stream.position(), active.stream.sample_rate()))
    }

    pub fn duration(&self) -> Result<Duration, PlaybackError> {
        let device = self.lock_device();
        let active = device.active.as_ref().ok_or(PlaybackError::Idle)?;
        Ok(frames_to_duration(active.stream.len(), active.stream.sample_rate()))
    }

    /// Retires the active stream without firing its completion. Returns
    /// whether anything was playing.
    pub fn stop(&self) -> bool {
        let retired = self.lock_device().active.take();
        match retired {
            Some(active) => {
                info!("Stopped '{}'", active.track.name());
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        match self.lock_device().active.as_ref() {
            Some(active) if active.paused => PlaybackState::Paused,
            Some(_) => PlaybackState::Playing,
            None => PlaybackState::Idle,
        }
    }

    pub fn current_track(&self) -> Option<Track> {
        self.lock_device()
            .active
            .as_ref()
            .map(|active| active.track.clone())
    }

    /// Format the device was opened with, once it has been.
    pub fn device_format(&self) -> Option<DeviceFormat> {
        self.lock_device().format
    }

    pub(crate) fn renderer(&self) -> Renderer {
        Renderer {
            device: Arc::clone(&self.device),
        }
    }

    fn lock_device(&self) -> MutexGuard<'_, DeviceState> {
        lock(&self.device)
    }
}

/// The device's render callback: fills output buffers from the active stream
/// under the device lock.
#[derive(Clone)]
pub struct Renderer {
    device: Arc<Mutex<DeviceState>>,
}

impl Renderer {
    /// Fills `out` with interleaved samples in the device format. Idle or
    /// paused playback renders silence. When the active stream runs out it is
    /// retired and its completion fires.
    pub fn render(&self, out: &mut [f32]) {
        let finished = {
            let mut device = lock(&self.device);
            let channels = device.format.map_or(1, |format| format.channels as usize);

            let written = match device.active.as_mut() {
                Some(active) if !active.paused => active.stream.read_frames(out, channels),
                _ => 0,
            };
            out[written * channels..].fill(0.0);

            let exhausted = device
                .active
                .as_ref()
                .is_some_and(|active| !active.paused && active.stream.is_exhausted());
            if exhausted {
                device.active.take()
            } else {
                None
            }
        };

        if let Some(mut finished) = finished {
            debug!("Finished '{}'", finished.track.name());
            if let Some(done) = finished.done.take() {
                let _ = done.send(());
            }
        }
    }
}

// The guarded state is plain data, consistent between any two statements,
// so a panic elsewhere never leaves it half-updated.
fn lock(device: &Mutex<DeviceState>) -> MutexGuard<'_, DeviceState> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

fn frames_to_duration(frames: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(frames as f64 / sample_rate.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::{write_wav, ManualOutput};
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    const RATE: u32 = 1_000;

    fn wav_track(dir: &TempDir, name: &str, rate: u32, frames: u32) -> Track {
        let path = dir.path().join(name);
        write_wav(&path, rate, 2, frames);
        Track::load(&path).unwrap()
    }

    fn controller() -> (PlaybackController, ManualOutput) {
        let output = ManualOutput::default();
        let controller =
            PlaybackController::new(Box::new(output.clone()), Duration::from_millis(100));
        (controller, output)
    }

    #[test]
    fn starts_idle() {
        let (controller, output) = controller();
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(controller.current_track().is_none());
        assert!(output.opened().is_empty());
    }

    #[test]
    fn idle_operations() {
        let (controller, _) = controller();
        assert_eq!(controller.pause_resume(), PlaybackState::Idle);
        assert!(matches!(controller.progress(), Err(PlaybackError::Idle)));
        assert!(matches!(controller.seek_seconds(5), Err(PlaybackError::Idle)));
        assert!(!controller.stop());
    }

    #[test]
    fn device_opens_once_with_first_track_rate() {
        let dir = tempdir().unwrap();
        let first = wav_track(&dir, "first.wav", 8_000, 100);
        let second = wav_track(&dir, "second.wav", 22_050, 100);
        let (controller, output) = controller();

        controller.play(&first).unwrap();
        controller.play(&second).unwrap();

        let opened = output.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].sample_rate, 8_000);
        assert_eq!(opened[0].buffer_frames, 800);
        assert_eq!(controller.device_format(), Some(opened[0]));
        assert_eq!(controller.current_track().unwrap().name(), "second");
    }

    #[test]
    fn unsupported_format_leaves_current_stream_alone() {
        let dir = tempdir().unwrap();
        let track = wav_track(&dir, "keep.wav", RATE, 2_000);
        let (controller, _) = controller();
        let _done = controller.play(&track).unwrap();
        controller.seek_seconds(1).unwrap();

        let err = controller.play(&Track::stub(Path::new("/music/other.m4a")));
        assert!(matches!(err, Err(PlaybackError::UnsupportedFormat(_))));
        assert_eq!(controller.current_track().unwrap().name(), "keep");
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert!((controller.progress().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn pause_twice_returns_to_playing_with_same_progress() {
        let dir = tempdir().unwrap();
        let track = wav_track(&dir, "song.wav", RATE, 4_000);
        let (controller, output) = controller();
        let _done = controller.play(&track).unwrap();
        output.pull(500);

        let before = controller.progress().unwrap();
        assert_eq!(controller.pause_resume(), PlaybackState::Paused);
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert_eq!(controller.pause_resume(), PlaybackState::Playing);
        assert_eq!(controller.progress().unwrap(), before);
        assert!((before - 0.125).abs() < 1e-9);
    }

    #[test]
    fn paused_stream_renders_silence_and_keeps_position() {
        let dir = tempdir().unwrap();
        let track = wav_track(&dir, "song.wav", RATE, 4_000);
        let (controller, output) = controller();
        let _done = controller.play(&track).unwrap();
        controller.pause_resume();

        let rendered = output.pull(200);
        assert!(rendered.iter().all(|s| *s == 0.0));
        assert_eq!(controller.position().unwrap(), Duration::ZERO);
    }

    #[test]
    fn seek_clamps_to_both_ends() {
        let dir = tempdir().unwrap();
        let track = wav_track(&dir, "song.wav", RATE, 3_000);
        let (controller, output) = controller();
        let _done = controller.play(&track).unwrap();
        output.pull(1_000);

        controller.seek_seconds(-600).unwrap();
        assert_eq!(controller.progress().unwrap(), 0.0);

        controller.seek_seconds(1).unwrap();
        assert_eq!(controller.position().unwrap(), Duration::from_secs(1));

        controller.seek_seconds(600).unwrap();
        assert_eq!(controller.progress().unwrap(), 1.0);
        assert_eq!(controller.duration().unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn seek_keeps_pause_state() {
        let dir = tempdir().unwrap();
        let track = wav_track(&dir, "song.wav", RATE, 3_000);
        let (controller, _) = controller();
        let _done = controller.play(&track).unwrap();
        controller.pause_resume();

        controller.seek_seconds(2).unwrap();
        assert_eq!(controller.state(), PlaybackState::Paused);
    }

    #[test]
    fn natural_end_fires_completion_and_goes_idle() {
        let dir = tempdir().unwrap();
        let track = wav_track(&dir, "short.wav", RATE, 150);
        let (controller, output) = controller();
        let mut done = controller.play(&track).unwrap();

        output.pull(100);
        assert!(done.try_recv().is_err());
        output.pull(100);

        assert_eq!(done.try_recv(), Ok(()));
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(matches!(controller.progress(), Err(PlaybackError::Idle)));
    }

    #[test]
    fn replaced_stream_never_completes() {
        let dir = tempdir().unwrap();
        let first = wav_track(&dir, "one.wav", RATE, 150);
        let second = wav_track(&dir, "two.wav", RATE, 5_000);
        let (controller, output) = controller();

        let mut first_done = controller.play(&first).unwrap();
        let _second_done = controller.play(&second).unwrap();
        output.pull(500);

        assert_eq!(
            first_done.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        );
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn stop_goes_idle_without_completion() {
        let dir = tempdir().unwrap();
        let track = wav_track(&dir, "song.wav", RATE, 1_000);
        let (controller, _) = controller();
        let mut done = controller.play(&track).unwrap();

        assert!(controller.stop());
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(done.try_recv(), Err(oneshot::error::TryRecvError::Closed));
    }

    #[test]
    fn seeking_to_the_end_completes_on_next_render() {
        let dir = tempdir().unwrap();
        let track = wav_track(&dir, "song.wav", RATE, 1_000);
        let (controller, output) = controller();
        let mut done = controller.play(&track).unwrap();

        controller.seek_seconds(10).unwrap();
        output.pull(10);
        assert_eq!(done.try_recv(), Ok(()));
    }
}
