//! Output device backends. The controller opens exactly one, lazily, and the
//! backend pulls audio from the [`Renderer`] on its own thread.

use super::player::Renderer;
use crate::error::PlaybackError;
use rodio::cpal::traits::HostTrait;
use rodio::cpal::{self, SampleFormat, SampleRate, SupportedBufferSize, SupportedStreamConfig};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Shape of the one output device, fixed by the first track played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames rendered per pull of the render callback
    pub buffer_frames: usize,
}

impl DeviceFormat {
    pub fn new(sample_rate: u32, channels: u16, buffer_duration: Duration) -> Self {
        let buffer_frames = (sample_rate as f64 * buffer_duration.as_secs_f64()).round() as usize;
        Self {
            sample_rate,
            channels: channels.max(1),
            buffer_frames: buffer_frames.max(1),
        }
    }

    /// Interleaved samples in one buffer
    pub fn buffer_len(&self) -> usize {
        self.buffer_frames * self.channels as usize
    }
}

pub trait OutputBackend: Send {
    /// Opens the device with `format` and starts pulling from `renderer`.
    /// Called at most once per controller.
    fn open(&mut self, format: DeviceFormat, renderer: Renderer) -> Result<(), PlaybackError>;
}

/// The default output device through rodio.
///
/// rodio's stream handle is not `Send`, so it lives on a dedicated thread
/// that parks until this backend is dropped.
#[derive(Default)]
pub struct RodioOutput {
    worker: Option<OutputWorker>,
}

struct OutputWorker {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl RodioOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputBackend for RodioOutput {
    fn open(&mut self, format: DeviceFormat, renderer: Renderer) -> Result<(), PlaybackError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("clover-output".to_string())
            .spawn(move || {
                let opened = open_stream(format).and_then(|(stream, handle)| {
                    let sink = Sink::try_new(&handle)
                        .map_err(|e| PlaybackError::Device(e.to_string()))?;
                    sink.append(MixerSource::new(renderer, format));
                    Ok((stream, sink))
                });

                match opened {
                    Ok((_stream, _sink)) => {
                        let _ = ready_tx.send(Ok(()));
                        // Blocks until the backend is dropped.
                        let _ = shutdown_rx.recv();
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| PlaybackError::Device("output thread exited before opening".to_string()))??;

        info!(
            "Opened output device at {} Hz, {} channel(s), {} frame buffer",
            format.sample_rate, format.channels, format.buffer_frames
        );
        self.worker = Some(OutputWorker {
            shutdown: shutdown_tx,
            handle,
        });
        Ok(())
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.shutdown);
            let _ = worker.handle.join();
        }
    }
}

fn open_stream(format: DeviceFormat) -> Result<(OutputStream, OutputStreamHandle), PlaybackError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| PlaybackError::Device("no default output device".to_string()))?;

    let config = SupportedStreamConfig::new(
        format.channels,
        SampleRate(format.sample_rate),
        SupportedBufferSize::Unknown,
        SampleFormat::F32,
    );

    match OutputStream::try_from_device_config(&device, config) {
        Ok(opened) => Ok(opened),
        Err(err) => {
            // rodio converts our source to whatever the device runs at.
            warn!(
                "Device rejected {} Hz / {} channel(s): {}; falling back to its default config",
                format.sample_rate, format.channels, err
            );
            OutputStream::try_from_device(&device).map_err(|e| PlaybackError::Device(e.to_string()))
        }
    }
}

/// Endless source that refills one device buffer at a time from the renderer.
pub(crate) struct MixerSource {
    renderer: Renderer,
    format: DeviceFormat,
    buffer: Vec<f32>,
    cursor: usize,
}

impl MixerSource {
    pub(crate) fn new(renderer: Renderer, format: DeviceFormat) -> Self {
        let buffer = vec![0.0; format.buffer_len()];
        let cursor = buffer.len();
        Self {
            renderer,
            format,
            buffer,
            cursor,
        }
    }
}

impl Iterator for MixerSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.cursor >= self.buffer.len() {
            self.renderer.render(&mut self.buffer);
            self.cursor = 0;
        }
        let sample = self.buffer[self.cursor];
        self.cursor += 1;
        Some(sample)
    }
}

impl Source for MixerSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.format.channels
    }

    fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
