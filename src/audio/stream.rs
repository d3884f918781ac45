//! Decoder selection and the streaming source the render callback reads.

use super::{AudioFormat, Track};
use crate::error::PlaybackError;
use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

type SampleSource = Box<dyn Source<Item = f32> + Send>;
type Reopen = Box<dyn Fn() -> Result<SampleSource, PlaybackError> + Send>;

/// A decoder pulled a frame at a time, with a frame cursor.
///
/// Samples are decoded as they are rendered; nothing but the current frame
/// is held in memory. Positions and lengths are in frames (one sample per
/// channel).
pub struct DecodedStream {
    source: SampleSource,
    reopen: Reopen,
    channels: u16,
    sample_rate: u32,
    len: usize,
    position: usize,
    finished: bool,
    frame: Vec<f32>,
}

impl DecodedStream {
    /// Picks the decoder for `track.format()` and opens it.
    ///
    /// Formats outside mp3/flac/wav/ogg fail before the file is opened. When
    /// the container does not report its duration the file is decoded once
    /// up front, without keeping samples, to count its frames.
    pub fn open(track: &Track) -> Result<Self, PlaybackError> {
        let format = track.format().clone();
        if !format.is_decodable() {
            return Err(PlaybackError::UnsupportedFormat(format.extension().to_string()));
        }

        let path = track.path().to_path_buf();
        let reopen: Reopen = Box::new(move || open_decoder(&path, &format));
        let source = reopen()?;

        let channels = source.channels().max(1);
        let sample_rate = source.sample_rate();
        let len = match source.total_duration() {
            Some(duration) => (duration.as_secs_f64() * sample_rate as f64).round() as usize,
            None => {
                debug!("No duration for {}, counting frames", track.path().display());
                reopen()?.count() / channels as usize
            }
        };

        Ok(Self::assemble(source, reopen, channels, sample_rate, len))
    }

    /// Wraps already-decoded interleaved samples. A trailing partial frame is
    /// dropped.
    pub fn from_samples(mut samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        let len = samples.len() / channels as usize;
        let sample_rate = sample_rate.max(1);

        let source: SampleSource =
            Box::new(SamplesBuffer::new(channels, sample_rate, samples.clone()));
        let reopen: Reopen = Box::new(move || {
            let buffer = SamplesBuffer::new(channels, sample_rate, samples.clone());
            Ok(Box::new(buffer) as SampleSource)
        });
        Self::assemble(source, reopen, channels, sample_rate, len)
    }

    fn assemble(
        source: SampleSource,
        reopen: Reopen,
        channels: u16,
        sample_rate: u32,
        len: usize,
    ) -> Self {
        Self {
            source,
            reopen,
            channels,
            sample_rate,
            len,
            position: 0,
            finished: false,
            frame: vec![0.0; channels as usize],
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in frames, as reported by the container
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// True once the decoder has run dry or the cursor was moved to the end.
    pub fn is_exhausted(&self) -> bool {
        self.finished
    }

    /// Moves the cursor to `frame`, clamped to `[0, len]`.
    ///
    /// Uses the decoder's own seek when it has one. Otherwise it skips
    /// forward by decoding, or reopens the file and skips from the start
    /// when moving backwards. On error the cursor is left where it was.
    pub fn seek(&mut self, frame: usize) -> Result<(), PlaybackError> {
        let target = frame.min(self.len);
        if target == self.len {
            self.position = target;
            self.finished = true;
            return Ok(());
        }

        let at = Duration::from_secs_f64(target as f64 / self.sample_rate.max(1) as f64);
        match self.source.try_seek(at) {
            Ok(()) => {}
            Err(err) => {
                debug!("Decoder seek unavailable ({:?}), seeking by decoding", err);
                let skip = if target >= self.position && !self.finished {
                    target - self.position
                } else {
                    self.source = (self.reopen)()?;
                    target
                };
                self.skip_frames(skip);
            }
        }

        self.position = target;
        self.finished = false;
        Ok(())
    }

    fn skip_frames(&mut self, frames: usize) {
        let samples = frames * self.channels as usize;
        for _ in 0..samples {
            if self.source.next().is_none() {
                break;
            }
        }
    }

    /// Copies frames into `out`, laid out for `out_channels` channels, and
    /// returns how many frames were written. Missing output channels repeat
    /// the last source channel; extra source channels are dropped.
    pub fn read_frames(&mut self, out: &mut [f32], out_channels: usize) -> usize {
        let out_channels = out_channels.max(1);
        let channels = self.channels as usize;
        let mut written = 0;

        for slot in out.chunks_exact_mut(out_channels) {
            if self.finished || !self.next_frame() {
                break;
            }
            for (ch, sample) in slot.iter_mut().enumerate() {
                *sample = self.frame[ch.min(channels - 1)];
            }
            self.position += 1;
            written += 1;
        }
        written
    }

    // A partial trailing frame counts as the end of the stream.
    fn next_frame(&mut self) -> bool {
        for sample in self.frame.iter_mut() {
            match self.source.next() {
                Some(value) => *sample = value,
                None => {
                    self.finished = true;
                    return false;
                }
            }
        }
        true
    }
}

fn open_decoder(path: &Path, format: &AudioFormat) -> Result<SampleSource, PlaybackError> {
    let file = File::open(path).map_err(|source| PlaybackError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let decoded = match format {
        AudioFormat::Mp3 => Decoder::new_mp3(reader),
        AudioFormat::Flac => Decoder::new_flac(reader),
        AudioFormat::Wav => Decoder::new_wav(reader),
        AudioFormat::Ogg => Decoder::new_vorbis(reader),
        other => return Err(PlaybackError::UnsupportedFormat(other.extension().to_string())),
    };
    let decoder = decoded.map_err(|source| PlaybackError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Box::new(decoder.convert_samples::<f32>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::write_wav;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn opens_wav_with_its_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8_000, 2, 800);
        let track = Track::load(&path).unwrap();

        let stream = DecodedStream::open(&track).unwrap();
        assert_eq!(stream.channels(), 2);
        assert_eq!(stream.sample_rate(), 8_000);
        assert_eq!(stream.len(), 800);
        assert_eq!(stream.position(), 0);
        assert!(!stream.is_exhausted());
    }

    #[test]
    fn reads_the_whole_file_then_runs_dry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav(&path, 1_000, 1, 30);
        let mut stream = DecodedStream::open(&Track::load(&path).unwrap()).unwrap();

        let mut out = [0.0; 64];
        assert_eq!(stream.read_frames(&mut out, 1), 30);
        assert!(stream.is_exhausted());
        assert_eq!(stream.read_frames(&mut out, 1), 0);
    }

    #[test]
    fn seeking_back_replays_from_the_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_wav(&path, 1_000, 1, 200);
        let mut stream = DecodedStream::open(&Track::load(&path).unwrap()).unwrap();

        let mut first = [0.0; 200];
        stream.read_frames(&mut first, 1);
        assert!(stream.is_exhausted());

        stream.seek(0).unwrap();
        assert_eq!(stream.position(), 0);
        assert!(!stream.is_exhausted());
        let mut again = [0.0; 200];
        assert_eq!(stream.read_frames(&mut again, 1), 200);
        assert_eq!(first, again);
    }

    #[test]
    fn m4a_is_rejected_before_decoding() {
        // The file does not exist: the format check comes before any open.
        let track = Track::stub("/music/song.m4a");
        let err = DecodedStream::open(&track).err().unwrap();
        assert!(matches!(err, PlaybackError::UnsupportedFormat(ext) if ext == "m4a"));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = DecodedStream::open(&Track::stub("/music/gone.flac")).err().unwrap();
        assert!(matches!(err, PlaybackError::Open { .. }));
    }

    #[test]
    fn each_format_uses_its_own_decoder() {
        let dir = tempdir().unwrap();
        let wav = dir.path().join("source.wav");
        write_wav(&wav, 8_000, 1, 400);

        // A WAV payload only decodes through the WAV branch.
        for name in ["x.flac", "x.ogg", "x.mp3"] {
            let path = dir.path().join(name);
            fs::copy(&wav, &path).unwrap();
            let err = DecodedStream::open(&Track::stub(&path)).err().unwrap();
            assert!(
                matches!(err, PlaybackError::Decode { ref path, .. } if path.ends_with(name)),
                "{} decoded as WAV: {:?}",
                name,
                err
            );
        }

        let path = dir.path().join("x.wav");
        fs::copy(&wav, &path).unwrap();
        assert_eq!(DecodedStream::open(&Track::stub(&path)).unwrap().len(), 400);
    }

    #[test]
    fn seek_clamps_to_length() {
        let mut stream = DecodedStream::from_samples(vec![0.0; 20], 2, 10);
        stream.seek(500).unwrap();
        assert_eq!(stream.position(), 10);
        assert!(stream.is_exhausted());
        stream.seek(3).unwrap();
        assert_eq!(stream.position(), 3);
        assert!(!stream.is_exhausted());
    }

    #[test]
    fn read_frames_maps_mono_to_stereo() {
        let mut stream = DecodedStream::from_samples(vec![0.1, 0.2, 0.3], 1, 10);
        let mut out = [9.0; 8];
        let written = stream.read_frames(&mut out, 2);
        assert_eq!(written, 3);
        assert_eq!(&out[..6], &[0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
        assert!(stream.is_exhausted());
    }

    #[test]
    fn seek_from_memory_lands_on_the_target_frame() {
        let mut stream = DecodedStream::from_samples(vec![0.0, 0.1, 0.2, 0.3, 0.4], 1, 10);
        let mut out = [0.0; 4];
        stream.read_frames(&mut out, 1);

        stream.seek(1).unwrap();
        let mut one = [0.0; 1];
        assert_eq!(stream.read_frames(&mut one, 1), 1);
        assert_eq!(one[0], 0.1);
        assert_eq!(stream.position(), 2);
    }

    #[test]
    fn partial_trailing_frame_is_dropped() {
        let stream = DecodedStream::from_samples(vec![0.0; 5], 2, 10);
        assert_eq!(stream.len(), 2);
    }
}
