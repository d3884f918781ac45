//! Fixtures shared by the audio tests: hand-written WAV files, lofty tagging
//! and an output backend the test drives by hand.

use super::output::{DeviceFormat, OutputBackend};
use super::player::Renderer;
use crate::error::PlaybackError;
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::Accessor;
use lofty::tag::{ItemKey, Tag, TagType};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Writes a 16-bit PCM WAV of `frames` frames of a quiet ramp.
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
    let data_len = frames * channels as u32 * 2;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
    bytes.extend_from_slice(&(channels * 2).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for frame in 0..frames {
        let sample = ((frame % 64) as i16 - 32) * 16;
        for _ in 0..channels {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
    }
    fs::write(path, bytes).unwrap();
}

/// Adds an ID3v2 tag to an existing WAV.
pub fn tag_file(path: &Path, title: &str, artist: &str, year: Option<&str>) {
    edit_id3(path, |tag| {
        tag.set_title(title.to_string());
        tag.set_artist(artist.to_string());
        tag.set_album("Fixtures".to_string());
        if let Some(year) = year {
            tag.insert_text(ItemKey::RecordingDate, year.to_string());
        }
    });
}

/// Embeds `data` as the front cover, whether or not it is a real image.
pub fn attach_cover(path: &Path, data: Vec<u8>) {
    edit_id3(path, |tag| {
        tag.set_title("Covered".to_string());
        tag.push_picture(
            Picture::unchecked(data)
                .pic_type(PictureType::CoverFront)
                .mime_type(MimeType::Png)
                .build(),
        );
    });
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 40) as u8, (y * 40) as u8, 128])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn edit_id3(path: &Path, edit: impl FnOnce(&mut Tag)) {
    let mut tagged = lofty::read_from_path(path).unwrap();
    if tagged.tag(TagType::Id3v2).is_none() {
        let _ = tagged.insert_tag(Tag::new(TagType::Id3v2));
    }
    edit(tagged.tag_mut(TagType::Id3v2).unwrap());
    tagged.save_to_path(path, WriteOptions::default()).unwrap();
}

/// Output backend that never touches hardware; tests pull samples through
/// the captured renderer.
#[derive(Clone, Default)]
pub struct ManualOutput {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    opened: Vec<DeviceFormat>,
    renderer: Option<Renderer>,
}

impl ManualOutput {
    pub fn opened(&self) -> Vec<DeviceFormat> {
        self.inner.lock().unwrap().opened.clone()
    }

    /// Renders `frames` frames and returns the interleaved output.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let state = self.inner.lock().unwrap();
        let renderer = state.renderer.clone().expect("device never opened");
        let channels = state.opened[0].channels as usize;
        drop(state);
        let mut buffer = vec![1.0; frames * channels];
        renderer.render(&mut buffer);
        buffer
    }
}

impl OutputBackend for ManualOutput {
    fn open(&mut self, format: DeviceFormat, renderer: Renderer) -> Result<(), PlaybackError> {
        let mut state = self.inner.lock().unwrap();
        state.opened.push(format);
        state.renderer = Some(renderer);
        Ok(())
    }
}
