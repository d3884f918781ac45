//! Embedded cover art, rendered as character art for the terminal.

use super::track::read_tagged;
use crate::error::LibraryError;
use image::imageops::FilterType;
use image::DynamicImage;
use lofty::file::TaggedFileExt;
use std::path::Path;
use tracing::debug;

/// Returned instead of art when there is no picture to show
pub const NO_IMAGE: &str = "NO_IMAGE";

// Dark to light.
const RAMP: &[u8] = b" .:-=+*#%@";

/// Terminal cells are roughly twice as tall as they are wide.
const CELL_ASPECT: f32 = 2.0;

/// Reads the first embedded picture of the file at `path` and renders it into
/// at most `height` rows of `width` characters.
///
/// Only failing to open the file is an error. Unparseable tags, no picture,
/// or a picture that does not decode all yield [`NO_IMAGE`].
pub fn cover_art_text(path: &Path, height: u32, width: u32) -> Result<String, LibraryError> {
    let tagged = match read_tagged(path) {
        Ok(tagged) => tagged,
        Err(err @ LibraryError::Io { .. }) => return Err(err),
        Err(err) => {
            debug!("No readable tags in {}: {}", path.display(), err);
            return Ok(NO_IMAGE.to_string());
        }
    };

    let picture = tagged
        .primary_tag()
        .and_then(|tag| tag.pictures().first())
        .or_else(|| tagged.tags().iter().find_map(|tag| tag.pictures().first()));
    let Some(picture) = picture else {
        return Ok(NO_IMAGE.to_string());
    };

    match image::load_from_memory(picture.data()) {
        Ok(img) => Ok(render_text_art(&img, height, width)),
        Err(err) => {
            debug!("Cover art in {} failed to decode: {}", path.display(), err);
            Ok(NO_IMAGE.to_string())
        }
    }
}

/// Scales `img` to fit the budget, keeping its aspect ratio, and maps each
/// cell's luminance onto [`RAMP`].
pub fn render_text_art(img: &DynamicImage, height: u32, width: u32) -> String {
    if height == 0 || width == 0 || img.width() == 0 || img.height() == 0 {
        return NO_IMAGE.to_string();
    }

    let scale = f32::min(
        width as f32 / img.width() as f32,
        (height as f32 * CELL_ASPECT) / img.height() as f32,
    );
    let cols = ((img.width() as f32 * scale).round() as u32).clamp(1, width);
    let rows = ((img.height() as f32 * scale / CELL_ASPECT).round() as u32).clamp(1, height);

    let luma = img.resize_exact(cols, rows, FilterType::Triangle).to_luma8();
    let mut out = String::with_capacity(((cols + 1) * rows) as usize);
    for (i, row) in luma.rows().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for pixel in row {
            let level = pixel.0[0] as usize * (RAMP.len() - 1) / 255;
            out.push(RAMP[level] as char);
        }
    }
    out
}
