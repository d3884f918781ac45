use super::{cover_art, AudioFormat};
use crate::error::LibraryError;
use lofty::file::{FileType, TaggedFile, TaggedFileExt};
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Placeholder for artist/album when a file carries no usable tags
pub const UNKNOWN: &str = "UNKNOWN";
/// Reserved release year meaning "not known"
pub const DEFAULT_YEAR: u32 = 2100;

/// Metadata for one audio file. Built once by [`Track::load`] and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    path: PathBuf,
    name: String,
    artist: String,
    album: String,
    release_year: u32,
    format: AudioFormat,
}

impl Track {
    /// Opens `path`, reads its embedded tags and returns the populated track.
    ///
    /// Missing tags or an empty title are not errors: the track falls back to
    /// the file stem as its name and [`UNKNOWN`] / [`DEFAULT_YEAR`] for the
    /// rest. An unreadable file or a container lofty cannot parse is.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        let path = path.into();
        let tagged = read_tagged(&path)?;
        let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
        let format = AudioFormat::from_path(&path);

        let title = tag.and_then(|tag| non_empty(tag.title().map(|v| v.into_owned())));
        let Some(name) = title else {
            return Ok(Self::untagged(path, format));
        };

        // A tag with a title may still leave the other fields blank.
        let artist = tag
            .and_then(|tag| non_empty(tag.artist().map(|v| v.into_owned())))
            .unwrap_or_else(|| UNKNOWN.to_string());
        let album = tag
            .and_then(|tag| non_empty(tag.album().map(|v| v.into_owned())))
            .unwrap_or_else(|| UNKNOWN.to_string());
        let release_year = tag.and_then(release_year).unwrap_or(DEFAULT_YEAR);

        Ok(Self {
            path,
            name,
            artist,
            album,
            release_year,
            format,
        })
    }

    /// A track with fallback metadata that never touched the filesystem.
    #[cfg(test)]
    pub(crate) fn stub(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = AudioFormat::from_path(&path);
        Self::untagged(path, format)
    }

    fn untagged(path: PathBuf, format: AudioFormat) -> Self {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            path,
            name,
            artist: UNKNOWN.to_string(),
            album: UNKNOWN.to_string(),
            release_year: DEFAULT_YEAR,
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn album(&self) -> &str {
        &self.album
    }

    pub fn release_year(&self) -> u32 {
        self.release_year
    }

    pub fn has_known_year(&self) -> bool {
        self.release_year != DEFAULT_YEAR
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Renders the embedded cover as character art in a `height` x `width`
    /// budget. See [`cover_art::cover_art_text`].
    pub fn cover_art_text(&self, height: u32, width: u32) -> Result<String, LibraryError> {
        cover_art::cover_art_text(&self.path, height, width)
    }
}

/// Opens the file and parses its container, picking the parser from the
/// extension and falling back to sniffing the content.
pub(crate) fn read_tagged(path: &Path) -> Result<TaggedFile, LibraryError> {
    let io_error = |source| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_error)?;
    let probe = Probe::new(BufReader::new(file));
    let probe = match FileType::from_path(path) {
        Some(file_type) => probe.set_file_type(file_type),
        None => probe.guess_file_type().map_err(io_error)?,
    };

    probe.read().map_err(|source| LibraryError::Tags {
        path: path.to_path_buf(),
        source,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn release_year(tag: &Tag) -> Option<u32> {
    [ItemKey::Year, ItemKey::RecordingDate, ItemKey::OriginalReleaseDate]
        .into_iter()
        .filter_map(|key| tag.get_string(key))
        .find_map(parse_year)
}

/// Takes the leading four digits of a year or ISO-ish date ("1998-10-31").
fn parse_year(value: &str) -> Option<u32> {
    let digits: String = value.trim().chars().take(4).collect();
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}
