pub mod cover_art;
pub mod output;
pub mod player;
pub mod scanner;
pub mod session;
pub mod stream;
pub mod track;

#[cfg(test)]
pub(crate) mod test_support;

pub use cover_art::NO_IMAGE;
pub use output::{DeviceFormat, OutputBackend, RodioOutput};
pub use player::{PlaybackController, PlaybackState, Renderer};
pub use scanner::{Library, MusicScanner, ScanProgress};
pub use session::PlaybackSession;
pub use track::Track;

use std::path::Path;

/// Extensions the scanner treats as music. `m4a` is listed but has no
/// decoder, so such tracks fail at play time rather than scan time.
pub const MUSIC_EXTENSIONS: [&str; 5] = ["wav", "mp3", "ogg", "flac", "m4a"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Ogg,
    Wav,
    M4a,
    Other(String),
}

impl AudioFormat {
    /// Exact, case-sensitive match: `WAV` is `Other("WAV")`.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "mp3" => AudioFormat::Mp3,
            "flac" => AudioFormat::Flac,
            "ogg" => AudioFormat::Ogg,
            "wav" => AudioFormat::Wav,
            "m4a" => AudioFormat::M4a,
            other => AudioFormat::Other(other.to_string()),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(AudioFormat::from_extension)
            .unwrap_or_else(|| AudioFormat::Other(String::new()))
    }

    pub fn extension(&self) -> &str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Wav => "wav",
            AudioFormat::M4a => "m4a",
            AudioFormat::Other(ext) => ext,
        }
    }

    /// Whether one of the four bundled codecs can decode this format
    pub fn is_decodable(&self) -> bool {
        matches!(
            self,
            AudioFormat::Mp3 | AudioFormat::Flac | AudioFormat::Ogg | AudioFormat::Wav
        )
    }
}

/// Extension filter applied to every file the scanner visits. Matching is
/// case-sensitive, so `LOUD.WAV` is not music.
pub fn is_music(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MUSIC_EXTENSIONS.contains(&ext))
}
