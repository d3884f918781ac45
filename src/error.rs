//! Error types for library indexing and playback control

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a library from a root path
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The file or directory could not be opened or stat'ed
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file opened but its container or tags could not be parsed
    #[error("failed to parse {}: {source}", path.display())]
    Tags {
        path: PathBuf,
        source: lofty::error::LoftyError,
    },

    /// The scan finished without finding a single track
    #[error("no music files in {}", .0.display())]
    NoMusic(PathBuf),

    /// A population worker panicked or was torn down
    #[error("scan worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for LibraryError {
    fn from(err: tokio::task::JoinError) -> Self {
        LibraryError::Worker(err.to_string())
    }
}

/// Errors raised by the playback controller and session
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The track's format has no decoder
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: rodio::decoder::DecoderError,
    },

    /// A transport operation was called with nothing loaded
    #[error("nothing is playing")]
    Idle,

    /// The output device could not be opened
    #[error("audio output error: {0}")]
    Device(String),

    #[error("track index {index} out of range for a queue of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("playback task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
