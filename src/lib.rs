// Clover - concurrent music library indexer and playback engine
// The front end talks to the core through a Library, a PlaybackSession and PlayerEvents

pub mod audio;   // scanning, tracks, decoding, output and transport
pub mod config;  // settings loaded from the user's config dir
pub mod error;   // typed errors for library and playback
pub mod events;  // notifications pushed to the front end
pub mod logging; // tracing subscriber setup

pub use audio::{Library, MusicScanner, PlaybackController, PlaybackSession, Track};
pub use config::Config;
pub use error::{LibraryError, PlaybackError};
pub use events::PlayerEvent;
