// Settings for clover, read from the user's config directory.
// A missing file means defaults; nothing is written back.

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub music_directory: PathBuf,
    pub log_directory: PathBuf,
    pub scan: ScanConfig,
    pub playback: PlaybackConfig,
    pub cover_art: CoverArtConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Upper bound on files read at once
    pub max_concurrent_reads: usize,
    pub follow_links: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub buffer_duration_ms: u64,
    pub seek_step_seconds: i64,
    pub progress_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoverArtConfig {
    pub height: u32,
    pub width: u32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clover");

        Self {
            music_directory: dirs::audio_dir().unwrap_or_else(|| PathBuf::from("Music")),
            log_directory: data_dir.join("logs"),
            scan: ScanConfig::default(),
            playback: PlaybackConfig::default(),
            cover_art: CoverArtConfig::default(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reads: 16,
            follow_links: false,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: 100,
            seek_step_seconds: 10,
            progress_interval_ms: 1000,
        }
    }
}

impl Default for CoverArtConfig {
    fn default() -> Self {
        Self {
            height: 20,
            width: 40,
        }
    }
}

impl PlaybackConfig {
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(self.buffer_duration_ms.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_path(&Self::config_path()?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("clover");

        Ok(config_dir.join("config.toml"))
    }
}
