use super::{is_music, Track};
use crate::config::ScanConfig;
use crate::error::LibraryError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Tracks from one scan, sorted by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Library {
    tracks: Vec<Track>,
}

impl Library {
    /// Sorts by name, byte-wise ("Alpha" < "b"). The sort is stable, so equal
    /// names keep their incoming order.
    pub fn from_tracks(mut tracks: Vec<Track>) -> Self {
        tracks.sort_by(|a, b| a.name().cmp(b.name()));
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    pub fn position_of(&self, path: &Path) -> Option<usize> {
        self.tracks.iter().position(|track| track.path() == path)
    }
}

impl<'a> IntoIterator for &'a Library {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started { root: PathBuf, candidates: usize },
    TrackFound { path: PathBuf, found: usize, total: usize },
    Completed { total_tracks: usize },
    Failed { path: PathBuf, error: String },
}

#[derive(Clone)]
pub struct MusicScanner {
    max_concurrent_reads: usize,
    follow_links: bool,
}

impl MusicScanner {
    pub fn new() -> Self {
        Self::with_config(&ScanConfig::default())
    }

    pub fn with_config(config: &ScanConfig) -> Self {
        Self {
            max_concurrent_reads: config.max_concurrent_reads.max(1),
            follow_links: config.follow_links,
        }
    }

    /// Builds the library under `root`.
    ///
    /// A file root yields a one-track library. A directory root is walked
    /// recursively; every file with a music extension is loaded by a fixed
    /// pool of workers. The first file that fails to load fails the whole
    /// scan and nothing is returned. A scan that finds no music is an error.
    pub async fn scan<P: AsRef<Path>>(&self, root: P) -> Result<Library, LibraryError> {
        self.run(root.as_ref().to_path_buf(), None).await
    }

    /// Same as [`scan`](Self::scan), reporting along the way. The channel is
    /// bounded, so the caller must keep draining it.
    pub async fn scan_incremental<P: AsRef<Path>>(
        &self,
        root: P,
        progress_tx: mpsc::Sender<ScanProgress>,
    ) -> Result<Library, LibraryError> {
        self.run(root.as_ref().to_path_buf(), Some(progress_tx)).await
    }

    async fn run(
        &self,
        root: PathBuf,
        progress: Option<mpsc::Sender<ScanProgress>>,
    ) -> Result<Library, LibraryError> {
        let metadata = std::fs::metadata(&root).map_err(|source| LibraryError::Io {
            path: root.clone(),
            source,
        })?;

        let candidates = if metadata.is_dir() {
            let walk_root = root.clone();
            let follow_links = self.follow_links;
            task::spawn_blocking(move || discover(&walk_root, follow_links)).await?
        } else {
            vec![root.clone()]
        };

        info!("Scanning {}: {} candidate file(s)", root.display(), candidates.len());
        report(
            &progress,
            ScanProgress::Started {
                root: root.clone(),
                candidates: candidates.len(),
            },
        )
        .await;

        let tracks = self.populate(candidates, &progress).await?;
        if tracks.is_empty() {
            return Err(LibraryError::NoMusic(root));
        }

        info!("Scan of {} found {} track(s)", root.display(), tracks.len());
        report(
            &progress,
            ScanProgress::Completed {
                total_tracks: tracks.len(),
            },
        )
        .await;
        Ok(Library::from_tracks(tracks))
    }

    /// Loads every candidate on the worker pool. Results come back through
    /// one channel and are slotted by discovery index.
    async fn populate(
        &self,
        candidates: Vec<PathBuf>,
        progress: &Option<mpsc::Sender<ScanProgress>>,
    ) -> Result<Vec<Track>, LibraryError> {
        let total = candidates.len();
        let queue = Arc::new(Mutex::new(candidates.into_iter().enumerate()));
        let abort = Arc::new(AtomicBool::new(false));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let mut workers = JoinSet::new();
        for _ in 0..self.max_concurrent_reads.min(total) {
            let queue = Arc::clone(&queue);
            let abort = Arc::clone(&abort);
            let result_tx = result_tx.clone();
            workers.spawn_blocking(move || {
                while !abort.load(Ordering::Relaxed) {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
                    let Some((slot, path)) = next else {
                        break;
                    };
                    let loaded = Track::load(&path);
                    if result_tx.send((slot, path, loaded)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut slots: Vec<Option<Track>> = vec![None; total];
        let mut found = 0;
        while let Some((slot, path, loaded)) = result_rx.recv().await {
            match loaded {
                Ok(track) => {
                    found += 1;
                    debug!("Loaded '{}' from {}", track.name(), path.display());
                    report(progress, ScanProgress::TrackFound { path, found, total }).await;
                    slots[slot] = Some(track);
                }
                Err(err) => {
                    abort.store(true, Ordering::Relaxed);
                    warn!("Scan aborted: {}", err);
                    report(
                        progress,
                        ScanProgress::Failed {
                            path,
                            error: err.to_string(),
                        },
                    )
                    .await;
                    return Err(err);
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            joined?;
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

impl Default for MusicScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Every file under `root` that passes the music filter, in walk order.
/// Entries that cannot be read are skipped along with anything below them.
fn discover(root: &Path, follow_links: bool) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|entry| entry.path().is_file() && is_music(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

async fn report(progress: &Option<mpsc::Sender<ScanProgress>>, update: ScanProgress) {
    if let Some(tx) = progress {
        let _ = tx.send(update).await;
    }
}
