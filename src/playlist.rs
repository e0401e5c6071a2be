use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Ordered, cyclic list of tracks with a cursor that survives stop/start.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<PathBuf>,
    cursor: usize,
}

impl Playlist {
    pub fn new(tracks: Vec<PathBuf>) -> Self {
        Playlist { tracks, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Index of the next (or interrupted) track.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Track at the cursor, `None` when empty.
    pub fn current(&self) -> Option<&Path> {
        self.tracks.get(self.cursor).map(PathBuf::as_path)
    }

    /// Move the cursor forward one track, wrapping at the end.
    pub fn advance(&mut self) {
        if !self.tracks.is_empty() {
            self.cursor = (self.cursor + 1) % self.tracks.len();
        }
    }
}

/// List audio files in `dir` whose extension is in `extensions`
/// (case-insensitive), sorted by path. A missing folder yields an empty list.
pub fn scan_folder(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Music folder '{}' not readable: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(&ext)))
        })
        .collect();
    files.sort();
    info!("Loaded {} music files from '{}'", files.len(), dir.display());
    files
}
