use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::Accessor;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Display metadata for a playlist entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub duration: Option<Duration>,
}

impl Track {
    /// Read title/artist/duration from tags. Never fails: unreadable files
    /// fall back to the file stem with no duration.
    pub fn probe(path: &Path) -> Self {
        let fallback_title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let Ok(tagged_file) = lofty::read_from_path(path) else {
            return Track {
                path: path.to_path_buf(),
                title: fallback_title,
                artist: "Unknown".to_string(),
                duration: None,
            };
        };

        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());
        let title = tag
            .and_then(|t| t.title().map(|s| s.to_string()))
            .unwrap_or(fallback_title);
        let artist = tag
            .and_then(|t| t.artist().map(|s| s.to_string()))
            .unwrap_or_else(|| "Unknown".to_string());

        Track {
            path: path.to_path_buf(),
            title,
            artist,
            duration: Some(tagged_file.properties().duration()),
        }
    }

    /// Format duration as MM:SS, or "--:--" when unknown.
    pub fn duration_display(&self) -> String {
        match self.duration {
            Some(d) => {
                let secs = d.as_secs();
                format!("{}:{:02}", secs / 60, secs % 60)
            }
            None => "--:--".to_string(),
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} — {} [{}]", self.artist, self.title, self.duration_display())
    }
}
