//! Error types shared across the scheduler, player and worker.

use std::path::PathBuf;

/// Result type alias for adhan_flow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised inside the core. None of them are fatal to the ticker loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A single slot's time string could not be parsed
    #[error("Invalid time '{value}' for {slot}: {reason}")]
    ParseFailure {
        slot: String,
        value: String,
        reason: String,
    },

    /// No usable event times for the day
    #[error("No prayer times available for today")]
    EmptyInput,

    /// A cue or track could not be loaded or played
    #[error("Cannot play '{}': {reason}", path.display())]
    PlaybackFailure { path: PathBuf, reason: String },

    /// The playlist holds no tracks
    #[error("Playlist is empty")]
    EmptyPlaylist,

    /// The audio output device could not be opened
    #[error("Audio output unavailable: {0}")]
    AudioOutput(String),

    /// The background thread is gone (channel disconnected)
    #[error("{0} thread is not running")]
    WorkerUnavailable(&'static str),

    /// The music worker did not confirm a stop in time
    #[error("Music worker did not confirm stop within {0:?}")]
    StopTimeout(std::time::Duration),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a playback failure for `path`
    pub fn playback(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PlaybackFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse failure for a named slot
    pub fn parse(slot: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::ParseFailure {
            slot: slot.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
