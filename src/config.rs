use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const CONFIG_DIR: &str = "adhan-flow";
const CONFIG_FILE: &str = "config.json";

/// Longest accepted resume delay.
const MAX_RESUME_DELAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ticker cadence and worker poll bound, in milliseconds.
    pub poll_interval_ms: u64,
    /// Delay between the end of a cue and music resuming.
    pub resume_delay_secs: u64,
    /// How long `stop` waits for the music worker to confirm.
    pub stop_timeout_ms: u64,
    pub cue_file: PathBuf,
    pub music_folder: PathBuf,
    /// JSON file with today's times; `None` means times come from the CLI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub times_file: Option<PathBuf>,
    /// Slot names read from the times source.
    pub slots: Vec<String>,
    /// Slots published on a 12-hour clock that need +12h.
    pub twelve_hour_slots: Vec<String>,
    pub audio_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            poll_interval_ms: 1000,
            resume_delay_secs: 15 * 60,
            stop_timeout_ms: 5000,
            cue_file: PathBuf::from("athan.mp3"),
            music_folder: PathBuf::from("music_folder"),
            times_file: None,
            slots: ["fajir", "sunrise", "doher", "sunset", "maghrib"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            twelve_hour_slots: vec!["sunset".to_string(), "maghrib".to_string()],
            audio_extensions: ["mp3", "wav", "ogg", "flac"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// `<config dir>/adhan-flow/config.json`, when the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`. A missing file gives defaults; a corrupt one logs a
    /// warning and gives defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Config::default();
        }
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(config) => return config,
                Err(e) => warn!("Corrupt config '{}', using defaults: {}", path.display(), e),
            },
            Err(e) => warn!("Could not read config '{}': {}", path.display(), e),
        }
        Config::default()
    }

    /// Persist as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the ticker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".into()));
        }
        if self.poll_interval_ms > 1000 {
            return Err(Error::Config("poll_interval_ms must be at most 1000".into()));
        }
        if self.resume_delay_secs > MAX_RESUME_DELAY_SECS {
            return Err(Error::Config(format!(
                "resume_delay_secs must be at most {}",
                MAX_RESUME_DELAY_SECS
            )));
        }
        if let Some(bad) = self
            .twelve_hour_slots
            .iter()
            .find(|s| !self.slots.contains(s))
        {
            warn!("twelve_hour_slots entry '{}' is not a configured slot", bad);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_secs(self.resume_delay_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_daemon_behaviour() {
        let cfg = Config::default();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.resume_delay(), Duration::from_secs(900));
        assert_eq!(cfg.twelve_hour_slots, vec!["sunset", "maghrib"]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"resume_delay_secs": 60}"#).unwrap();
        assert_eq!(cfg.resume_delay_secs, 60);
        assert_eq!(cfg.poll_interval_ms, 1000);
        assert_eq!(cfg.cue_file, PathBuf::from("athan.mp3"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let cfg = Config {
            times_file: Some(PathBuf::from("times.json")),
            resume_delay_secs: 120,
            ..Config::default()
        };
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), cfg);
    }

    #[test]
    fn missing_or_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(Config::load_from(&path), Config::default());
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn validate_rejects_bad_intervals() {
        let zero = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        assert!(zero.validate().is_err());

        let slow = Config {
            poll_interval_ms: 5000,
            ..Config::default()
        };
        assert!(slow.validate().is_err());

        let long = Config {
            resume_delay_secs: MAX_RESUME_DELAY_SECS + 1,
            ..Config::default()
        };
        assert!(long.validate().is_err());
    }
}
