use crate::error::{Error, Result};
use crate::schedule::RawTimes;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

/// Supplies a day's raw slot times. Asked once at start and on each rollover.
pub trait TimesSource {
    fn times_for(&self, date: NaiveDate) -> Result<RawTimes>;
}

/// The same times every day.
#[derive(Debug, Clone, Default)]
pub struct FixedTimes(pub RawTimes);

impl FixedTimes {
    /// Parse `name=HH:MM` pairs. The time is validated later, per slot.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut times = RawTimes::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("Expected name=HH:MM, got '{}'", pair)))?;
            times.insert(name.trim().to_string(), Some(value.trim().to_string()));
        }
        Ok(FixedTimes(times))
    }
}

impl TimesSource for FixedTimes {
    fn times_for(&self, _date: NaiveDate) -> Result<RawTimes> {
        if self.0.is_empty() {
            return Err(Error::EmptyInput);
        }
        Ok(self.0.clone())
    }
}

/// Reads a JSON object shaped like the prayer-times API response, e.g.
/// `{"fajir":"05:00","doher":"12:10","maghrib":"06:22"}`.
///
/// Only the configured slot names are taken; non-string values count as
/// absent. The file is re-read on every call so an external fetcher can
/// refresh it between days.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    slots: Vec<String>,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>, slots: Vec<String>) -> Self {
        JsonFileSource {
            path: path.into(),
            slots,
        }
    }
}

impl TimesSource for JsonFileSource {
    fn times_for(&self, _date: NaiveDate) -> Result<RawTimes> {
        let data = fs::read_to_string(&self.path)?;
        let value: serde_json::Value = serde_json::from_str(&data)?;
        let object = value.as_object().ok_or_else(|| {
            Error::Config(format!("'{}' is not a JSON object", self.path.display()))
        })?;

        let times: RawTimes = self
            .slots
            .iter()
            .map(|slot| {
                let time = object
                    .get(slot)
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                (slot.clone(), time)
            })
            .collect();

        if times.values().all(Option::is_none) {
            return Err(Error::EmptyInput);
        }
        Ok(times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn slots() -> Vec<String> {
        ["fajir", "sunrise", "doher", "sunset", "maghrib"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn fixed_times_from_pairs() {
        let src = FixedTimes::from_pairs(&["fajir=05:00", " doher = 12:10 "]).unwrap();
        let times = src.times_for(today()).unwrap();
        assert_eq!(times["fajir"].as_deref(), Some("05:00"));
        assert_eq!(times["doher"].as_deref(), Some("12:10"));
    }

    #[test]
    fn fixed_times_rejects_bad_pair() {
        assert!(matches!(
            FixedTimes::from_pairs(&["fajir 05:00"]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn empty_fixed_times_is_empty_input() {
        let src = FixedTimes::default();
        assert!(matches!(src.times_for(today()), Err(Error::EmptyInput)));
    }

    #[test]
    fn json_file_keeps_known_slots_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("times.json");
        fs::write(
            &path,
            r#"{"fajir":"05:13","doher":"12:15","maghrib":null,"sunset":7,"date":"2025-03-14"}"#,
        )
        .unwrap();

        let times = JsonFileSource::new(&path, slots()).times_for(today()).unwrap();
        assert_eq!(times.len(), 5);
        assert_eq!(times["fajir"].as_deref(), Some("05:13"));
        assert_eq!(times["doher"].as_deref(), Some("12:15"));
        assert_eq!(times["maghrib"], None);
        assert_eq!(times["sunset"], None);
        assert_eq!(times["sunrise"], None);
        assert!(!times.contains_key("date"));
    }

    #[test]
    fn json_file_without_slots_is_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("times.json");
        fs::write(&path, r#"{"status":"ok"}"#).unwrap();
        let result = JsonFileSource::new(&path, slots()).times_for(today());
        assert!(matches!(result, Err(Error::EmptyInput)));
    }

    #[test]
    fn json_file_errors_are_reported() {
        let missing = JsonFileSource::new("__missing_times__.json", slots());
        assert!(matches!(missing.times_for(today()), Err(Error::Io(_))));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("times.json");
        fs::write(&path, "not json").unwrap();
        let corrupt = JsonFileSource::new(&path, slots());
        assert!(matches!(corrupt.times_for(today()), Err(Error::Json(_))));

        fs::write(&path, "[1,2]").unwrap();
        assert!(matches!(corrupt.times_for(today()), Err(Error::Config(_))));
    }
}
