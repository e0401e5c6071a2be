use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Raw slot name → "HH:MM" mapping as delivered by a times source.
pub type RawTimes = BTreeMap<String, Option<String>>;

/// One cue trigger for today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrayerEvent {
    pub name: String,
    pub time: NaiveDateTime,
    /// Set once, when the cue for this event begins.
    pub fired: bool,
}

impl PrayerEvent {
    /// Format the time as HH:MM.
    pub fn time_display(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}

impl fmt::Display for PrayerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.name, self.time_display())
    }
}

/// Today's events, sorted ascending by time.
#[derive(Debug, Clone)]
pub struct EventSchedule {
    date: NaiveDate,
    events: Vec<PrayerEvent>,
}

impl EventSchedule {
    /// Build the schedule for `now`'s calendar day.
    ///
    /// Absent, empty and malformed values are skipped individually. Slots
    /// named in `twelve_hour_slots` are published on a 12-hour clock and get
    /// +12h when their hour falls in the morning half. Events strictly before
    /// `now` are dropped, not moved to tomorrow.
    pub fn build(raw: &RawTimes, now: NaiveDateTime, twelve_hour_slots: &[String]) -> Self {
        let date = now.date();
        let mut events = Vec::new();

        for (name, value) in raw {
            let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
                debug!("{} has no time today", name);
                continue;
            };
            let parsed = match parse_hhmm(name, value) {
                Ok(t) => t,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };

            let mut time = date.and_time(parsed);
            if parsed.hour() < 12 && twelve_hour_slots.iter().any(|s| s == name) {
                time += TimeDelta::hours(12);
            }

            if time < now {
                info!("{} time ({}) has already passed today", name, value);
                continue;
            }

            info!("Scheduled {} at {}", name, time.format("%H:%M"));
            events.push(PrayerEvent {
                name: name.clone(),
                time,
                fired: false,
            });
        }

        events.sort_by_key(|e| e.time);
        EventSchedule { date, events }
    }

    /// A schedule with no events for `date`.
    pub fn empty(date: NaiveDate) -> Self {
        EventSchedule {
            date,
            events: Vec::new(),
        }
    }

    /// First unfired event whose time has arrived.
    pub fn next_due(&self, now: NaiveDateTime) -> Option<&PrayerEvent> {
        self.events.iter().find(|e| e.time <= now && !e.fired)
    }

    /// Mutable form of `next_due`, so the caller can mark it fired.
    pub fn next_due_mut(&mut self, now: NaiveDateTime) -> Option<&mut PrayerEvent> {
        self.events.iter_mut().find(|e| e.time <= now && !e.fired)
    }

    /// First event still in the future, for display.
    pub fn next_upcoming(&self, now: NaiveDateTime) -> Option<(&str, NaiveDateTime)> {
        self.events
            .iter()
            .find(|e| e.time > now)
            .map(|e| (e.name.as_str(), e.time))
    }

    /// True once the calendar day has moved past the one this was built for.
    pub fn is_stale(&self, now: NaiveDateTime) -> bool {
        now.date() != self.date
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn events(&self) -> &[PrayerEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Parse an "HH:MM" time for `slot`.
pub fn parse_hhmm(slot: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| Error::parse(slot, value, format!("expected HH:MM ({})", e)))
}
