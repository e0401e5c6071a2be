//! Ticker: the single control loop.
//!
//! Once per poll interval: rebuild the schedule on a new calendar day, pick
//! up a finished cue, trigger any due event, fire a due resume, and render
//! the countdown line.

use crate::clock::Clock;
use crate::coordinator::{AdhanCoordinator, TriggerOutcome};
use crate::schedule::EventSchedule;
use crate::source::TimesSource;
use chrono::NaiveDateTime;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

pub const NOTHING_SCHEDULED: &str = "No more Adhans scheduled for today.";

/// Width the countdown line is padded to, so shorter lines overwrite longer ones.
const LINE_WIDTH: usize = 48;

pub struct Ticker {
    clock: Arc<dyn Clock>,
    source: Box<dyn TimesSource>,
    twelve_hour_slots: Vec<String>,
    schedule: EventSchedule,
    coordinator: AdhanCoordinator,
    poll: Duration,
}

impl Ticker {
    /// Build today's schedule from `source` and take ownership of the coordinator.
    pub fn new(
        clock: Arc<dyn Clock>,
        source: Box<dyn TimesSource>,
        twelve_hour_slots: Vec<String>,
        coordinator: AdhanCoordinator,
        poll: Duration,
    ) -> Self {
        let now = clock.now();
        let schedule = load_schedule(source.as_ref(), now, &twelve_hour_slots);
        Ticker {
            clock,
            source,
            twelve_hour_slots,
            schedule,
            coordinator,
            poll,
        }
    }

    pub fn schedule(&self) -> &EventSchedule {
        &self.schedule
    }

    pub fn coordinator(&self) -> &AdhanCoordinator {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut AdhanCoordinator {
        &mut self.coordinator
    }

    /// Run one iteration and return the countdown line.
    pub fn tick(&mut self) -> String {
        let now = self.clock.now();

        if self.schedule.is_stale(now) {
            info!("New day {}, rebuilding schedule", now.date());
            self.schedule = load_schedule(self.source.as_ref(), now, &self.twelve_hour_slots);
        }

        self.coordinator.poll_cue(now);

        while let Some(event) = self.schedule.next_due_mut(now) {
            if self.coordinator.trigger(event) == TriggerOutcome::Ignored {
                // Never queue a second cue behind the one playing.
                event.fired = true;
                warn!("Skipping {}: an Adhan is already playing", event);
            }
        }

        if self.coordinator.resume_is_due(now) {
            self.coordinator.resume_due();
        }

        format_countdown(self.schedule.next_upcoming(now), now)
    }

    /// Tick until `shutdown` is set, then stop the cue.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!("Starting main loop. Waiting for prayer times...");
        while !shutdown.load(Ordering::Relaxed) {
            let line = self.tick();
            render(&line);
            std::thread::sleep(self.poll);
        }
        println!();
        self.coordinator.shutdown();
    }
}

fn load_schedule(
    source: &dyn TimesSource,
    now: NaiveDateTime,
    twelve_hour_slots: &[String],
) -> EventSchedule {
    let schedule = match source.times_for(now.date()) {
        Ok(raw) => EventSchedule::build(&raw, now, twelve_hour_slots),
        Err(e) => {
            warn!("No prayer times for {}: {}", now.date(), e);
            EventSchedule::empty(now.date())
        }
    };
    if schedule.is_empty() {
        info!("{}", NOTHING_SCHEDULED);
    }
    schedule
}

/// Countdown text for the next event; never negative.
pub fn format_countdown(next: Option<(&str, NaiveDateTime)>, now: NaiveDateTime) -> String {
    match next {
        Some((name, at)) => {
            let total = (at - now).num_seconds().max(0);
            format!(
                "Next Adhan ({}) in {:02}:{:02}:{:02}",
                name,
                total / 3600,
                (total % 3600) / 60,
                total % 60
            )
        }
        None => NOTHING_SCHEDULED.to_string(),
    }
}

/// Overwrite the console line in place. Output errors are ignored.
fn render(line: &str) {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "\r{:<width$}", line, width = LINE_WIDTH);
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FixedTimes;
    use crate::testing::{ManualClock, RecordingMusic, ScriptedPlayer};
    use chrono::{NaiveDate, TimeDelta};
    use std::path::PathBuf;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, s).unwrap()
    }

    fn ticker(clock: Arc<ManualClock>, pairs: &[&str]) -> Ticker {
        let coordinator = AdhanCoordinator::new(
            Arc::new(RecordingMusic::new()),
            Arc::new(ScriptedPlayer::new(1)),
            PathBuf::from("athan.mp3"),
            Duration::from_secs(900),
            Duration::from_millis(1),
        );
        let source = FixedTimes::from_pairs(pairs).unwrap();
        Ticker::new(
            clock,
            Box::new(source),
            vec!["sunset".into(), "maghrib".into()],
            coordinator,
            Duration::from_millis(1),
        )
    }

    #[test]
    fn countdown_formats_hours_minutes_seconds() {
        let line = format_countdown(Some(("fajir", at(5, 0, 0))), at(3, 58, 55));
        assert_eq!(line, "Next Adhan (fajir) in 01:01:05");
    }

    #[test]
    fn countdown_never_negative() {
        let line = format_countdown(Some(("fajir", at(5, 0, 0))), at(5, 0, 3));
        assert_eq!(line, "Next Adhan (fajir) in 00:00:00");
    }

    #[test]
    fn countdown_without_event() {
        assert_eq!(format_countdown(None, at(22, 0, 0)), NOTHING_SCHEDULED);
    }

    #[test]
    fn countdown_decreases_each_tick() {
        let clock = Arc::new(ManualClock::new(at(4, 0, 0)));
        let mut t = ticker(clock.clone(), &["fajir=05:00"]);
        assert_eq!(t.tick(), "Next Adhan (fajir) in 01:00:00");
        clock.advance(TimeDelta::seconds(1));
        assert_eq!(t.tick(), "Next Adhan (fajir) in 00:59:59");
    }

    #[test]
    fn past_only_day_shows_nothing_scheduled() {
        let clock = Arc::new(ManualClock::new(at(6, 0, 0)));
        let mut t = ticker(clock, &["fajir=05:00"]);
        assert!(t.schedule().is_empty());
        assert_eq!(t.tick(), NOTHING_SCHEDULED);
    }

    #[test]
    fn empty_source_is_not_fatal() {
        let clock = Arc::new(ManualClock::new(at(6, 0, 0)));
        let mut t = ticker(clock, &[]);
        assert_eq!(t.tick(), NOTHING_SCHEDULED);
    }

    #[test]
    fn day_rollover_rebuilds_schedule() {
        let clock = Arc::new(ManualClock::new(at(6, 0, 0)));
        let mut t = ticker(clock.clone(), &["fajir=05:00"]);
        assert!(t.schedule().is_empty());

        clock.set(day().succ_opt().unwrap().and_hms_opt(0, 0, 1).unwrap());
        let line = t.tick();
        assert_eq!(t.schedule().len(), 1);
        assert_eq!(t.schedule().date(), day().succ_opt().unwrap());
        assert_eq!(line, "Next Adhan (fajir) in 04:59:59");
    }

    #[test]
    fn simultaneous_due_events_fire_one_cue() {
        let clock = Arc::new(ManualClock::new(at(17, 0, 0)));
        let mut t = ticker(clock.clone(), &["sunset=06:10", "maghrib=06:10"]);
        assert_eq!(t.schedule().len(), 2);

        clock.set(at(18, 10, 0));
        t.tick();
        assert!(t.schedule().events().iter().all(|e| e.fired));
        assert_eq!(
            t.coordinator().state(),
            crate::coordinator::PlaybackState::PlayingCue
        );
        t.coordinator_mut().shutdown();
    }
}
