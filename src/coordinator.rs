//! AdhanCoordinator: the cue-priority state machine.
//!
//! `trigger` asks the music worker to stop, then starts the cue on a
//! dedicated `adhan-cue` thread. The cue never plays before the worker has
//! confirmed the stop; a late confirmation is awaited on the cue thread. The ticker calls `poll_cue` each tick; when the cue
//! ends (or fails) a single `DeferredResume` is armed, and `resume_due`
//! consumes it and restarts the worker. All state here is touched only from
//! the ticker's thread.

use crate::error::{Error, Result};
use crate::player::{AudioPlayer, play_blocking};
use crate::schedule::PrayerEvent;
use crate::worker::{MusicControl, StopAck};
use chrono::{NaiveDateTime, TimeDelta};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CUE_THREAD: &str = "adhan-cue";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    PlayingMusic,
    PlayingCue,
    AwaitingResume,
}

/// Pending restart of background music.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredResume {
    pub fire_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A cue was already playing; nothing changed.
    Ignored,
}

/// How a cue ended, as observed by `poll_cue`.
#[derive(Debug)]
pub enum CueOutcome {
    Finished { resume: DeferredResume },
    Failed { error: Error, resume: DeferredResume },
}

pub struct AdhanCoordinator {
    state: PlaybackState,
    resume: Option<DeferredResume>,
    music: Arc<dyn MusicControl>,
    player: Arc<dyn AudioPlayer>,
    cue: PathBuf,
    resume_delay: TimeDelta,
    poll: Duration,
    cue_rx: Option<mpsc::Receiver<Result<()>>>,
    cue_thread: Option<JoinHandle<()>>,
    cue_cancel: Arc<AtomicBool>,
}

impl AdhanCoordinator {
    pub fn new(
        music: Arc<dyn MusicControl>,
        player: Arc<dyn AudioPlayer>,
        cue: PathBuf,
        resume_delay: Duration,
        poll: Duration,
    ) -> Self {
        AdhanCoordinator {
            state: PlaybackState::Idle,
            resume: None,
            music,
            player,
            cue,
            resume_delay: TimeDelta::from_std(resume_delay).unwrap_or_else(|_| TimeDelta::days(1)),
            poll,
            cue_rx: None,
            cue_thread: None,
            cue_cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn pending_resume(&self) -> Option<DeferredResume> {
        self.resume
    }

    /// Start background music from idle (process start).
    pub fn start_music(&mut self) {
        if self.state == PlaybackState::Idle {
            self.music.start();
            self.state = PlaybackState::PlayingMusic;
        }
    }

    /// Stop music and start the cue for `event`. A no-op while a cue plays.
    pub fn trigger(&mut self, event: &mut PrayerEvent) -> TriggerOutcome {
        if self.state == PlaybackState::PlayingCue {
            debug!("cue already playing, ignoring {}", event.name);
            return TriggerOutcome::Ignored;
        }

        event.fired = true;
        info!("Playing Adhan for {}", event.name);

        let pending = self.stop_music();
        // A new cue supersedes any resume armed by the previous one.
        self.resume = None;
        self.state = PlaybackState::PlayingCue;

        let (tx, rx) = mpsc::channel();
        let failed = tx.clone();
        let player = Arc::clone(&self.player);
        let cue = self.cue.clone();
        let poll = self.poll;
        let cancel = Arc::new(AtomicBool::new(false));
        self.cue_cancel = Arc::clone(&cancel);
        let spawned = std::thread::Builder::new()
            .name(CUE_THREAD.into())
            .spawn(move || {
                if let Some(ack) = pending {
                    if !await_stop(&ack, &cancel, poll) {
                        return;
                    }
                    info!("Music worker confirmed stop, starting Adhan");
                }
                let _ = tx.send(play_blocking(player.as_ref(), &cue, poll));
            });
        match spawned {
            Ok(handle) => self.cue_thread = Some(handle),
            Err(e) => {
                let _ = failed.send(Err(Error::Io(e)));
            }
        }
        self.cue_rx = Some(rx);
        TriggerOutcome::Started
    }

    /// Stop the worker. Returns the ack still to be awaited when the worker
    /// did not confirm within its timeout.
    fn stop_music(&self) -> Option<StopAck> {
        let ack = match self.music.request_stop() {
            Ok(ack) => ack,
            Err(e) => {
                warn!("{}; forcing the output silent", e);
                self.player.stop();
                return None;
            }
        };
        match ack.wait() {
            Ok(()) => None,
            Err(Error::StopTimeout(limit)) => {
                warn!(
                    "Music worker did not stop within {:?}; Adhan waits for it",
                    limit
                );
                self.player.stop();
                Some(ack)
            }
            Err(e) => {
                warn!("{}; forcing the output silent", e);
                self.player.stop();
                None
            }
        }
    }

    /// Check whether the cue has ended; if so, arm the resume at `now + delay`.
    pub fn poll_cue(&mut self, now: NaiveDateTime) -> Option<CueOutcome> {
        let result = match self.cue_rx.as_ref()?.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return None,
            Err(mpsc::TryRecvError::Disconnected) => Err(Error::WorkerUnavailable(CUE_THREAD)),
        };
        self.cue_rx = None;
        if let Some(handle) = self.cue_thread.take() {
            let _ = handle.join();
        }

        let resume = DeferredResume {
            fire_at: now
                .checked_add_signed(self.resume_delay)
                .unwrap_or(NaiveDateTime::MAX),
        };
        self.resume = Some(resume);
        let resume_at = resume.fire_at.format("%H:%M:%S");

        Some(match result {
            Ok(()) => {
                self.state = PlaybackState::AwaitingResume;
                info!("Adhan finished; music scheduled to resume at {}", resume_at);
                CueOutcome::Finished { resume }
            }
            Err(error) => {
                self.state = PlaybackState::Idle;
                error!("Failed to play adhan: {}; music will resume at {}", error, resume_at);
                CueOutcome::Failed { error, resume }
            }
        })
    }

    /// True when an armed resume has reached its time.
    pub fn resume_is_due(&self, now: NaiveDateTime) -> bool {
        self.resume.is_some_and(|r| now >= r.fire_at)
    }

    /// Consume the armed resume and restart background music.
    pub fn resume_due(&mut self) {
        if self.resume.take().is_none() {
            return;
        }
        self.state = PlaybackState::Idle;
        info!("Resuming background music");
        self.music.start();
        self.state = PlaybackState::PlayingMusic;
    }

    /// Silence the output and wait for a running cue thread to return.
    pub fn shutdown(&mut self) {
        self.cue_cancel.store(true, Ordering::Relaxed);
        self.player.stop();
        if let Some(handle) = self.cue_thread.take() {
            let _ = handle.join();
        }
        self.cue_rx = None;
    }
}

/// Block until the worker confirms its stop. False when cancelled first.
fn await_stop(ack: &StopAck, cancel: &AtomicBool, poll: Duration) -> bool {
    loop {
        if cancel.load(Ordering::Relaxed) {
            debug!("cue cancelled before the music worker stopped");
            return false;
        }
        match ack.wait_for(poll) {
            Ok(()) => return true,
            Err(Error::StopTimeout(_)) => {}
            Err(e) => {
                // Worker gone; it can no longer reach the output.
                debug!("{}", e);
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MusicCall, RecordingMusic, ScriptedPlayer};
    use chrono::NaiveDate;
    use std::time::Instant;

    const DELAY: Duration = Duration::from_secs(15 * 60);

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn event(name: &str) -> PrayerEvent {
        PrayerEvent {
            name: name.to_string(),
            time: at(5, 0, 0),
            fired: false,
        }
    }

    fn setup(music: RecordingMusic) -> (AdhanCoordinator, Arc<RecordingMusic>, Arc<ScriptedPlayer>) {
        let music = Arc::new(music);
        let player = Arc::new(ScriptedPlayer::new(2));
        let coord = AdhanCoordinator::new(
            music.clone(),
            player.clone(),
            PathBuf::from("athan.mp3"),
            DELAY,
            Duration::from_millis(1),
        );
        (coord, music, player)
    }

    fn wait_cue(coord: &mut AdhanCoordinator, now: NaiveDateTime) -> CueOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(outcome) = coord.poll_cue(now) {
                return outcome;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("cue never finished");
    }

    #[test]
    fn trigger_marks_fired_and_stops_music() {
        let (mut coord, music, player) = setup(RecordingMusic::new());
        let mut ev = event("fajir");
        assert_eq!(coord.trigger(&mut ev), TriggerOutcome::Started);
        assert!(ev.fired);
        assert_eq!(music.calls(), vec![MusicCall::Stop]);
        assert_eq!(coord.state(), PlaybackState::PlayingCue);

        wait_cue(&mut coord, at(5, 4, 0));
        assert_eq!(player.plays(), vec![PathBuf::from("athan.mp3")]);
    }

    #[test]
    fn finished_cue_arms_single_resume() {
        let (mut coord, music, _player) = setup(RecordingMusic::new());
        coord.trigger(&mut event("doher"));
        let outcome = wait_cue(&mut coord, at(12, 5, 0));

        let expected = DeferredResume {
            fire_at: at(12, 20, 0),
        };
        assert!(matches!(outcome, CueOutcome::Finished { resume } if resume == expected));
        assert_eq!(coord.state(), PlaybackState::AwaitingResume);
        assert_eq!(coord.pending_resume(), Some(expected));
        assert!(coord.poll_cue(at(12, 6, 0)).is_none());

        assert!(!coord.resume_is_due(at(12, 19, 59)));
        assert!(coord.resume_is_due(at(12, 20, 0)));
        coord.resume_due();
        coord.resume_due();
        assert_eq!(music.calls(), vec![MusicCall::Stop, MusicCall::Start]);
        assert_eq!(coord.state(), PlaybackState::PlayingMusic);
        assert!(coord.pending_resume().is_none());
        assert!(!coord.resume_is_due(at(23, 0, 0)));
    }

    #[test]
    fn trigger_while_cue_playing_is_ignored() {
        let (mut coord, music, player) = setup(RecordingMusic::new());
        player.hold();
        let mut first = event("sunset");
        let mut second = event("maghrib");

        assert_eq!(coord.trigger(&mut first), TriggerOutcome::Started);
        assert_eq!(coord.trigger(&mut second), TriggerOutcome::Ignored);
        assert!(!second.fired);
        assert_eq!(music.calls(), vec![MusicCall::Stop]);

        player.release();
        wait_cue(&mut coord, at(18, 30, 0));
        assert_eq!(player.plays().len(), 1);
    }

    #[test]
    fn missing_cue_still_arms_resume_and_returns_idle() {
        let (mut coord, music, player) = setup(RecordingMusic::new());
        player.fail_on("athan.mp3");
        coord.trigger(&mut event("fajir"));
        let outcome = wait_cue(&mut coord, at(5, 0, 1));

        let expected = DeferredResume {
            fire_at: at(5, 15, 1),
        };
        match outcome {
            CueOutcome::Failed { error, resume } => {
                assert!(matches!(error, Error::PlaybackFailure { .. }));
                assert_eq!(resume, expected);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(coord.state(), PlaybackState::Idle);
        assert_eq!(coord.pending_resume(), Some(expected));

        coord.resume_due();
        assert_eq!(music.calls(), vec![MusicCall::Stop, MusicCall::Start]);
    }

    #[test]
    fn cue_waits_for_a_late_stop_confirmation() {
        let (mut coord, music, player) = setup(RecordingMusic::unresponsive());
        assert_eq!(coord.trigger(&mut event("doher")), TriggerOutcome::Started);
        assert_eq!(coord.state(), PlaybackState::PlayingCue);

        std::thread::sleep(Duration::from_millis(20));
        assert!(player.plays().is_empty());
        assert!(coord.poll_cue(at(12, 0, 1)).is_none());

        music.confirm_stops();
        let outcome = wait_cue(&mut coord, at(12, 5, 0));
        assert!(matches!(outcome, CueOutcome::Finished { .. }));
        assert_eq!(player.plays(), vec![PathBuf::from("athan.mp3")]);
    }

    #[test]
    fn shutdown_abandons_a_cue_still_waiting_for_music() {
        let (mut coord, _music, player) = setup(RecordingMusic::unresponsive());
        coord.trigger(&mut event("doher"));
        coord.shutdown();
        assert!(player.plays().is_empty());
    }

    #[test]
    fn new_cue_replaces_pending_resume() {
        let (mut coord, music, _player) = setup(RecordingMusic::new());
        coord.trigger(&mut event("sunset"));
        wait_cue(&mut coord, at(18, 10, 0));
        assert!(coord.pending_resume().is_some());

        coord.trigger(&mut event("maghrib"));
        assert!(coord.pending_resume().is_none());
        wait_cue(&mut coord, at(18, 20, 0));
        assert_eq!(
            coord.pending_resume(),
            Some(DeferredResume {
                fire_at: at(18, 35, 0)
            })
        );
        assert!(!coord.resume_is_due(at(18, 25, 0)));
        assert_eq!(music.calls(), vec![MusicCall::Stop, MusicCall::Stop]);
    }

    #[test]
    fn start_music_only_from_idle() {
        let (mut coord, music, player) = setup(RecordingMusic::new());
        coord.start_music();
        coord.start_music();
        assert_eq!(coord.state(), PlaybackState::PlayingMusic);
        assert_eq!(music.calls(), vec![MusicCall::Start]);

        player.hold();
        coord.trigger(&mut event("fajir"));
        coord.start_music();
        assert_eq!(music.calls(), vec![MusicCall::Start, MusicCall::Stop]);
        player.release();
        coord.shutdown();
    }
}
