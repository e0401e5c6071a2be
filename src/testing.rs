//! In-memory doubles for headless tests: a scripted audio output, a manual
//! clock and a recording music control. No audio device or wall-clock waits.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::player::AudioPlayer;
use crate::worker::{MusicControl, StopAck};
use chrono::{NaiveDateTime, TimeDelta};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, mpsc};
use std::time::Duration;

/// A call observed by `ScriptedPlayer`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    Play(PathBuf),
    Stop,
}

#[derive(Default)]
struct ScriptState {
    playing: Option<PathBuf>,
    remaining_polls: u32,
    held: bool,
    failing: HashSet<PathBuf>,
    calls: Vec<PlayerCall>,
    overlaps: usize,
}

/// Fake output where every resource lasts a fixed number of `is_busy` polls.
///
/// `hold` keeps the current resource sounding until `release`. Starting a
/// resource while another is still sounding is counted as an overlap.
pub struct ScriptedPlayer {
    polls_per_resource: u32,
    state: Mutex<ScriptState>,
}

impl ScriptedPlayer {
    pub fn new(polls_per_resource: u32) -> Self {
        ScriptedPlayer {
            polls_per_resource,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// Make every future `play(path)` fail.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.lock().failing.insert(path.into());
    }

    pub fn hold(&self) {
        self.lock().held = true;
    }

    pub fn release(&self) {
        self.lock().held = false;
    }

    /// Every successfully started resource, in order.
    pub fn plays(&self) -> Vec<PathBuf> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                PlayerCall::Play(p) => Some(p.clone()),
                PlayerCall::Stop => None,
            })
            .collect()
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.lock().calls.clone()
    }

    /// Number of times a resource started while another was still sounding.
    pub fn overlaps(&self) -> usize {
        self.lock().overlaps
    }

    /// Resource currently sounding, if any.
    pub fn sounding(&self) -> Option<PathBuf> {
        self.lock().playing.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AudioPlayer for ScriptedPlayer {
    fn play(&self, path: &Path) -> Result<()> {
        let mut st = self.lock();
        if st.failing.contains(path) {
            return Err(Error::playback(path, "scripted failure"));
        }
        if st.playing.is_some() {
            st.overlaps += 1;
        }
        st.playing = Some(path.to_path_buf());
        st.remaining_polls = self.polls_per_resource;
        st.calls.push(PlayerCall::Play(path.to_path_buf()));
        Ok(())
    }

    fn is_busy(&self) -> bool {
        let mut st = self.lock();
        if st.playing.is_none() {
            return false;
        }
        if st.held {
            return true;
        }
        if st.remaining_polls == 0 {
            st.playing = None;
            return false;
        }
        st.remaining_polls -= 1;
        true
    }

    fn stop(&self) {
        let mut st = self.lock();
        st.playing = None;
        st.calls.push(PlayerCall::Stop);
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A call observed by `RecordingMusic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicCall {
    Start,
    Stop,
}

/// Music control that records commands and can be told to hold back stop
/// confirmations until `confirm_stops`.
#[derive(Default)]
pub struct RecordingMusic {
    calls: Mutex<Vec<MusicCall>>,
    refuse_stop: bool,
    unconfirmed: Mutex<Vec<mpsc::Sender<()>>>,
}

impl RecordingMusic {
    pub fn new() -> Self {
        Self::default()
    }

    /// A control whose stops stay unconfirmed until `confirm_stops`.
    pub fn unresponsive() -> Self {
        RecordingMusic {
            refuse_stop: true,
            ..Self::default()
        }
    }

    /// Confirm every stop requested so far.
    pub fn confirm_stops(&self) {
        let pending: Vec<_> = self
            .unconfirmed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for reply in pending {
            let _ = reply.send(());
        }
    }

    pub fn calls(&self) -> Vec<MusicCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: MusicCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl MusicControl for RecordingMusic {
    fn start(&self) {
        self.record(MusicCall::Start);
    }

    fn request_stop(&self) -> Result<StopAck> {
        self.record(MusicCall::Stop);
        if !self.refuse_stop {
            return Ok(StopAck::confirmed());
        }
        let (reply, rx) = mpsc::channel();
        self.unconfirmed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(reply);
        Ok(StopAck::pending(rx, Duration::from_millis(1)))
    }
}
