//! AudioRuntime: dedicated audio thread with channel-based command dispatch.
//!
//! Owns the rodio `Player` on a single thread (no Send/Sync needed). The music
//! worker and the cue thread talk to it through `AudioHandle`, which wraps an
//! `mpsc::Sender<AudioCmd>` and is naturally Send+Sync. Every command carries a
//! reply channel so callers observe the outcome synchronously.

use crate::error::{Error, Result};
use crate::player::{AudioPlayer, Player};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, warn};

const THREAD_NAME: &str = "audio-runtime";

// ── Commands ─────────────────────────────────────────────────────────────────

/// Commands sent to the audio thread.
enum AudioCmd {
    Play {
        path: PathBuf,
        reply: mpsc::Sender<Result<()>>,
    },
    Stop {
        reply: mpsc::Sender<()>,
    },
    IsBusy {
        reply: mpsc::Sender<bool>,
    },
    Shutdown,
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Thread-safe handle for the audio runtime.
#[derive(Clone)]
pub struct AudioHandle {
    tx: mpsc::Sender<AudioCmd>,
}

impl AudioHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(AudioCmd::Shutdown);
    }
}

impl AudioPlayer for AudioHandle {
    fn play(&self, path: &Path) -> Result<()> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(AudioCmd::Play {
                path: path.to_path_buf(),
                reply,
            })
            .map_err(|_| Error::WorkerUnavailable(THREAD_NAME))?;
        rx.recv().map_err(|_| Error::WorkerUnavailable(THREAD_NAME))?
    }

    fn is_busy(&self) -> bool {
        let (reply, rx) = mpsc::channel();
        if self.tx.send(AudioCmd::IsBusy { reply }).is_err() {
            return false;
        }
        rx.recv().unwrap_or(false)
    }

    fn stop(&self) {
        let (reply, rx) = mpsc::channel();
        if self.tx.send(AudioCmd::Stop { reply }).is_ok() {
            let _ = rx.recv();
        }
    }
}

// ── Runtime ──────────────────────────────────────────────────────────────────

/// Spawn the audio runtime on a dedicated thread.
///
/// The output device is opened lazily on the first `play`, so a machine
/// without audio still runs; every play then reports `AudioOutput`.
pub fn spawn_audio_runtime() -> Result<AudioHandle> {
    let (tx, rx) = mpsc::channel::<AudioCmd>();

    std::thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || audio_thread_loop(rx))?;

    Ok(AudioHandle { tx })
}

/// Main loop for the audio thread. Owns the Player.
fn audio_thread_loop(rx: mpsc::Receiver<AudioCmd>) {
    let mut player: Option<Player> = None;

    // Exits when Shutdown arrives or every handle has been dropped.
    for cmd in rx {
        match cmd {
            AudioCmd::Play { path, reply } => {
                if player.is_none() {
                    match Player::new() {
                        Ok(p) => player = Some(p),
                        Err(e) => {
                            warn!("{}", e);
                            let _ = reply.send(Err(e));
                            continue;
                        }
                    }
                }
                let result = match player.as_mut() {
                    Some(p) => p.play_file(&path),
                    None => Err(Error::AudioOutput("no output device".into())),
                };
                if result.is_ok() {
                    debug!(path = %path.display(), "audio started");
                }
                let _ = reply.send(result);
            }

            AudioCmd::Stop { reply } => {
                if let Some(p) = player.as_mut() {
                    p.stop();
                }
                let _ = reply.send(());
            }

            AudioCmd::IsBusy { reply } => {
                let busy = player.as_ref().is_some_and(Player::is_busy);
                let _ = reply.send(busy);
            }

            AudioCmd::Shutdown => {
                if let Some(p) = player.as_mut() {
                    p.stop();
                }
                break;
            }
        }
    }
    debug!("audio runtime exited");
}

// ── Tests ────────────────────────────────────────────────────────────────────
