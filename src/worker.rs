//! MusicWorker: one long-lived background thread that cycles the playlist.
//!
//! The thread owns the `Playlist` and is addressed only through `WorkerCmd`
//! messages. A stop is acknowledged only after the thread has silenced the
//! output; callers wait on the ack, bounded by the configured stop timeout.
//! The cursor only advances on natural completion, so an interrupted track
//! is replayed on the next `start`.

use crate::error::{Error, Result};
use crate::player::AudioPlayer;
use crate::playlist::Playlist;
use crate::track::Track;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

const THREAD_NAME: &str = "music-worker";

/// Start/stop contract the coordinator relies on.
pub trait MusicControl: Send + Sync {
    /// Begin (or continue) playback from the saved cursor. No-op when running.
    fn start(&self);

    /// Ask playback to stop. The returned ack resolves once no music is
    /// sounding and the worker will not touch the output again until `start`.
    fn request_stop(&self) -> Result<StopAck>;

    /// Stop playback and wait for the ack, bounded by its timeout.
    fn stop(&self) -> Result<()> {
        self.request_stop()?.wait()
    }
}

/// Pending confirmation of a stop request.
///
/// A timed-out `wait` leaves the ack usable: the confirmation may still
/// arrive later and can be waited on again.
#[derive(Debug)]
pub struct StopAck {
    rx: Option<mpsc::Receiver<()>>,
    timeout: Duration,
}

impl StopAck {
    /// An ack that is already confirmed.
    pub fn confirmed() -> Self {
        StopAck {
            rx: None,
            timeout: Duration::ZERO,
        }
    }

    /// An ack confirmed by a send on the paired sender.
    pub fn pending(rx: mpsc::Receiver<()>, timeout: Duration) -> Self {
        StopAck {
            rx: Some(rx),
            timeout,
        }
    }

    /// Wait up to the configured stop timeout.
    pub fn wait(&self) -> Result<()> {
        self.wait_for(self.timeout)
    }

    /// Wait up to `limit`. A worker that has exited counts as stopped for
    /// the output but is reported as unavailable.
    pub fn wait_for(&self, limit: Duration) -> Result<()> {
        let Some(rx) = &self.rx else {
            return Ok(());
        };
        match rx.recv_timeout(limit) {
            Ok(()) => Ok(()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::StopTimeout(limit)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(Error::WorkerUnavailable(THREAD_NAME))
            }
        }
    }
}

// ── Commands & Events ────────────────────────────────────────────────────────

enum WorkerCmd {
    Start,
    Stop { reply: mpsc::Sender<()> },
    Shutdown,
}

/// Lifecycle events emitted from the worker thread.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Started,
    TrackStarted { index: usize, path: PathBuf },
    TrackFinished { index: usize },
    TrackFailed { index: usize, error: String },
    Interrupted { index: usize },
    Stopped,
}

/// What the loop should do after handling a command.
enum Flow {
    Continue,
    Interrupted,
    Exit,
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Owning handle for the worker thread. Dropping it shuts the thread down.
pub struct MusicWorker {
    tx: mpsc::Sender<WorkerCmd>,
    stop_timeout: Duration,
    thread: Option<JoinHandle<()>>,
}

impl MusicWorker {
    /// Spawn the worker. It stays silent until the first `start`.
    ///
    /// `poll` bounds how long the thread waits between checks for track end,
    /// `on_event` is called from the worker thread on every lifecycle change.
    pub fn spawn<F>(
        player: Arc<dyn AudioPlayer>,
        playlist: Playlist,
        poll: Duration,
        stop_timeout: Duration,
        on_event: F,
    ) -> Result<Self>
    where
        F: Fn(WorkerEvent) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<WorkerCmd>();
        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || worker_loop(rx, player, playlist, poll, on_event))?;

        Ok(MusicWorker {
            tx,
            stop_timeout,
            thread: Some(thread),
        })
    }

    /// Stop playback and join the thread.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(WorkerCmd::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("music worker panicked");
            }
        }
    }
}

impl MusicControl for MusicWorker {
    fn start(&self) {
        if self.tx.send(WorkerCmd::Start).is_err() {
            warn!("{}", Error::WorkerUnavailable(THREAD_NAME));
        }
    }

    fn request_stop(&self) -> Result<StopAck> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(WorkerCmd::Stop { reply })
            .map_err(|_| Error::WorkerUnavailable(THREAD_NAME))?;
        Ok(StopAck::pending(rx, self.stop_timeout))
    }
}

impl Drop for MusicWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Worker thread ────────────────────────────────────────────────────────────

fn worker_loop<F>(
    rx: mpsc::Receiver<WorkerCmd>,
    player: Arc<dyn AudioPlayer>,
    mut playlist: Playlist,
    poll: Duration,
    on_event: F,
) where
    F: Fn(WorkerEvent),
{
    let mut running = false;

    'outer: loop {
        if !running {
            match rx.recv() {
                Ok(WorkerCmd::Start) => {
                    running = true;
                    if playlist.is_empty() {
                        warn!("{}, background music stays silent", Error::EmptyPlaylist);
                    } else {
                        info!("Starting background music at track {}", playlist.cursor() + 1);
                    }
                    on_event(WorkerEvent::Started);
                }
                Ok(WorkerCmd::Stop { reply }) => {
                    let _ = reply.send(());
                }
                Ok(WorkerCmd::Shutdown) | Err(_) => break,
            }
            continue;
        }

        let Some(path) = playlist.current().map(|p| p.to_path_buf()) else {
            // Empty playlist: sleep-poll for commands.
            match rx.recv_timeout(poll) {
                Ok(cmd) => match handle_cmd(cmd, &mut running, player.as_ref(), &on_event) {
                    Flow::Exit => break,
                    Flow::Continue | Flow::Interrupted => continue,
                },
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        };
        let index = playlist.cursor();

        if let Err(e) = player.play(&path) {
            warn!("Skipping track {}: {}", index + 1, e);
            on_event(WorkerEvent::TrackFailed {
                index,
                error: e.to_string(),
            });
            playlist.advance();
            // Back off one poll so a folder of unplayable files does not spin.
            match rx.recv_timeout(poll) {
                Ok(cmd) => {
                    if let Flow::Exit = handle_cmd(cmd, &mut running, player.as_ref(), &on_event) {
                        break;
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            continue;
        }

        info!(
            "Now playing [{}/{}]: {}",
            index + 1,
            playlist.len(),
            Track::probe(&path)
        );
        on_event(WorkerEvent::TrackStarted { index, path });

        loop {
            match rx.recv_timeout(poll) {
                Ok(cmd) => match handle_cmd(cmd, &mut running, player.as_ref(), &on_event) {
                    Flow::Continue => {}
                    Flow::Interrupted => {
                        debug!("track {} interrupted, cursor kept", index + 1);
                        on_event(WorkerEvent::Interrupted { index });
                        break;
                    }
                    Flow::Exit => break 'outer,
                },
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if !player.is_busy() {
                        on_event(WorkerEvent::TrackFinished { index });
                        playlist.advance();
                        break;
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    player.stop();
                    break 'outer;
                }
            }
        }
    }
    debug!("music worker exited");
}

/// Apply a command received while running.
fn handle_cmd<F>(
    cmd: WorkerCmd,
    running: &mut bool,
    player: &dyn AudioPlayer,
    on_event: &F,
) -> Flow
where
    F: Fn(WorkerEvent),
{
    match cmd {
        WorkerCmd::Start => Flow::Continue,
        WorkerCmd::Stop { reply } => {
            player.stop();
            *running = false;
            info!("Background music stopped");
            on_event(WorkerEvent::Stopped);
            let _ = reply.send(());
            Flow::Interrupted
        }
        WorkerCmd::Shutdown => {
            player.stop();
            Flow::Exit
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
