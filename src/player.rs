use crate::error::{Error, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// The single audio output shared by background music and the cue.
///
/// Implementations play at most one resource at a time: `play` replaces
/// whatever was sounding before.
pub trait AudioPlayer: Send + Sync {
    /// Load `path` and start playing it. Returns once playback has started.
    fn play(&self, path: &Path) -> Result<()>;

    /// True while the current resource is still producing sound.
    fn is_busy(&self) -> bool;

    /// Force-stop whatever is playing. Safe to call when idle.
    fn stop(&self);
}

/// Play `path` and block until it finishes, polling every `poll`.
pub fn play_blocking(player: &dyn AudioPlayer, path: &Path, poll: Duration) -> Result<()> {
    player.play(path)?;
    while player.is_busy() {
        std::thread::sleep(poll);
    }
    Ok(())
}

/// Runtime audio player wrapping rodio. Not `Send`, so the audio runtime thread owns it.
pub struct Player {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Option<Sink>,
}

impl Player {
    /// Initialize the default audio output.
    pub fn new() -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| Error::AudioOutput(format!("Failed to open audio output: {}", e)))?;
        Ok(Player {
            _stream: stream,
            stream_handle: handle,
            sink: None,
        })
    }

    /// Decode `path` and play it on a fresh sink, dropping the previous one.
    pub fn play_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| Error::playback(path, e.to_string()))?;
        let source = Decoder::new(BufReader::new(file))
            .map_err(|e| Error::playback(path, format!("cannot decode: {}", e)))?;
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| Error::playback(path, format!("cannot create sink: {}", e)))?;

        self.stop();
        sink.append(source);
        sink.play();
        self.sink = Some(sink);
        Ok(())
    }

    /// Stop playback and release the sink.
    pub fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    /// True when the sink still has queued audio.
    pub fn is_busy(&self) -> bool {
        self.sink.as_ref().is_some_and(|s| !s.empty())
    }
}
