//! The seam between the engine and whatever actually makes sound
//!
//! The engine owns at most one [`Transport`] at a time. Transports are built
//! by a [`TransportFactory`] and report end of media through an
//! [`EndSignal`] tagged with the epoch of the `play` call that opened them,
//! so the engine can ignore a late signal from a transport it already
//! replaced.

use crate::error::{EngineError, EngineResult};
use crate::output::{AudioSink, ClockSink};
use crate::playback_thread::{PlaybackCommand, PlaybackThread};
use std::path::Path;
use taleplay_core::PlaybackSpeed;
use tokio::sync::mpsc;

/// A single opened media item
pub trait Transport: Send {
    fn play(&mut self) -> EngineResult<()>;

    fn pause(&mut self) -> EngineResult<()>;

    /// Seeks to `secs` from the start of the item
    fn seek(&mut self, secs: f64) -> EngineResult<()>;

    /// Whether [`Transport::set_speed`] is supported at all
    fn can_set_speed(&self) -> bool;

    fn set_speed(&mut self, speed: PlaybackSpeed) -> EngineResult<()>;

    fn position_secs(&self) -> f64;

    /// Length of the item, or zero when unknown
    fn duration_secs(&self) -> f64;

    fn is_playing(&self) -> bool;

    /// Stops output and frees the underlying resources. Idempotent.
    fn release(&mut self);
}

/// Opens transports for media files
pub trait TransportFactory: Send + Sync {
    fn open(&self, path: &Path, on_end: EndSignal) -> EngineResult<Box<dyn Transport>>;
}

/// One-shot notification that a transport reached the end of its media
#[derive(Debug, Clone)]
pub struct EndSignal {
    tx: mpsc::UnboundedSender<u64>,
    epoch: u64,
}

impl EndSignal {
    pub fn new(tx: mpsc::UnboundedSender<u64>, epoch: u64) -> Self {
        Self { tx, epoch }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn fire(&self) {
        // A closed receiver means the engine is gone; nothing to notify
        let _ = self.tx.send(self.epoch);
    }
}

/// Which sink a [`DecoderTransportFactory`] plays into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    /// Decode in real time without producing sound
    #[default]
    Silent,
    /// Play on the default audio device
    #[cfg(feature = "device-output")]
    Device,
}

/// Transport that decodes a local file on its own thread
pub struct DecoderTransport {
    thread: Option<PlaybackThread>,
    last_position: f64,
    duration: f64,
}

impl DecoderTransport {
    pub fn open(path: &Path, output: OutputKind, on_end: EndSignal) -> EngineResult<Self> {
        let sink: Box<dyn AudioSink> = match output {
            OutputKind::Silent => Box::new(ClockSink::new()),
            #[cfg(feature = "device-output")]
            OutputKind::Device => Box::new(crate::output::DeviceSink::new()),
        };

        let thread = PlaybackThread::start(path, sink, Box::new(move || on_end.fire()))?;
        let duration = thread.duration();

        Ok(Self {
            thread: Some(thread),
            last_position: 0.0,
            duration,
        })
    }

    fn thread(&self) -> EngineResult<&PlaybackThread> {
        self.thread
            .as_ref()
            .ok_or_else(|| EngineError::InvalidState("Transport was released".to_string()))
    }
}

impl Transport for DecoderTransport {
    fn play(&mut self) -> EngineResult<()> {
        self.thread()?.send_command(PlaybackCommand::Play)
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.thread()?.send_command(PlaybackCommand::Pause)
    }

    fn seek(&mut self, secs: f64) -> EngineResult<()> {
        self.thread()?.send_command(PlaybackCommand::Seek(secs))
    }

    fn can_set_speed(&self) -> bool {
        false
    }

    fn set_speed(&mut self, speed: PlaybackSpeed) -> EngineResult<()> {
        Err(EngineError::InvalidState(format!(
            "Decoder output cannot play at {}",
            speed
        )))
    }

    fn position_secs(&self) -> f64 {
        self.thread
            .as_ref()
            .map(PlaybackThread::position)
            .unwrap_or(self.last_position)
    }

    fn duration_secs(&self) -> f64 {
        self.duration
    }

    fn is_playing(&self) -> bool {
        self.thread.as_ref().is_some_and(PlaybackThread::is_playing)
    }

    fn release(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            self.last_position = thread.position();
            thread.stop();
        }
    }
}

impl Drop for DecoderTransport {
    fn drop(&mut self) {
        self.release();
    }
}

/// Factory for [`DecoderTransport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderTransportFactory {
    output: OutputKind,
}

impl DecoderTransportFactory {
    pub fn new(output: OutputKind) -> Self {
        Self { output }
    }
}

impl TransportFactory for DecoderTransportFactory {
    fn open(&self, path: &Path, on_end: EndSignal) -> EngineResult<Box<dyn Transport>> {
        Ok(Box::new(DecoderTransport::open(path, self.output, on_end)?))
    }
}
