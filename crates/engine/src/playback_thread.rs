use crate::decoder::AudioDecoder;
use crate::error::{EngineError, EngineResult};
use crate::output::AudioSink;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

const IDLE_WAIT: StdDuration = StdDuration::from_millis(50);

/// Commands sent to the playback thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Seek(f64),
    Stop,
}

/// State shared between the handle and the thread
struct Shared {
    running: AtomicBool,
    playing: AtomicBool,
    position: AtomicU64,
}

impl Shared {
    fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Relaxed))
    }

    fn set_position(&self, secs: f64) {
        self.position.store(secs.to_bits(), Ordering::Relaxed);
    }
}

/// Handle to a thread that decodes one file into a sink
///
/// The thread starts paused at zero. `on_end` runs at most once per pass to
/// the end of the stream; seeking back re-arms it.
pub struct PlaybackThread {
    handle: Option<thread::JoinHandle<()>>,
    command_tx: Sender<PlaybackCommand>,
    shared: Arc<Shared>,
    duration_secs: f64,
}

impl PlaybackThread {
    pub fn start(
        path: &Path,
        sink: Box<dyn AudioSink>,
        on_end: Box<dyn FnMut() + Send>,
    ) -> EngineResult<Self> {
        // Open on the caller's thread so a bad file fails the call itself
        let decoder = AudioDecoder::new(path)?;
        let duration_secs = decoder.duration_secs();

        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            playing: AtomicBool::new(false),
            position: AtomicU64::new(0f64.to_bits()),
        });
        let (command_tx, command_rx) = bounded(16);

        let thread_shared = Arc::clone(&shared);
        let name = format!(
            "taleplay-playback-{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("audio")
        );
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || playback_loop(decoder, sink, on_end, command_rx, thread_shared))
            .map_err(EngineError::Io)?;

        Ok(Self {
            handle: Some(handle),
            command_tx,
            shared,
            duration_secs,
        })
    }

    pub fn send_command(&self, cmd: PlaybackCommand) -> EngineResult<()> {
        match cmd {
            PlaybackCommand::Play => self.shared.playing.store(true, Ordering::Relaxed),
            PlaybackCommand::Pause => self.shared.playing.store(false, Ordering::Relaxed),
            PlaybackCommand::Seek(secs) => self.shared.set_position(self.clamp(secs)),
            PlaybackCommand::Stop => {}
        }

        self.command_tx
            .send(cmd)
            .map_err(|e| EngineError::InvalidState(format!("Playback thread is gone: {}", e)))
    }

    pub fn position(&self) -> f64 {
        self.shared.position()
    }

    pub fn duration(&self) -> f64 {
        self.duration_secs
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Stops the thread and waits for it to exit
    pub fn stop(&mut self) {
        self.shared.playing.store(false, Ordering::Relaxed);
        self.shared.running.store(false, Ordering::Relaxed);
        let _ = self.command_tx.try_send(PlaybackCommand::Stop);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Playback thread panicked");
            }
        }
    }

    fn clamp(&self, secs: f64) -> f64 {
        let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
        if self.duration_secs > 0.0 {
            secs.min(self.duration_secs)
        } else {
            secs
        }
    }
}

impl Drop for PlaybackThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn playback_loop(
    mut decoder: AudioDecoder,
    mut sink: Box<dyn AudioSink>,
    mut on_end: Box<dyn FnMut() + Send>,
    command_rx: Receiver<PlaybackCommand>,
    shared: Arc<Shared>,
) {
    let duration = decoder.duration_secs();
    let mut position = 0.0_f64;
    let mut ended = false;

    while shared.running.load(Ordering::Relaxed) {
        let command = if shared.playing.load(Ordering::Relaxed) {
            match command_rx.try_recv() {
                Ok(cmd) => Some(cmd),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match command_rx.recv_timeout(IDLE_WAIT) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };

        match command {
            Some(PlaybackCommand::Stop) => break,
            Some(PlaybackCommand::Seek(target)) => {
                let target = if duration > 0.0 { target.min(duration) } else { target };
                sink.flush();
                match decoder.seek(target) {
                    Ok(reached) => {
                        position = reached;
                        ended = false;
                    }
                    Err(e) => log::warn!("{}", e),
                }
                shared.set_position(position);
            }
            Some(PlaybackCommand::Play) | Some(PlaybackCommand::Pause) | None => {}
        }

        if !shared.playing.load(Ordering::Relaxed) || ended {
            if ended {
                shared.playing.store(false, Ordering::Relaxed);
            }
            continue;
        }

        match decoder.decode_next() {
            Ok(Some(chunk)) => {
                position += chunk.duration_secs();
                shared.set_position(position);

                let rate = chunk.spec.rate;
                let channels = chunk.spec.channels.count() as u16;
                if let Err(e) = sink.write(chunk.samples, rate, channels) {
                    log::error!("Audio output failed: {}", e);
                    shared.playing.store(false, Ordering::Relaxed);
                }
            }
            Ok(None) => {
                if duration > 0.0 {
                    position = duration;
                }
                shared.set_position(position);
                shared.playing.store(false, Ordering::Relaxed);
                ended = true;
                log::debug!("Reached end of stream at {:.1}s", position);
                on_end();
            }
            Err(e) => {
                log::error!("Playback stopped: {}", e);
                shared.playing.store(false, Ordering::Relaxed);
            }
        }
    }

    shared.running.store(false, Ordering::Relaxed);
    shared.playing.store(false, Ordering::Relaxed);
}
