//! Taleplay engine: playback coordination for audiobooks
//!
//! [`PlaybackEngine`] owns the live transport and publishes snapshots,
//! [`ProgressTracker`] turns snapshots into durable progress,
//! [`SleepTimer`] pauses playback on a schedule and
//! [`RemoteControlBridge`] maps external transport buttons onto the engine.

mod control;
mod decoder;
mod engine;
mod error;
mod events;
mod now_playing;
mod output;
pub(crate) mod playback_thread;
mod remote;
mod sleep_timer;
mod tracker;
mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use control::{PlaybackControl, ProgressFlush, SnapshotSource};
pub use decoder::{probe_duration, AudioDecoder, DecodedAudio};
pub use engine::{EngineConfig, PlaybackEngine, DEFAULT_POLL_INTERVAL};
pub use error::{EngineError, EngineResult};
pub use events::{EventBus, PlaybackEvent};
pub use now_playing::{resolve_labels, LoggingNowPlaying, NoOpNowPlaying, NowPlayingSink};
#[cfg(feature = "device-output")]
pub use output::DeviceSink;
pub use output::{AudioSink, ClockSink};
pub use remote::{RemoteCommand, RemoteControlBridge};
pub use sleep_timer::SleepTimer;
pub use tracker::{ProgressTracker, TrackerConfig, DEFAULT_AUTOSAVE_THRESHOLD_SECS};
pub use transport::{
    DecoderTransport, DecoderTransportFactory, EndSignal, OutputKind, Transport, TransportFactory,
};
pub use taleplay_core::{PlaybackSnapshot, PlaybackSpeed, SleepTimerMode, SleepTimerState};
