//! Ordered fan-out of playback events

use std::sync::{Mutex, MutexGuard};
use taleplay_core::PlaybackSnapshot;
use tokio::sync::mpsc;

/// Something observers of the engine need to hear about
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    /// Playback state changed or the poller ticked
    Snapshot(PlaybackSnapshot),
    /// The current chapter played to its end
    Ended(PlaybackSnapshot),
}

impl PlaybackEvent {
    pub fn snapshot(&self) -> &PlaybackSnapshot {
        match self {
            Self::Snapshot(snapshot) | Self::Ended(snapshot) => snapshot,
        }
    }
}

/// Delivers every event to every subscriber in publish order
///
/// Each subscriber has its own unbounded queue, so a slow consumer never
/// blocks the publisher or loses events. Closed subscribers are dropped on
/// the next publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PlaybackEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PlaybackEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: PlaybackEvent) {
        self.lock().retain(|tx| tx.send(event).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<PlaybackEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
