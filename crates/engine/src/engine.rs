//! The playback engine: single owner of "what is playing right now"
//!
//! Every command takes the engine lock for its whole duration, so commands
//! never interleave and snapshots are published in the order commands were
//! applied. Two background tasks share the engine through a `Weak` handle:
//! the position poller and the end-of-media listener. Both re-take the lock
//! before touching state and check a counter first, so a tick or an end
//! signal from a superseded transport is dropped.

use crate::control::{PlaybackControl, SnapshotSource};
use crate::error::{EngineError, EngineResult};
use crate::events::{EventBus, PlaybackEvent};
use crate::now_playing::{normalize_override, resolve_labels, NowPlayingSink};
use crate::transport::{EndSignal, Transport, TransportFactory};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::Duration;
use taleplay_core::{Chapter, PlaybackIdentity, PlaybackSnapshot, PlaybackSpeed};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Runs blocking transport work (file probing, thread joins) in place
///
/// On a multi-thread runtime the worker hands its other tasks off first.
/// A current-thread runtime has nowhere to hand them, so the work just runs.
fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(work),
        _ => work(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// How often a live transport's position is republished
    pub poll_interval: Duration,
    /// Speed used until the first `set_playback_speed`
    pub initial_speed: PlaybackSpeed,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            initial_speed: PlaybackSpeed::NORMAL,
        }
    }
}

struct EngineInner {
    transport: Option<Box<dyn Transport>>,
    chapter: Option<Chapter>,
    speed: PlaybackSpeed,
    /// Bumped whenever the transport is replaced or released
    epoch: u64,
    /// Bumped whenever the poller is cancelled or restarted
    poll_generation: u64,
    poller_cancel: Option<oneshot::Sender<()>>,
    book_title_override: Option<String>,
    chapter_title_override: Option<String>,
}

impl EngineInner {
    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.release();
        }
        self.epoch += 1;
    }

    fn cancel_poller(&mut self) {
        self.poll_generation += 1;
        if let Some(cancel) = self.poller_cancel.take() {
            let _ = cancel.send(());
        }
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        let identity = self
            .chapter
            .as_ref()
            .map(|c| PlaybackIdentity::new(c.book_id, c.id));

        match &self.transport {
            Some(transport) => {
                let duration = match transport.duration_secs() {
                    d if d > 0.0 => d,
                    _ => self.chapter.as_ref().map_or(0.0, |c| c.duration_secs),
                };
                PlaybackSnapshot::new(
                    identity,
                    transport.position_secs(),
                    duration,
                    self.speed,
                    transport.is_playing(),
                )
            }
            None => PlaybackSnapshot::new(identity, 0.0, 0.0, self.speed, false),
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.cancel_poller();
        if let Some(mut transport) = self.transport.take() {
            transport.release();
        }
    }
}

struct Shared {
    inner: Mutex<EngineInner>,
    factory: Arc<dyn TransportFactory>,
    now_playing: Arc<dyn NowPlayingSink>,
    events: EventBus,
    snapshots: watch::Sender<PlaybackSnapshot>,
    ended_tx: mpsc::UnboundedSender<u64>,
    config: EngineConfig,
}

impl Shared {
    /// Pushes the current state to every observer. Caller holds the lock.
    fn publish(&self, inner: &EngineInner) -> PlaybackSnapshot {
        let snapshot = inner.snapshot();
        self.snapshots.send_replace(snapshot);
        self.events.publish(PlaybackEvent::Snapshot(snapshot));

        if inner.chapter.is_some() {
            let (title, subtitle) = resolve_labels(
                inner.chapter.as_ref(),
                inner.book_title_override.as_deref(),
                inner.chapter_title_override.as_deref(),
            );
            self.now_playing.update_now_playing(&snapshot, &title, &subtitle);
        } else {
            self.now_playing.clear_now_playing();
        }

        snapshot
    }

    fn start_poller(self: &Arc<Self>, inner: &mut EngineInner) {
        inner.cancel_poller();
        let generation = inner.poll_generation;
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        inner.poller_cancel = Some(cancel_tx);

        let period = self.config.poll_interval;
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => break,
                    _ = ticker.tick() => {}
                }

                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let inner = shared.inner.lock().await;
                if inner.poll_generation != generation || inner.transport.is_none() {
                    break;
                }
                shared.publish(&inner);
            }
            log::trace!("Poller {} stopped", generation);
        });
    }

    async fn handle_end(&self, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if epoch != inner.epoch || inner.transport.is_none() {
            log::debug!("Ignoring end signal from superseded transport ({})", epoch);
            return;
        }

        inner.cancel_poller();
        let snapshot = self.publish(&inner);
        log::info!("Chapter finished at {:.1}s", snapshot.position_secs);
        self.events.publish(PlaybackEvent::Ended(snapshot));
    }
}

async fn listen_for_end(weak: Weak<Shared>, mut ended_rx: mpsc::UnboundedReceiver<u64>) {
    while let Some(epoch) = ended_rx.recv().await {
        let Some(shared) = weak.upgrade() else {
            break;
        };
        shared.handle_end(epoch).await;
    }
}

/// Serialized playback controller
///
/// Cheap to clone; clones share one engine. Must be created inside a tokio
/// runtime because it spawns its end-of-media listener immediately.
#[derive(Clone)]
pub struct PlaybackEngine {
    shared: Arc<Shared>,
}

impl PlaybackEngine {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        now_playing: Arc<dyn NowPlayingSink>,
        config: EngineConfig,
    ) -> Self {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(PlaybackSnapshot::empty(config.initial_speed));

        let shared = Arc::new(Shared {
            inner: Mutex::new(EngineInner {
                transport: None,
                chapter: None,
                speed: config.initial_speed,
                epoch: 0,
                poll_generation: 0,
                poller_cancel: None,
                book_title_override: None,
                chapter_title_override: None,
            }),
            factory,
            now_playing,
            events: EventBus::new(),
            snapshots,
            ended_tx,
            config,
        });

        tokio::spawn(listen_for_end(Arc::downgrade(&shared), ended_rx));

        Self { shared }
    }

    /// Replaces whatever is playing with `chapter`, starting at `start_secs`
    ///
    /// A missing media file fails with [`EngineError::NotFound`] and leaves
    /// the current playback untouched.
    pub async fn play(&self, chapter: Chapter, start_secs: f64) -> EngineResult<()> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        if !chapter.file_path.try_exists().unwrap_or(false) {
            return Err(EngineError::NotFound {
                path: chapter.file_path.clone(),
            });
        }

        inner.cancel_poller();
        run_blocking(|| inner.release_transport());
        inner.chapter = None;

        let signal = EndSignal::new(shared.ended_tx.clone(), inner.epoch);
        let mut transport = match run_blocking(|| shared.factory.open(&chapter.file_path, signal)) {
            Ok(transport) => transport,
            Err(e) => {
                shared.publish(&inner);
                return Err(e);
            }
        };

        if transport.can_set_speed() {
            if let Err(e) = transport.set_speed(inner.speed) {
                log::warn!("Could not apply {} to {}: {}", inner.speed, chapter.title, e);
            }
        }

        if start_secs > 0.0 {
            if let Err(e) = transport.seek(start_secs) {
                log::warn!("Could not resume {} at {:.1}s: {}", chapter.title, start_secs, e);
            }
        }

        if let Err(e) = transport.play() {
            transport.release();
            shared.publish(&inner);
            return Err(e);
        }

        log::info!("Playing '{}' from {:.1}s", chapter.title, start_secs.max(0.0));
        inner.transport = Some(transport);
        inner.chapter = Some(chapter);
        shared.start_poller(&mut inner);
        shared.publish(&inner);
        Ok(())
    }

    pub async fn pause(&self) -> EngineResult<()> {
        let mut inner = self.shared.inner.lock().await;
        let result = match inner.transport.as_mut() {
            Some(transport) => transport.pause(),
            None => Ok(()),
        };
        self.shared.publish(&inner);
        result
    }

    pub async fn resume(&self) -> EngineResult<()> {
        let mut inner = self.shared.inner.lock().await;
        let Some(transport) = inner.transport.as_mut() else {
            return Ok(());
        };

        let result = transport.play();
        self.shared.start_poller(&mut inner);
        self.shared.publish(&inner);
        result
    }

    /// Releases the transport and forgets the current chapter, keeping speed
    pub async fn stop(&self) -> EngineResult<()> {
        let mut inner = self.shared.inner.lock().await;
        inner.cancel_poller();
        run_blocking(|| inner.release_transport());
        inner.chapter = None;
        inner.book_title_override = None;
        inner.chapter_title_override = None;
        self.shared.publish(&inner);
        Ok(())
    }

    /// Seeks within the current chapter. Negative targets clamp to zero.
    pub async fn seek(&self, position_secs: f64) -> EngineResult<()> {
        if position_secs.is_nan() {
            return Err(EngineError::validation("position", "must be a number"));
        }

        let mut inner = self.shared.inner.lock().await;
        let Some(transport) = inner.transport.as_mut() else {
            return Ok(());
        };

        let result = transport.seek(position_secs.max(0.0));
        self.shared.publish(&inner);
        result
    }

    /// Moves by `delta_secs` relative to the current position, never below zero
    pub async fn skip_by(&self, delta_secs: f64) -> EngineResult<()> {
        if !delta_secs.is_finite() {
            return Err(EngineError::validation("delta", "must be finite"));
        }

        let mut inner = self.shared.inner.lock().await;
        let Some(transport) = inner.transport.as_mut() else {
            return Ok(());
        };

        let target = (transport.position_secs() + delta_secs).max(0.0);
        let result = transport.seek(target);
        self.shared.publish(&inner);
        result
    }

    /// Clamps `speed` into range and remembers it across chapters and stops
    pub async fn set_playback_speed(&self, speed: f32) -> EngineResult<()> {
        let speed = PlaybackSpeed::clamped(speed);
        let mut inner = self.shared.inner.lock().await;
        inner.speed = speed;

        if let Some(transport) = inner.transport.as_mut() {
            if transport.can_set_speed() {
                if let Err(e) = transport.set_speed(speed) {
                    log::warn!("Could not change speed to {}: {}", speed, e);
                }
            }
        }

        self.shared.publish(&inner);
        Ok(())
    }

    /// Sets display titles for the now-playing surface; blank clears
    pub async fn set_now_playing_metadata(&self, book_title: Option<&str>, chapter_title: Option<&str>) {
        let mut inner = self.shared.inner.lock().await;
        inner.book_title_override = normalize_override(book_title);
        inner.chapter_title_override = normalize_override(chapter_title);
        self.shared.publish(&inner);
    }

    pub fn current_snapshot(&self) -> PlaybackSnapshot {
        *self.shared.snapshots.borrow()
    }

    /// Latest-value view of the snapshot stream
    pub fn watch_snapshots(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Every snapshot and end-of-chapter event from now on, in order
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PlaybackEvent> {
        self.shared.events.subscribe()
    }

    pub async fn current_chapter(&self) -> Option<Chapter> {
        self.shared.inner.lock().await.chapter.clone()
    }

    pub async fn speed(&self) -> PlaybackSpeed {
        self.shared.inner.lock().await.speed
    }
}

impl SnapshotSource for PlaybackEngine {
    fn current_snapshot(&self) -> PlaybackSnapshot {
        PlaybackEngine::current_snapshot(self)
    }
}

#[async_trait]
impl PlaybackControl for PlaybackEngine {
    async fn pause(&self) -> EngineResult<()> {
        PlaybackEngine::pause(self).await
    }

    async fn resume(&self) -> EngineResult<()> {
        PlaybackEngine::resume(self).await
    }

    async fn seek(&self, position_secs: f64) -> EngineResult<()> {
        PlaybackEngine::seek(self, position_secs).await
    }

    async fn skip_by(&self, delta_secs: f64) -> EngineResult<()> {
        PlaybackEngine::skip_by(self, delta_secs).await
    }
}
