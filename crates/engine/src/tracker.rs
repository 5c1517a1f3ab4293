//! Autosave policy for listening progress
//!
//! Snapshots arrive several times a second; the tracker turns them into a
//! handful of durable writes. A write happens when the chapter changes, when
//! the position has moved far enough since the last write, on every pause
//! and at the end of a chapter.

use crate::control::{ProgressFlush, SnapshotSource};
use crate::engine::PlaybackEngine;
use crate::error::EngineResult;
use crate::events::PlaybackEvent;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use taleplay_core::{BookId, ChapterId, PersistenceStore, PlaybackIdentity, PlaybackSnapshot, ProgressRecord};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_AUTOSAVE_THRESHOLD_SECS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Minimum forward movement between two autosaves of one chapter
    pub autosave_threshold_secs: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            autosave_threshold_secs: DEFAULT_AUTOSAVE_THRESHOLD_SECS,
        }
    }
}

#[derive(Default)]
struct SaveState {
    last_saved: Option<PlaybackSnapshot>,
    /// Position of each chapter within its book, by ordinal
    index_cache: HashMap<BookId, HashMap<ChapterId, u32>>,
    /// Chapters still missing after a reload; cleared by `invalidate_book`
    unknown: HashSet<PlaybackIdentity>,
}

struct TrackerInner {
    store: Arc<dyn PersistenceStore>,
    source: Arc<dyn SnapshotSource>,
    config: TrackerConfig,
    // Lock order: `observed` before `saves`
    observed: Mutex<Option<PlaybackSnapshot>>,
    saves: Mutex<SaveState>,
}

#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

impl ProgressTracker {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        source: Arc<dyn SnapshotSource>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                store,
                source,
                config,
                observed: Mutex::new(None),
                saves: Mutex::new(SaveState::default()),
            }),
        }
    }

    /// Feeds every event from `engine` into the tracker on a background task
    pub fn attach(&self, engine: &PlaybackEngine) -> JoinHandle<()> {
        let mut events = engine.subscribe();
        let tracker = self.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let result = match event {
                    PlaybackEvent::Snapshot(snapshot) => tracker.handle_snapshot(snapshot).await,
                    PlaybackEvent::Ended(snapshot) => tracker.handle_playback_ended(snapshot).await,
                };
                if let Err(e) = result {
                    log::warn!("Failed to save progress: {}", e);
                }
            }
            log::debug!("Progress tracker detached");
        })
    }

    /// Applies the autosave policy to one snapshot
    pub async fn handle_snapshot(&self, current: PlaybackSnapshot) -> EngineResult<()> {
        let mut observed = self.inner.observed.lock().await;
        let previous = observed.replace(current);

        if let Some(previous) = previous {
            if previous.has_identity() && previous.identity_differs(&current) {
                // Keep the last position of the chapter being left
                if let Err(e) = self.flush_snapshot(&previous).await {
                    log::warn!("Failed to save progress for the previous chapter: {}", e);
                }
            }
        }

        if !current.has_identity() {
            return Ok(());
        }

        if self.is_autosave_due(&current).await {
            self.flush_snapshot(&current).await?;
        } else if previous.is_some_and(|p| p.is_playing) && !current.is_playing {
            log::debug!("Pause at {:.1}s, saving", current.position_secs);
            self.flush_snapshot(&current).await?;
        }

        Ok(())
    }

    /// Saves the final position of a chapter that played to its end
    pub async fn handle_playback_ended(&self, snapshot: PlaybackSnapshot) -> EngineResult<()> {
        let _observed = self.inner.observed.lock().await;
        self.flush_snapshot(&snapshot).await.map(|_| ())
    }

    /// Saves the engine's current position regardless of thresholds
    pub async fn flush(&self) -> EngineResult<()> {
        let snapshot = self.inner.source.current_snapshot();
        self.flush_snapshot(&snapshot).await.map(|_| ())
    }

    /// Forgets the cached chapter order of `book_id`
    pub async fn invalidate_book(&self, book_id: BookId) {
        let mut saves = self.inner.saves.lock().await;
        saves.index_cache.remove(&book_id);
        saves.unknown.retain(|identity| identity.book_id != book_id);
    }

    pub async fn last_saved(&self) -> Option<PlaybackSnapshot> {
        self.inner.saves.lock().await.last_saved
    }

    async fn is_autosave_due(&self, current: &PlaybackSnapshot) -> bool {
        let saves = self.inner.saves.lock().await;
        match &saves.last_saved {
            None => true,
            Some(last) => {
                last.identity_differs(current)
                    || current.position_secs - last.position_secs
                        >= self.inner.config.autosave_threshold_secs
            }
        }
    }

    /// Writes `snapshot` if its chapter is known. Returns whether it wrote.
    async fn flush_snapshot(&self, snapshot: &PlaybackSnapshot) -> EngineResult<bool> {
        let Some(identity) = snapshot.identity else {
            return Ok(false);
        };

        let mut saves = self.inner.saves.lock().await;
        let Some(chapter_index) = self.resolve_index(&mut saves, identity).await? else {
            log::debug!(
                "Chapter {} is not part of book {}, skipping save",
                identity.chapter_id,
                identity.book_id
            );
            return Ok(false);
        };

        let record = ProgressRecord::new(
            identity.book_id,
            identity.chapter_id,
            chapter_index,
            snapshot.position_secs.max(0.0),
        );
        self.inner.store.save_progress(&record).await?;
        log::debug!(
            "Saved chapter {} at {:.1}s",
            chapter_index + 1,
            record.position_secs
        );

        saves.last_saved = Some(*snapshot);
        Ok(true)
    }

    async fn resolve_index(
        &self,
        saves: &mut SaveState,
        identity: PlaybackIdentity,
    ) -> EngineResult<Option<u32>> {
        if let Some(index) = saves
            .index_cache
            .get(&identity.book_id)
            .and_then(|chapters| chapters.get(&identity.chapter_id))
        {
            return Ok(Some(*index));
        }

        if saves.unknown.contains(&identity) {
            return Ok(None);
        }

        // First use of this book, or a chapter added since the cache was built
        let mut chapters = self.inner.store.get_chapters(identity.book_id).await?;
        chapters.sort_by_key(|c| c.ordinal);
        let indices: HashMap<ChapterId, u32> = chapters
            .iter()
            .enumerate()
            .map(|(index, chapter)| (chapter.id, index as u32))
            .collect();

        let index = indices.get(&identity.chapter_id).copied();
        saves.index_cache.insert(identity.book_id, indices);
        if index.is_none() {
            saves.unknown.insert(identity);
        }
        Ok(index)
    }
}

#[async_trait]
impl ProgressFlush for ProgressTracker {
    async fn flush(&self) -> EngineResult<()> {
        ProgressTracker::flush(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FixedSource, MemoryStore};
    use taleplay_core::{Chapter, PlaybackSpeed};

    struct Setup {
        tracker: ProgressTracker,
        store: Arc<MemoryStore>,
        source: Arc<FixedSource>,
        chapters: Vec<Chapter>,
    }

    fn setup() -> Setup {
        let book_id = BookId::new();
        // Stored out of order; indices follow ordinal
        let chapters = vec![
            Chapter::new(book_id, "Two", 20, "/b/2.mp3"),
            Chapter::new(book_id, "One", 10, "/b/1.mp3"),
            Chapter::new(book_id, "Three", 30, "/b/3.mp3"),
        ];
        let store = Arc::new(MemoryStore::with_chapters(&chapters));
        let source = Arc::new(FixedSource::new(PlaybackSnapshot::default()));
        let tracker = ProgressTracker::new(store.clone(), source.clone(), TrackerConfig::default());
        Setup {
            tracker,
            store,
            source,
            chapters,
        }
    }

    fn snap(chapter: &Chapter, position: f64, playing: bool) -> PlaybackSnapshot {
        PlaybackSnapshot::new(
            Some(PlaybackIdentity::new(chapter.book_id, chapter.id)),
            position,
            600.0,
            PlaybackSpeed::NORMAL,
            playing,
        )
    }

    #[tokio::test]
    async fn test_first_snapshot_is_saved() {
        let s = setup();
        s.tracker.handle_snapshot(snap(&s.chapters[1], 0.0, true)).await.unwrap();

        let saved = s.store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].chapter_index, 0);
    }

    #[tokio::test]
    async fn test_threshold_gates_autosave() {
        let s = setup();
        let c = &s.chapters[0];
        s.tracker.handle_snapshot(snap(c, 0.0, true)).await.unwrap();
        s.tracker.handle_snapshot(snap(c, 4.9, true)).await.unwrap();
        assert_eq!(s.store.saved().len(), 1);

        s.tracker.handle_snapshot(snap(c, 5.0, true)).await.unwrap();
        assert_eq!(s.store.saved().len(), 2);
        assert_eq!(s.store.saved()[1].position_secs, 5.0);
    }

    #[tokio::test]
    async fn test_at_most_once_per_window() {
        let s = setup();
        let c = &s.chapters[0];

        // 20 seconds of ticks every half second
        for tick in 0..=40 {
            s.tracker
                .handle_snapshot(snap(c, tick as f64 * 0.5, true))
                .await
                .unwrap();
        }

        let positions: Vec<_> = s.store.saved().iter().map(|r| r.position_secs).collect();
        assert_eq!(positions, vec![0.0, 5.0, 10.0, 15.0, 20.0]);
    }

    #[tokio::test]
    async fn test_pause_always_flushes() {
        let s = setup();
        let c = &s.chapters[0];
        s.tracker.handle_snapshot(snap(c, 0.0, true)).await.unwrap();
        s.tracker.handle_snapshot(snap(c, 2.0, true)).await.unwrap();
        s.tracker.handle_snapshot(snap(c, 2.1, false)).await.unwrap();

        let saved = s.store.saved();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].position_secs, 2.1);

        // Staying paused does not write again
        s.tracker.handle_snapshot(snap(c, 2.1, false)).await.unwrap();
        assert_eq!(s.store.saved().len(), 2);
    }

    #[tokio::test]
    async fn test_chapter_change_flushes_previous_first() {
        let s = setup();
        let first = &s.chapters[1];
        let second = &s.chapters[0];
        s.tracker.handle_snapshot(snap(first, 0.0, true)).await.unwrap();
        s.tracker.handle_snapshot(snap(first, 3.0, true)).await.unwrap();

        s.tracker.handle_snapshot(snap(second, 0.0, true)).await.unwrap();

        let saved: Vec<_> = s
            .store
            .saved()
            .iter()
            .map(|r| (r.chapter_index, r.position_secs))
            .collect();
        assert_eq!(saved, vec![(0, 0.0), (0, 3.0), (1, 0.0)]);
    }

    #[tokio::test]
    async fn test_stop_flushes_last_chapter() {
        let s = setup();
        let c = &s.chapters[2];
        s.tracker.handle_snapshot(snap(c, 0.0, true)).await.unwrap();
        s.tracker.handle_snapshot(snap(c, 4.0, true)).await.unwrap();

        s.tracker
            .handle_snapshot(PlaybackSnapshot::empty(PlaybackSpeed::NORMAL))
            .await
            .unwrap();

        let last = s.store.saved().last().cloned().unwrap();
        assert_eq!((last.chapter_index, last.position_secs), (2, 4.0));
    }

    #[tokio::test]
    async fn test_ended_always_flushes() {
        let s = setup();
        let c = &s.chapters[0];
        s.tracker.handle_snapshot(snap(c, 598.0, true)).await.unwrap();

        s.tracker.handle_playback_ended(snap(c, 600.0, false)).await.unwrap();

        assert_eq!(s.store.saved().last().unwrap().position_secs, 600.0);
    }

    #[tokio::test]
    async fn test_unknown_chapter_is_skipped() {
        let s = setup();
        let stranger = Chapter::new(s.chapters[0].book_id, "Ghost", 99, "/b/ghost.mp3");

        for position in [0.0, 10.0, 20.0] {
            s.tracker
                .handle_snapshot(snap(&stranger, position, true))
                .await
                .unwrap();
        }

        assert!(s.store.saved().is_empty());
        assert!(s.tracker.last_saved().await.is_none());
        // One load for the book, no reload per snapshot
        assert_eq!(s.store.chapter_reads(), 1);
    }

    #[tokio::test]
    async fn test_chapter_order_is_cached() {
        let s = setup();
        for (i, chapter) in s.chapters.iter().enumerate() {
            s.tracker
                .handle_snapshot(snap(chapter, i as f64, true))
                .await
                .unwrap();
        }

        assert_eq!(s.store.saved().len(), 3);
        assert_eq!(s.store.chapter_reads(), 1);
    }

    #[tokio::test]
    async fn test_new_chapter_in_cached_book_reloads_once() {
        let s = setup();
        s.tracker.handle_snapshot(snap(&s.chapters[0], 0.0, true)).await.unwrap();

        let added = Chapter::new(s.chapters[0].book_id, "Epilogue", 40, "/b/4.mp3");
        s.store.add_chapter(added.clone());
        s.tracker.handle_snapshot(snap(&added, 0.0, true)).await.unwrap();

        assert_eq!(s.store.chapter_reads(), 2);
        assert_eq!(s.store.saved().last().unwrap().chapter_index, 3);
    }

    #[tokio::test]
    async fn test_invalidate_book_rereads_order() {
        let s = setup();
        let c = &s.chapters[0];
        s.tracker.flush_snapshot(&snap(c, 1.0, true)).await.unwrap();

        s.tracker.invalidate_book(c.book_id).await;
        s.tracker.flush_snapshot(&snap(c, 2.0, true)).await.unwrap();

        assert_eq!(s.store.chapter_reads(), 2);
    }

    #[tokio::test]
    async fn test_forced_flush_uses_current_snapshot() {
        let s = setup();
        let c = &s.chapters[0];
        s.tracker.handle_snapshot(snap(c, 0.0, true)).await.unwrap();
        s.source.set(snap(c, 1.5, true));

        s.tracker.flush().await.unwrap();

        assert_eq!(s.store.saved().last().unwrap().position_secs, 1.5);
    }

    #[tokio::test]
    async fn test_flush_without_identity_is_noop() {
        let s = setup();
        s.tracker.flush().await.unwrap();
        assert!(s.store.saved().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_is_retried_next_tick() {
        let s = setup();
        let c = &s.chapters[0];
        s.store.fail_saves(true);
        assert!(s.tracker.handle_snapshot(snap(c, 0.0, true)).await.is_err());

        s.store.fail_saves(false);
        s.tracker.handle_snapshot(snap(c, 0.5, true)).await.unwrap();

        assert_eq!(s.store.saved().len(), 1);
    }
}
