//! In-memory collaborators shared by the unit tests

use crate::control::{PlaybackControl, ProgressFlush, SnapshotSource};
use crate::error::{EngineError, EngineResult};
use crate::now_playing::NowPlayingSink;
use crate::transport::{EndSignal, Transport, TransportFactory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taleplay_core::{
    AppError, BookId, Chapter, PersistenceStore, PlaybackSnapshot, PlaybackSpeed, ProgressRecord,
};

/// Creates `count` empty chapter files under `dir/<book>/` and their chapters
pub fn chapter_files(dir: &Path, book_id: BookId, count: u32) -> Vec<Chapter> {
    let book_dir = dir.join("Test Book");
    std::fs::create_dir_all(&book_dir).unwrap();
    (0..count)
        .map(|i| {
            let path = book_dir.join(format!("{:02}.mp3", i + 1));
            std::fs::write(&path, b"").unwrap();
            Chapter::new(book_id, format!("Chapter {}", i + 1), i, path).with_duration(600.0)
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct FakeTransportState {
    pub position: f64,
    pub duration: f64,
    pub playing: bool,
    pub speed: Option<PlaybackSpeed>,
    pub seeks: Vec<f64>,
    pub released: bool,
}

pub struct FakeTransport {
    state: Arc<Mutex<FakeTransportState>>,
    can_set_speed: bool,
    live: Arc<AtomicUsize>,
}

impl Transport for FakeTransport {
    fn play(&mut self) -> EngineResult<()> {
        self.state.lock().unwrap().playing = true;
        Ok(())
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.state.lock().unwrap().playing = false;
        Ok(())
    }

    fn seek(&mut self, secs: f64) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.position = secs;
        state.seeks.push(secs);
        Ok(())
    }

    fn can_set_speed(&self) -> bool {
        self.can_set_speed
    }

    fn set_speed(&mut self, speed: PlaybackSpeed) -> EngineResult<()> {
        self.state.lock().unwrap().speed = Some(speed);
        Ok(())
    }

    fn position_secs(&self) -> f64 {
        self.state.lock().unwrap().position
    }

    fn duration_secs(&self) -> f64 {
        self.state.lock().unwrap().duration
    }

    fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    fn release(&mut self) {
        let mut state = self.state.lock().unwrap();
        if !state.released {
            state.released = true;
            state.playing = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.release();
    }
}

/// Records every transport it opens so tests can drive them
pub struct FakeTransportFactory {
    opened: Mutex<Vec<(PathBuf, Arc<Mutex<FakeTransportState>>, EndSignal)>>,
    live: Arc<AtomicUsize>,
    can_set_speed: bool,
    fail_next: AtomicBool,
}

impl FakeTransportFactory {
    pub fn new(can_set_speed: bool) -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            live: Arc::new(AtomicUsize::new(0)),
            can_set_speed,
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn transport(&self, index: usize) -> Arc<Mutex<FakeTransportState>> {
        Arc::clone(&self.opened.lock().unwrap()[index].1)
    }

    pub fn set_position(&self, index: usize, secs: f64) {
        self.transport(index).lock().unwrap().position = secs;
    }

    /// Plays transport `index` to its end and fires its end signal
    pub fn finish(&self, index: usize) {
        let opened = self.opened.lock().unwrap();
        let (_, state, signal) = &opened[index];
        {
            let mut state = state.lock().unwrap();
            state.position = state.duration;
            state.playing = false;
        }
        signal.fire();
    }

    pub fn fail_next_open(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl TransportFactory for FakeTransportFactory {
    fn open(&self, path: &Path, on_end: EndSignal) -> EngineResult<Box<dyn Transport>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Decode("unsupported media".to_string()));
        }

        let state = Arc::new(Mutex::new(FakeTransportState {
            duration: 600.0,
            ..Default::default()
        }));
        self.opened
            .lock()
            .unwrap()
            .push((path.to_path_buf(), Arc::clone(&state), on_end));
        self.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeTransport {
            state,
            can_set_speed: self.can_set_speed,
            live: Arc::clone(&self.live),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NowPlayingCall {
    Update {
        snapshot: PlaybackSnapshot,
        title: String,
        subtitle: String,
    },
    Clear,
}

#[derive(Default)]
pub struct RecordingNowPlaying {
    calls: Mutex<Vec<NowPlayingCall>>,
}

impl RecordingNowPlaying {
    pub fn calls(&self) -> Vec<NowPlayingCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl NowPlayingSink for RecordingNowPlaying {
    fn update_now_playing(&self, snapshot: &PlaybackSnapshot, title: &str, subtitle: &str) {
        self.calls.lock().unwrap().push(NowPlayingCall::Update {
            snapshot: *snapshot,
            title: title.to_string(),
            subtitle: subtitle.to_string(),
        });
    }

    fn clear_now_playing(&self) {
        self.calls.lock().unwrap().push(NowPlayingCall::Clear);
    }
}

/// Persistence store backed by maps
#[derive(Default)]
pub struct MemoryStore {
    chapters: Mutex<HashMap<BookId, Vec<Chapter>>>,
    saved: Mutex<Vec<ProgressRecord>>,
    chapter_reads: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn with_chapters(chapters: &[Chapter]) -> Self {
        let store = Self::default();
        for chapter in chapters {
            store.add_chapter(chapter.clone());
        }
        store
    }

    pub fn add_chapter(&self, chapter: Chapter) {
        self.chapters
            .lock()
            .unwrap()
            .entry(chapter.book_id)
            .or_default()
            .push(chapter);
    }

    pub fn saved(&self) -> Vec<ProgressRecord> {
        self.saved.lock().unwrap().clone()
    }

    pub fn chapter_reads(&self) -> usize {
        self.chapter_reads.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn get_chapters(&self, book_id: BookId) -> taleplay_core::Result<Vec<Chapter>> {
        self.chapter_reads.fetch_add(1, Ordering::SeqCst);
        let mut chapters = self
            .chapters
            .lock()
            .unwrap()
            .get(&book_id)
            .cloned()
            .unwrap_or_default();
        chapters.sort_by_key(|c| c.ordinal);
        Ok(chapters)
    }

    async fn save_progress(&self, record: &ProgressRecord) -> taleplay_core::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AppError::InternalError {
                message: "disk full".to_string(),
            });
        }
        self.saved.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Fixed snapshot source whose value tests can swap
pub struct FixedSource(pub Mutex<PlaybackSnapshot>);

impl FixedSource {
    pub fn new(snapshot: PlaybackSnapshot) -> Self {
        Self(Mutex::new(snapshot))
    }

    pub fn set(&self, snapshot: PlaybackSnapshot) {
        *self.0.lock().unwrap() = snapshot;
    }
}

impl SnapshotSource for FixedSource {
    fn current_snapshot(&self) -> PlaybackSnapshot {
        *self.0.lock().unwrap()
    }
}

/// Records control calls into a log shared with [`RecordingFlush`]
pub struct RecordingControl {
    log: Arc<Mutex<Vec<String>>>,
    playing: bool,
    fail: bool,
}

impl RecordingControl {
    pub fn new(playing: bool) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            playing,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(false)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> EngineResult<()> {
        self.log.lock().unwrap().push(call);
        if self.fail {
            Err(EngineError::InvalidState("no transport".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SnapshotSource for RecordingControl {
    fn current_snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot::new(None, 0.0, 0.0, PlaybackSpeed::NORMAL, self.playing)
    }
}

#[async_trait]
impl PlaybackControl for RecordingControl {
    async fn pause(&self) -> EngineResult<()> {
        self.record("pause".to_string())
    }

    async fn resume(&self) -> EngineResult<()> {
        self.record("resume".to_string())
    }

    async fn seek(&self, position_secs: f64) -> EngineResult<()> {
        self.record(format!("seek {}", position_secs))
    }

    async fn skip_by(&self, delta_secs: f64) -> EngineResult<()> {
        self.record(format!("skip {}", delta_secs))
    }
}

pub struct RecordingFlush {
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingFlush {
    pub fn sharing(control: &RecordingControl) -> Self {
        Self {
            log: Arc::clone(&control.log),
        }
    }
}

#[async_trait]
impl ProgressFlush for RecordingFlush {
    async fn flush(&self) -> EngineResult<()> {
        self.log.lock().unwrap().push("flush".to_string());
        Ok(())
    }
}
