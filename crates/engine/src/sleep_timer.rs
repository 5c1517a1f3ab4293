//! Sleep timer: pause playback after a delay or a number of chapters
//!
//! At most one timer policy is active. Each start bumps a generation counter
//! and drops the previous delay's cancel handle, so a superseded delay can
//! never fire. Firing pauses the player, flushes progress and only then
//! resets the timer, and the reset is skipped if a new timer was started in
//! the meantime.

use crate::control::{PlaybackControl, ProgressFlush};
use crate::error::{EngineError, EngineResult};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use taleplay_core::{SleepTimerMode, SleepTimerState};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::{sleep_until, Instant};

struct TimerInner {
    state: SleepTimerState,
    generation: u64,
    cancel: Option<oneshot::Sender<()>>,
    /// Generation whose trigger is currently running
    firing: Option<u64>,
}

impl TimerInner {
    /// Supersedes whatever timer is pending
    fn supersede(&mut self) -> u64 {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.generation += 1;
        self.generation
    }
}

struct TimerShared {
    inner: Mutex<TimerInner>,
    states: watch::Sender<SleepTimerState>,
    player: Arc<dyn PlaybackControl>,
    progress: Arc<dyn ProgressFlush>,
}

#[derive(Clone)]
pub struct SleepTimer {
    shared: Arc<TimerShared>,
}

impl SleepTimer {
    pub fn new(player: Arc<dyn PlaybackControl>, progress: Arc<dyn ProgressFlush>) -> Self {
        let (states, _) = watch::channel(SleepTimerState::off());
        Self {
            shared: Arc::new(TimerShared {
                inner: Mutex::new(TimerInner {
                    state: SleepTimerState::off(),
                    generation: 0,
                    cancel: None,
                    firing: None,
                }),
                states,
                player,
                progress,
            }),
        }
    }

    /// Pauses playback once `duration` has passed
    pub async fn start_for_duration(&self, duration: Duration) -> EngineResult<()> {
        if duration.is_zero() {
            return Err(EngineError::validation("duration", "must be greater than zero"));
        }
        // Both clocks must represent the end time before the old timer is touched
        let ends_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|span| Utc::now().checked_add_signed(span));
        let deadline = Instant::now().checked_add(duration);
        let (Some(ends_at), Some(deadline)) = (ends_at, deadline) else {
            return Err(EngineError::validation("duration", "is too long"));
        };

        let mut inner = self.shared.inner.lock().await;
        let generation = inner.supersede();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        inner.cancel = Some(cancel_tx);
        self.publish(&mut inner, SleepTimerState::duration(ends_at));

        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel_rx => return,
                _ = sleep_until(deadline) => {}
            }

            let Some(shared) = weak.upgrade() else {
                return;
            };
            let timer = SleepTimer { shared };
            {
                let mut inner = timer.shared.inner.lock().await;
                if inner.generation != generation || inner.firing == Some(generation) {
                    return;
                }
                inner.firing = Some(generation);
            }
            timer.trigger(generation).await;
        });

        log::info!("Sleep timer set for {} minutes", duration.as_secs() / 60);
        Ok(())
    }

    /// Pauses playback when the current chapter finishes
    pub async fn start_until_end_of_chapter(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.supersede();
        self.publish(&mut inner, SleepTimerState::end_of_chapter());
        log::info!("Sleep timer set for end of chapter");
    }

    /// Pauses playback after `chapters` more chapters finish
    pub async fn start_for_chapter_count(&self, chapters: u32) -> EngineResult<()> {
        if chapters == 0 {
            return Err(EngineError::validation("chapters", "must be at least one"));
        }

        let mut inner = self.shared.inner.lock().await;
        inner.supersede();
        self.publish(&mut inner, SleepTimerState::chapter_count(chapters));
        log::info!("Sleep timer set for {} chapters", chapters);
        Ok(())
    }

    pub async fn cancel(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.supersede();
        self.publish(&mut inner, SleepTimerState::off());
    }

    /// Tells the timer a chapter played to its end
    ///
    /// Returns true if this fired the timer, in which case playback has
    /// already been paused and progress flushed.
    pub async fn on_chapter_completed(&self) -> bool {
        let generation = {
            let mut inner = self.shared.inner.lock().await;
            if !inner.state.is_active || inner.firing == Some(inner.generation) {
                return false;
            }

            match inner.state.mode {
                SleepTimerMode::EndOfChapter => {}
                SleepTimerMode::ChapterCount => {
                    let remaining = inner.state.remaining_chapters.unwrap_or(1);
                    if remaining > 1 {
                        self.publish(&mut inner, SleepTimerState::chapter_count(remaining - 1));
                        return false;
                    }
                }
                SleepTimerMode::Duration | SleepTimerMode::Off => return false,
            }

            inner.firing = Some(inner.generation);
            inner.generation
        };

        self.trigger(generation).await;
        true
    }

    pub async fn state(&self) -> SleepTimerState {
        self.shared.inner.lock().await.state
    }

    pub fn watch(&self) -> watch::Receiver<SleepTimerState> {
        self.shared.states.subscribe()
    }

    async fn trigger(&self, generation: u64) {
        log::info!("Sleep timer fired, pausing playback");

        if let Err(e) = self.shared.player.pause().await {
            log::warn!("Sleep timer could not pause playback: {}", e);
        }
        if let Err(e) = self.shared.progress.flush().await {
            log::warn!("Sleep timer could not save progress: {}", e);
        }

        let mut inner = self.shared.inner.lock().await;
        if inner.firing == Some(generation) {
            inner.firing = None;
        }
        if inner.generation == generation {
            self.publish(&mut inner, SleepTimerState::off());
        }
    }

    fn publish(&self, inner: &mut TimerInner, state: SleepTimerState) {
        inner.state = state;
        self.shared.states.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::SnapshotSource;
    use crate::test_support::{RecordingControl, RecordingFlush};
    use async_trait::async_trait;
    use taleplay_core::PlaybackSnapshot;
    use tokio::sync::Notify;

    fn timer() -> (SleepTimer, Arc<RecordingControl>) {
        let control = Arc::new(RecordingControl::new(true));
        let flush = Arc::new(RecordingFlush::sharing(&control));
        (SleepTimer::new(control.clone(), flush), control)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_rejected() {
        let (timer, _) = timer();
        let result = timer.start_for_duration(Duration::ZERO).await;

        assert!(matches!(result, Err(EngineError::Validation { .. })));
        assert_eq!(timer.state().await, SleepTimerState::off());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_duration_keeps_current_timer() {
        let (timer, control) = timer();
        timer.start_for_duration(Duration::from_secs(60)).await.unwrap();
        let before = timer.state().await;

        for too_long in [Duration::from_secs(100_000_000_000_000), Duration::MAX] {
            let result = timer.start_for_duration(too_long).await;
            assert!(matches!(result, Err(EngineError::Validation { .. })));
        }
        assert_eq!(timer.state().await, before);

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;
        assert_eq!(control.calls(), vec!["pause", "flush"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_chapters_rejected() {
        let (timer, _) = timer();
        assert!(matches!(
            timer.start_for_chapter_count(0).await,
            Err(EngineError::Validation { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_fires_pause_then_flush() {
        let (timer, control) = timer();
        timer.start_for_duration(Duration::from_secs(600)).await.unwrap();

        let state = timer.state().await;
        assert_eq!(state.mode, SleepTimerMode::Duration);
        assert!(state.is_active && state.ends_at.is_some());

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert!(control.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(control.calls(), vec!["pause", "flush"]);
        assert_eq!(timer.state().await, SleepTimerState::off());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_pending_delay() {
        let (timer, control) = timer();
        timer.start_for_duration(Duration::from_secs(600)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        timer.start_for_duration(Duration::from_secs(1200)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        settle().await;
        assert!(control.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(700)).await;
        settle().await;
        assert_eq!(control.calls(), vec!["pause", "flush"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_policy_leaves_one_timer() {
        let (timer, control) = timer();
        timer.start_for_duration(Duration::from_secs(60)).await.unwrap();
        timer.start_until_end_of_chapter().await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;

        assert!(control.calls().is_empty());
        assert_eq!(timer.state().await, SleepTimerState::end_of_chapter());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_elapse_suppresses() {
        let (timer, control) = timer();
        timer.start_for_duration(Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        timer.cancel().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;

        assert!(control.calls().is_empty());
        assert_eq!(timer.state().await, SleepTimerState::off());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_at_deadline_wins_when_last() {
        let (timer, control) = timer();
        timer.start_for_duration(Duration::from_secs(60)).await.unwrap();

        // The delay elapses while a cancel holds the lock
        {
            let mut inner = timer.shared.inner.lock().await;
            tokio::time::sleep(Duration::from_secs(61)).await;
            inner.supersede();
            timer.publish(&mut inner, SleepTimerState::off());
        }
        settle().await;

        assert!(control.calls().is_empty());
        assert_eq!(timer.state().await, SleepTimerState::off());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapse_wins_when_cancel_is_late() {
        let (timer, control) = timer();
        timer.start_for_duration(Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;
        timer.cancel().await;

        assert_eq!(control.calls(), vec!["pause", "flush"]);
        assert_eq!(timer.state().await, SleepTimerState::off());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_of_chapter_fires() {
        let (timer, control) = timer();
        assert!(!timer.on_chapter_completed().await);

        timer.start_until_end_of_chapter().await;
        assert!(timer.on_chapter_completed().await);

        assert_eq!(control.calls(), vec!["pause", "flush"]);
        assert_eq!(timer.state().await, SleepTimerState::off());
        assert!(!timer.on_chapter_completed().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chapter_count_three() {
        let (timer, control) = timer();
        timer.start_for_chapter_count(3).await.unwrap();

        assert!(!timer.on_chapter_completed().await);
        assert_eq!(timer.state().await.remaining_chapters, Some(2));

        assert!(!timer.on_chapter_completed().await);
        assert_eq!(timer.state().await.remaining_chapters, Some(1));
        assert!(control.calls().is_empty());

        assert!(timer.on_chapter_completed().await);
        assert_eq!(control.calls(), vec!["pause", "flush"]);
        assert_eq!(timer.state().await, SleepTimerState::off());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_ignores_chapter_completion() {
        let (timer, control) = timer();
        timer.start_for_duration(Duration::from_secs(60)).await.unwrap();

        assert!(!timer.on_chapter_completed().await);
        assert!(control.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_sees_updates() {
        let (timer, _) = timer();
        let mut states = timer.watch();

        timer.start_for_chapter_count(2).await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SleepTimerState::chapter_count(2));

        timer.cancel().await;
        assert_eq!(*states.borrow_and_update(), SleepTimerState::off());
    }

    /// Pause blocks until released, to start a timer mid-trigger
    struct GatedControl {
        gate: Notify,
        flush: RecordingControl,
    }

    impl SnapshotSource for GatedControl {
        fn current_snapshot(&self) -> PlaybackSnapshot {
            PlaybackSnapshot::default()
        }
    }

    #[async_trait]
    impl PlaybackControl for GatedControl {
        async fn pause(&self) -> EngineResult<()> {
            self.gate.notified().await;
            self.flush.pause().await
        }

        async fn resume(&self) -> EngineResult<()> {
            Ok(())
        }

        async fn seek(&self, _position_secs: f64) -> EngineResult<()> {
            Ok(())
        }

        async fn skip_by(&self, _delta_secs: f64) -> EngineResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_during_trigger_is_not_clobbered() {
        let control = Arc::new(GatedControl {
            gate: Notify::new(),
            flush: RecordingControl::new(true),
        });
        let flush = Arc::new(RecordingFlush::sharing(&control.flush));
        let timer = SleepTimer::new(control.clone(), flush);

        timer.start_until_end_of_chapter().await;
        let firing = {
            let timer = timer.clone();
            tokio::spawn(async move { timer.on_chapter_completed().await })
        };
        settle().await;

        // A second completion while firing does nothing
        assert!(!timer.on_chapter_completed().await);

        timer.start_for_chapter_count(2).await.unwrap();
        control.gate.notify_one();
        assert!(firing.await.unwrap());

        assert_eq!(control.flush.calls(), vec!["pause", "flush"]);
        assert_eq!(timer.state().await, SleepTimerState::chapter_count(2));
    }
}
