//! Sleep timer state published to listeners

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Policy the sleep timer is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SleepTimerMode {
    #[default]
    Off,
    /// Fires at a wall-clock instant
    Duration,
    /// Fires when the current chapter finishes
    EndOfChapter,
    /// Fires after a number of chapters finish
    ChapterCount,
}

/// Published sleep timer state
///
/// `ends_at` is only set in `Duration` mode and `remaining_chapters` only in
/// `ChapterCount` mode; the constructors below are the only way the timer
/// builds these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SleepTimerState {
    pub mode: SleepTimerMode,
    pub is_active: bool,
    pub ends_at: Option<DateTime<Utc>>,
    pub remaining_chapters: Option<u32>,
}

impl SleepTimerState {
    pub fn off() -> Self {
        Self::default()
    }

    pub fn duration(ends_at: DateTime<Utc>) -> Self {
        Self {
            mode: SleepTimerMode::Duration,
            is_active: true,
            ends_at: Some(ends_at),
            remaining_chapters: None,
        }
    }

    pub fn end_of_chapter() -> Self {
        Self {
            mode: SleepTimerMode::EndOfChapter,
            is_active: true,
            ends_at: None,
            remaining_chapters: None,
        }
    }

    pub fn chapter_count(remaining: u32) -> Self {
        Self {
            mode: SleepTimerMode::ChapterCount,
            is_active: true,
            ends_at: None,
            remaining_chapters: Some(remaining),
        }
    }

    /// Time left until a duration timer fires, relative to `now`
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.ends_at
            .map(|end| (end - now).max(chrono::Duration::zero()))
    }
}

impl std::fmt::Display for SleepTimerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.mode, self.ends_at, self.remaining_chapters) {
            (SleepTimerMode::Off, _, _) => write!(f, "off"),
            (SleepTimerMode::Duration, Some(end), _) => {
                write!(f, "until {}", end.format("%H:%M:%S"))
            }
            (SleepTimerMode::Duration, None, _) => write!(f, "duration"),
            (SleepTimerMode::EndOfChapter, _, _) => write!(f, "end of chapter"),
            (SleepTimerMode::ChapterCount, _, Some(n)) => {
                write!(f, "{} chapter{}", n, if n == 1 { "" } else { "s" })
            }
            (SleepTimerMode::ChapterCount, _, None) => write!(f, "chapter count"),
        }
    }
}
