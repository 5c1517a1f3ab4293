//! Playback-related domain models

use crate::types::{BookId, ChapterId};
use serde::{Deserialize, Serialize};

/// Playback speed, always within [`PlaybackSpeed::MIN`, `PlaybackSpeed::MAX`]
///
/// Construction never fails: out-of-range inputs are clamped and non-finite
/// inputs fall back to normal speed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct PlaybackSpeed(f32);

impl PlaybackSpeed {
    /// Slowest supported speed
    pub const MIN: f32 = 0.75;
    /// Fastest supported speed
    pub const MAX: f32 = 2.0;
    /// Normal speed
    pub const NORMAL: Self = Self(1.0);

    /// Creates a speed, clamping into the supported range
    pub fn clamped(speed: f32) -> Self {
        if !speed.is_finite() {
            return Self::NORMAL;
        }
        Self(speed.clamp(Self::MIN, Self::MAX))
    }

    /// Returns the speed multiplier
    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Default for PlaybackSpeed {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<f32> for PlaybackSpeed {
    fn from(speed: f32) -> Self {
        Self::clamped(speed)
    }
}

impl From<PlaybackSpeed> for f32 {
    fn from(speed: PlaybackSpeed) -> Self {
        speed.0
    }
}

impl std::fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}x", self.0)
    }
}

/// The book and chapter a snapshot refers to.
///
/// Both ids travel together so a snapshot can never carry half an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybackIdentity {
    pub book_id: BookId,
    pub chapter_id: ChapterId,
}

impl PlaybackIdentity {
    pub fn new(book_id: BookId, chapter_id: ChapterId) -> Self {
        Self {
            book_id,
            chapter_id,
        }
    }
}

/// Immutable point-in-time description of the player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub identity: Option<PlaybackIdentity>,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub speed: PlaybackSpeed,
    pub is_playing: bool,
}

impl PlaybackSnapshot {
    /// Creates a snapshot; negative or non-finite times are normalized to zero
    pub fn new(
        identity: Option<PlaybackIdentity>,
        position_secs: f64,
        duration_secs: f64,
        speed: PlaybackSpeed,
        is_playing: bool,
    ) -> Self {
        Self {
            identity,
            position_secs: non_negative(position_secs),
            duration_secs: non_negative(duration_secs),
            speed,
            is_playing,
        }
    }

    /// A snapshot with nothing loaded, keeping only the speed preference
    pub fn empty(speed: PlaybackSpeed) -> Self {
        Self::new(None, 0.0, 0.0, speed, false)
    }

    pub fn book_id(&self) -> Option<BookId> {
        self.identity.map(|i| i.book_id)
    }

    pub fn chapter_id(&self) -> Option<ChapterId> {
        self.identity.map(|i| i.chapter_id)
    }

    /// Returns true if both book and chapter are known
    pub fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    /// Returns true if `other` refers to a different book or chapter
    pub fn identity_differs(&self, other: &PlaybackSnapshot) -> bool {
        self.identity != other.identity
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self::empty(PlaybackSpeed::default())
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
