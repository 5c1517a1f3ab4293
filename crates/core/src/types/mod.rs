//! Domain types for Taleplay
//!
//! - `book`: books, chapters and their ids
//! - `playback`: playback speed and snapshots
//! - `progress`: saved listening positions
//! - `sleep_timer`: published sleep timer state
//! - `common`: shared traits and utilities

mod book;
mod common;
mod playback;
mod progress;
mod sleep_timer;

pub use book::{Book, BookId, Chapter, ChapterId};
pub use common::{format_clock, Timestamp, Validator};
pub use playback::{PlaybackIdentity, PlaybackSnapshot, PlaybackSpeed};
pub use progress::ProgressRecord;
pub use sleep_timer::{SleepTimerMode, SleepTimerState};
