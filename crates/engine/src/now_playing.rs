//! Outbound now-playing display

use std::path::Path;
use taleplay_core::{format_clock, Chapter, PlaybackSnapshot};

pub const DEFAULT_CHAPTER_LABEL: &str = "Chapter";
pub const DEFAULT_BOOK_LABEL: &str = "Audiobook";

/// Renders the engine's state somewhere outside the process: a lock screen,
/// a status line, a media-session API.
///
/// Called with the engine lock held, so implementations must not call back
/// into the engine.
pub trait NowPlayingSink: Send + Sync {
    fn update_now_playing(&self, snapshot: &PlaybackSnapshot, title: &str, subtitle: &str);

    fn clear_now_playing(&self);
}

/// Sink for hosts without a now-playing surface
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNowPlaying;

impl NowPlayingSink for NoOpNowPlaying {
    fn update_now_playing(&self, _snapshot: &PlaybackSnapshot, _title: &str, _subtitle: &str) {}

    fn clear_now_playing(&self) {}
}

/// Writes every update to the debug log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNowPlaying;

impl NowPlayingSink for LoggingNowPlaying {
    fn update_now_playing(&self, snapshot: &PlaybackSnapshot, title: &str, subtitle: &str) {
        log::debug!(
            "Now playing: {} / {} [{} of {}] {} {}",
            subtitle,
            title,
            format_clock(snapshot.position_secs),
            format_clock(snapshot.duration_secs),
            snapshot.speed,
            if snapshot.is_playing { "playing" } else { "paused" }
        );
    }

    fn clear_now_playing(&self) {
        log::debug!("Now playing cleared");
    }
}

/// Trims a display override, mapping blank input to none
pub(crate) fn normalize_override(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Picks the (title, subtitle) pair shown for a chapter
///
/// The title is the chapter name and the subtitle the book name. Overrides
/// win; otherwise the chapter's own title and the name of the directory its
/// file lives in are used.
pub fn resolve_labels(
    chapter: Option<&Chapter>,
    book_override: Option<&str>,
    chapter_override: Option<&str>,
) -> (String, String) {
    let title = chapter_override
        .map(str::to_string)
        .or_else(|| {
            chapter
                .map(|c| c.title.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_CHAPTER_LABEL.to_string());

    let subtitle = book_override
        .map(str::to_string)
        .or_else(|| chapter.and_then(|c| parent_dir_name(&c.file_path)))
        .unwrap_or_else(|| DEFAULT_BOOK_LABEL.to_string());

    (title, subtitle)
}

fn parent_dir_name(path: &Path) -> Option<String> {
    path.parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .filter(|n| !n.trim().is_empty())
        .map(str::to_string)
}
