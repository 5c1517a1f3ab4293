//! Sleep timer defaults

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SleepTimerConfig {
    /// Duration offered when the listener starts a timer without one
    pub default_minutes: u32,

    /// Chapter count offered for chapter-count timers
    pub default_chapter_count: u32,
}

impl Default for SleepTimerConfig {
    fn default() -> Self {
        Self {
            default_minutes: 30,
            default_chapter_count: 1,
        }
    }
}

impl ConfigSection for SleepTimerConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(self.default_minutes, 1, 24 * 60, "sleep_timer.default_minutes"),
            Validator::in_range(
                self.default_chapter_count,
                1,
                100,
                "sleep_timer.default_chapter_count",
            ),
        ])
    }

    fn merge(&mut self, other: Self) {
        self.default_minutes = other.default_minutes;
        self.default_chapter_count = other.default_chapter_count;
    }

    fn section_name(&self) -> &'static str {
        "sleep_timer"
    }
}
