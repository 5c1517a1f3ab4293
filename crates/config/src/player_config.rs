//! Player configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};

/// Player preferences and behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Speed used until the listener picks one (0.75 - 2.0)
    pub default_speed: f32,

    /// Minimum position advance, in seconds, between autosaves during playback
    pub autosave_threshold_secs: f64,

    /// How often the position poller republishes state
    pub poll_interval_ms: u64,

    pub skip_back_secs: u64,

    pub skip_forward_secs: u64,

    /// Rewind seconds when resuming a saved position
    pub resume_rewind_secs: u64,

    /// Start the next chapter when one ends
    pub auto_advance: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_speed: 1.0,
            autosave_threshold_secs: 5.0,
            poll_interval_ms: 500,
            skip_back_secs: 15,
            skip_forward_secs: 30,
            resume_rewind_secs: 3,
            auto_advance: true,
        }
    }
}

impl ConfigSection for PlayerConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(self.default_speed, 0.75, 2.0, "player.default_speed"),
            Validator::in_range(
                self.autosave_threshold_secs,
                1.0,
                300.0,
                "player.autosave_threshold_secs",
            ),
            Validator::in_range(self.poll_interval_ms, 50, 5_000, "player.poll_interval_ms"),
            Validator::in_range(self.skip_back_secs, 1, 600, "player.skip_back_secs"),
            Validator::in_range(self.skip_forward_secs, 1, 600, "player.skip_forward_secs"),
            Validator::in_range(self.resume_rewind_secs, 0, 60, "player.resume_rewind_secs"),
        ])
    }

    fn merge(&mut self, other: Self) {
        self.default_speed = other.default_speed;
        self.autosave_threshold_secs = other.autosave_threshold_secs;
        self.poll_interval_ms = other.poll_interval_ms;
        self.skip_back_secs = other.skip_back_secs;
        self.skip_forward_secs = other.skip_forward_secs;
        self.resume_rewind_secs = other.resume_rewind_secs;
        self.auto_advance = other.auto_advance;
    }

    fn section_name(&self) -> &'static str {
        "player"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PlayerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_player_behaviour() {
        let config = PlayerConfig::default();
        assert_eq!(config.autosave_threshold_secs, 5.0);
        assert_eq!(config.poll_interval_ms, 500);
    }

    #[test]
    fn test_invalid_speed() {
        let config = PlayerConfig {
            default_speed: 3.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiple_validation_errors() {
        let config = PlayerConfig {
            default_speed: 0.5,
            poll_interval_ms: 0,
            skip_back_secs: 0,
            ..Default::default()
        };

        assert_eq!(config.validate().unwrap_err().len(), 3);
    }

    #[test]
    fn test_merge() {
        let mut base = PlayerConfig::default();
        let other = PlayerConfig {
            skip_forward_secs: 45,
            auto_advance: false,
            ..Default::default()
        };

        base.merge(other);
        assert_eq!(base.skip_forward_secs, 45);
        assert!(!base.auto_advance);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PlayerConfig = toml::from_str("default_speed = 1.5").unwrap();
        assert_eq!(config.default_speed, 1.5);
        assert_eq!(config.skip_back_secs, 15);
    }
}
