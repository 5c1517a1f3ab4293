//! Taleplay configuration
//!
//! `config.toml` is split into sections, each implementing
//! [`ConfigSection`] for validation and merging. Loading never panics:
//! a missing file gives the defaults, out-of-range values are reported as
//! warnings, and saving refuses invalid values and writes atomically.
//!
//! ```rust,no_run
//! use taleplay_config::ConfigManager;
//!
//! let manager = ConfigManager::new().expect("no config directory");
//! let config = manager.load_or_default();
//! println!("Autosave every {}s of listening", config.player.autosave_threshold_secs);
//! ```

mod error;
mod manager;
mod persistence;
mod validation;

mod app_config;
mod player_config;
mod sleep_timer_config;

pub use error::{ConfigError, ConfigResult, ValidationError};
pub use manager::ConfigManager;
pub use validation::{ConfigSection, Validator};

pub use app_config::{AppConfig, LogLevel};
pub use player_config::PlayerConfig;
pub use sleep_timer_config::SleepTimerConfig;

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub app: AppConfig,
    pub player: PlayerConfig,
    pub sleep_timer: SleepTimerConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates every section, returning all errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(mut e) = self.app.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.player.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.sleep_timer.validate() {
            errors.append(&mut e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Merges this config with another, preferring values from `other`
    pub fn merge(&mut self, other: Config) {
        self.app.merge(other.app);
        self.player.merge(other.player);
        self.sleep_timer.merge(other.sleep_timer);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            app: AppConfig::default(),
            player: PlayerConfig::default(),
            sleep_timer: SleepTimerConfig::default(),
        }
    }
}
