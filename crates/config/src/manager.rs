//! Configuration manager - main API for config operations

use crate::persistence::ConfigPersistence;
use crate::{Config, ConfigError, ConfigResult};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Locates, loads and saves `config.toml`
pub struct ConfigManager {
    persistence: ConfigPersistence,
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Creates a manager for the platform config directory
    ///
    /// - Linux: `~/.config/taleplay/`
    /// - macOS: `~/Library/Application Support/taleplay/`
    /// - Windows: `%APPDATA%\taleplay\config\`
    pub fn new() -> ConfigResult<Self> {
        let config_dir = Self::default_config_dir()?;
        Ok(Self::with_directory(config_dir))
    }

    /// Creates a config manager with a custom config directory
    pub fn with_directory(config_dir: PathBuf) -> Self {
        let persistence = ConfigPersistence::new(config_dir.join(CONFIG_FILE_NAME));
        Self {
            persistence,
            config_dir,
        }
    }

    fn default_config_dir() -> ConfigResult<PathBuf> {
        ProjectDirs::from("", "", "taleplay")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: "Could not determine user config directory".to_string(),
            })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        self.persistence.path()
    }

    /// Loads the config file, or defaults if there is none
    pub fn load(&self) -> ConfigResult<Config> {
        self.persistence.load()
    }

    /// Loads the configuration, falling back to defaults on any error
    pub fn load_or_default(&self) -> Config {
        match self.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config: {}, using defaults", e);
                Config::default()
            }
        }
    }

    /// Validates and atomically saves the configuration
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.persistence.save(config)
    }

    /// Loads, applies `update_fn`, and saves
    pub fn update<F>(&self, update_fn: F) -> ConfigResult<Config>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.load()?;
        update_fn(&mut config);
        self.save(&config)?;
        Ok(config)
    }

    /// Writes a default config file if none exists
    ///
    /// Returns `Ok(true)` if a new file was created.
    pub fn initialize(&self) -> ConfigResult<bool> {
        if self.config_path().exists() {
            log::info!(
                "Config file already exists at {}",
                self.config_path().display()
            );
            return Ok(false);
        }

        self.save(&Config::default())?;
        Ok(true)
    }

    /// Overwrites the config file with defaults
    pub fn reset(&self) -> ConfigResult<()> {
        self.save(&Config::default())
    }

    /// Loads the file and applies `TALEPLAY_<SECTION>_<FIELD>` environment overrides
    ///
    /// Unparsable override values are ignored with a warning.
    pub fn load_with_env_overrides(&self) -> ConfigResult<Config> {
        let mut config = self.load()?;

        if let Some(speed) = env_override::<f32>("TALEPLAY_PLAYER_DEFAULT_SPEED") {
            config.player.default_speed = speed;
        }
        if let Some(threshold) = env_override::<f64>("TALEPLAY_PLAYER_AUTOSAVE_THRESHOLD_SECS") {
            config.player.autosave_threshold_secs = threshold;
        }
        if let Some(interval) = env_override::<u64>("TALEPLAY_PLAYER_POLL_INTERVAL_MS") {
            config.player.poll_interval_ms = interval;
        }
        if let Ok(db_path) = std::env::var("TALEPLAY_APP_DATABASE_PATH") {
            config.app.database_path = PathBuf::from(db_path);
        }

        if let Err(errors) = config.validate() {
            log::warn!(
                "Config validation warnings after env overrides: {:?}",
                errors
            );
        }

        Ok(config)
    }
}

fn env_override<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}
