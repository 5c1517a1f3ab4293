//! Integration tests for the configuration system

use taleplay_config::{Config, ConfigError, ConfigManager, ConfigSection, PlayerConfig, CONFIG_VERSION};
use tempfile::TempDir;

fn setup_test_manager() -> (TempDir, ConfigManager) {
    let temp_dir = TempDir::new().expect("temp dir");
    let manager = ConfigManager::with_directory(temp_dir.path().to_path_buf());
    (temp_dir, manager)
}

#[test]
fn test_full_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = setup_test_manager();

    assert!(manager.initialize()?);

    let config = manager.load()?;
    assert_eq!(config.version, CONFIG_VERSION);

    let mut modified = config.clone();
    modified.player.default_speed = 1.5;
    modified.sleep_timer.default_chapter_count = 2;
    manager.save(&modified)?;

    let reloaded = manager.load()?;
    assert_eq!(reloaded.player.default_speed, 1.5);
    assert_eq!(reloaded.sleep_timer.default_chapter_count, 2);

    manager.reset()?;
    assert_eq!(manager.load()?, Config::default());

    Ok(())
}

#[test]
fn test_invalid_save_keeps_previous_file() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = setup_test_manager();
    manager.save(&Config::default())?;

    let mut invalid = Config::default();
    invalid.player.poll_interval_ms = 1;
    let result = manager.save(&invalid);

    assert!(matches!(result, Err(ConfigError::Invalid(ref errors)) if errors.len() == 1));
    assert_eq!(manager.load()?.player.poll_interval_ms, 500);
    Ok(())
}

#[test]
fn test_atomic_save_leaves_no_temp_files() -> Result<(), Box<dyn std::error::Error>> {
    let (temp_dir, manager) = setup_test_manager();

    for minutes in [10, 20, 30] {
        manager.update(|c| c.sleep_timer.default_minutes = minutes)?;
    }

    let mut names: Vec<String> = std::fs::read_dir(temp_dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["config.toml", "config.toml.backup"]);
    Ok(())
}

#[test]
fn test_hand_written_file() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = setup_test_manager();
    std::fs::write(
        manager.config_path(),
        r#"
version = 1

[app]
log_level = "debug"

[player]
default_speed = 1.25
auto_advance = false
"#,
    )?;

    let config = manager.load()?;
    assert_eq!(config.app.log_level.as_filter(), "debug");
    assert_eq!(config.player.default_speed, 1.25);
    assert!(!config.player.auto_advance);
    assert_eq!(config.player.section_name(), "player");
    assert_eq!(config.player.skip_forward_secs, PlayerConfig::default().skip_forward_secs);
    Ok(())
}
