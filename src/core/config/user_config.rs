//! User configuration file handling
//!
//! Manages settings from ~/.config/fontlive/settings.json

use super::settings::APP_NAME;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// User configuration from ~/.config/fontlive/settings.json
///
/// These settings override built-in defaults but are overridden by CLI arguments
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConfigFile {
    /// Quiet period before an auto-compile, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_compile_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpolate_timeout_secs: Option<u64>,
    /// fontc executable, looked up on PATH when not absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fontc_path: Option<PathBuf>,
    /// Target used by `compile` when none is given (e.g. "user", "typing")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,
}

impl ConfigFile {
    /// Get the path to the fontlive config directory
    pub fn config_dir() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
        config_dir.join(APP_NAME)
    }

    /// Get the path to the user config file
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("settings.json")
    }

    /// Get the path to the logs directory
    pub fn logs_dir() -> PathBuf {
        Self::config_dir().join("logs")
    }

    /// Load configuration from the user config file
    pub fn load() -> Option<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    debug!("Loaded user settings from {:?}", path);
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse settings.json: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read settings.json: {}", e);
                None
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Settings file content written by `--new-config`: every built-in
    /// default spelled out so it can be edited.
    pub fn example() -> Self {
        use super::settings::*;
        Self {
            auto_compile_delay_ms: Some(DEFAULT_AUTO_COMPILE_DELAY.as_millis() as u64),
            init_timeout_secs: Some(DEFAULT_INIT_TIMEOUT.as_secs()),
            compile_timeout_secs: Some(DEFAULT_COMPILE_TIMEOUT.as_secs()),
            interpolate_timeout_secs: Some(DEFAULT_INTERPOLATE_TIMEOUT.as_secs()),
            fontc_path: Some(PathBuf::from(crate::engine::fontc::DEFAULT_FONTC)),
            default_target: Some(DEFAULT_TARGET.to_string()),
        }
    }

    /// Create the config directory, its logs directory and a settings file
    /// with default values. An existing settings file is left alone.
    pub fn initialize_config_directory() -> anyhow::Result<()> {
        Self::initialize_in(&Self::config_dir())
    }

    fn initialize_in(config_dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(config_dir)?;
        println!("Created config directory: {:?}", config_dir);

        let logs_dir = config_dir.join("logs");
        fs::create_dir_all(&logs_dir)?;
        println!("Created logs directory: {:?}", logs_dir);

        let settings_path = config_dir.join("settings.json");
        if settings_path.exists() {
            println!("Settings file already exists: {:?}", settings_path);
        } else {
            Self::example().save_to(&settings_path)?;
            println!("Created settings file: {:?}", settings_path);
        }

        println!("\nConfiguration initialized successfully!");
        println!("  - Edit settings at: {:?}", settings_path);
        println!("  - View application logs in: {:?}", logs_dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(APP_NAME);
        ConfigFile::initialize_in(&config_dir).unwrap();

        let path = config_dir.join("settings.json");
        assert_eq!(ConfigFile::load_from(&path), Some(ConfigFile::example()));
        assert!(config_dir.join("logs").is_dir());

        let custom = ConfigFile {
            default_target: Some("typing".to_string()),
            ..Default::default()
        };
        custom.save_to(&path).unwrap();
        ConfigFile::initialize_in(&config_dir).unwrap();
        assert_eq!(ConfigFile::load_from(&path), Some(custom));
    }

    #[test]
    fn test_partial_settings_parse() {
        let config: ConfigFile = serde_json::from_str(r#"{"compile_timeout_secs": 30}"#).unwrap();
        assert_eq!(config.compile_timeout_secs, Some(30));
        assert_eq!(config.fontc_path, None);
    }

    #[test]
    fn test_malformed_settings_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(ConfigFile::load_from(&path), None);
    }
}
