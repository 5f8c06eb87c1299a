//! Built-in defaults
//!
//! Lowest priority layer: `settings.json` overrides these and CLI flags
//! override both. [`PipelineSettings`] is the merged result handed to the
//! pipeline components.

use super::user_config::ConfigFile;
use crate::engine::EngineSettings;
use std::path::PathBuf;
use std::time::Duration;

pub const APP_NAME: &str = "fontlive";

/// Quiet period before an auto-compile fires
pub const DEFAULT_AUTO_COMPILE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_INTERPOLATE_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_TARGET: &str = "user";

/// Poll interval of the `watch` command
pub const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub engine: EngineSettings,
    pub auto_compile_delay: Duration,
    pub fontc_path: PathBuf,
    pub default_target: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            auto_compile_delay: DEFAULT_AUTO_COMPILE_DELAY,
            fontc_path: PathBuf::from(crate::engine::fontc::DEFAULT_FONTC),
            default_target: DEFAULT_TARGET.to_string(),
        }
    }
}

impl PipelineSettings {
    /// Defaults with any values present in `config` applied on top.
    pub fn from_config(config: Option<&ConfigFile>) -> Self {
        let mut settings = Self::default();
        let Some(config) = config else {
            return settings;
        };

        if let Some(ms) = config.auto_compile_delay_ms {
            settings.auto_compile_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = config.init_timeout_secs {
            settings.engine.init_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = config.compile_timeout_secs {
            settings.engine.compile_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = config.interpolate_timeout_secs {
            settings.engine.interpolate_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = &config.fontc_path {
            settings.fontc_path = path.clone();
        }
        if let Some(target) = &config.default_target {
            settings.default_target = target.clone();
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_overrides_defaults() {
        let config = ConfigFile {
            auto_compile_delay_ms: Some(250),
            compile_timeout_secs: Some(5),
            default_target: Some("typing".to_string()),
            ..Default::default()
        };
        let settings = PipelineSettings::from_config(Some(&config));
        assert_eq!(settings.auto_compile_delay, Duration::from_millis(250));
        assert_eq!(settings.engine.compile_timeout, Duration::from_secs(5));
        assert_eq!(settings.engine.init_timeout, DEFAULT_INIT_TIMEOUT);
        assert_eq!(settings.default_target, "typing");
        assert_eq!(settings.fontc_path, PathBuf::from("fontc"));
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let settings = PipelineSettings::from_config(None);
        assert_eq!(settings.auto_compile_delay, Duration::from_secs(1));
        assert_eq!(settings.engine.interpolate_timeout, Duration::from_secs(10));
    }
}
