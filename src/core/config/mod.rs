//! Application configuration management
//!
//! - User configuration file (`settings.json`)
//! - Built-in defaults and the merged pipeline settings

pub mod settings;
pub mod user_config;

pub use settings::PipelineSettings;
pub use user_config::ConfigFile;
