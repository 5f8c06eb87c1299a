//! Core application functionality
//!
//! This module contains the application shell around the pipeline:
//! - CLI handling and configuration layering
//! - Error types shared by every component
//! - Running the selected command

pub mod cli;
pub mod config;
pub mod errors;
pub mod platform;
pub mod runner;

// Re-export commonly used items
pub use cli::CliArgs;
pub use config::{ConfigFile, PipelineSettings};
pub use errors::{PipelineError, PipelineResult};
pub use runner::run_app;
