//! Command line interface for fontlive
//!
//! Handles parsing command line arguments and provides validation for user
//! inputs. Options are documented with examples to help users understand
//! the expected format.

use crate::core::config::{ConfigFile, PipelineSettings};
use crate::font_source::axes::parse_location;
use crate::font_source::{DesignLocation, Userspace};
use crate::pipeline::Target;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// fontlive CLI arguments
///
/// Examples:
///   fontlive compile MyFont.json -o MyFont.ttf             # Full export
///   fontlive compile MyFont.json --target typing -o t.ttf  # Fast typing preview
///   fontlive interpolate MyFont.json A --at wght=450       # Glyph layer as JSON
///   fontlive interpolate MyFont.json A B --svg             # Outlines as SVG paths
///   fontlive map MyFont.json --at wght=450                 # Userspace to designspace
///   fontlive watch MyFont.json -o preview.ttf              # Recompile on every save
///   fontlive --new-config                                  # Write default settings
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "fontlive",
    version,
    about = "Live compile and interpolation pipeline for font sources",
    long_about = "fontlive drives the fontc compiler from a background worker. It compiles font sources for named targets, interpolates glyphs at any design-space location, maps axis coordinates between userspace and designspace, and recompiles on change."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the fontc executable
    #[clap(
        long = "fontc",
        global = true,
        help = "Path to the fontc executable",
        long_help = "Path to the fontc executable. Overrides fontc_path from settings.json; defaults to looking up 'fontc' on PATH."
    )]
    pub fontc: Option<PathBuf>,

    /// Compile timeout in seconds
    #[clap(long = "compile-timeout", global = true, help = "Compile timeout in seconds")]
    pub compile_timeout: Option<u64>,

    /// Log at debug level (RUST_LOG still takes precedence)
    #[clap(long = "verbose", short = 'v', global = true, help = "Enable debug logging")]
    pub verbose: bool,

    /// Initialize user configuration directory with default settings
    ///
    /// This creates the ~/.config/fontlive directory with:
    /// - settings.json: timeouts, auto-compile delay, fontc path, default target
    /// - logs/: where daily log files are written
    #[clap(
        long = "new-config",
        help = "Initialize user config directory with default settings",
        long_help = "Initialize the ~/.config/fontlive directory with a settings.json file holding every default value, ready to be edited."
    )]
    pub new_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Compile a font source to a binary font
    Compile {
        /// Font source (.json font description or .ufo)
        source: PathBuf,

        /// Compile target: user, glyph_overview, typing, editing
        #[clap(long, short = 't')]
        target: Option<String>,

        /// Only compile these glyphs (comma separated), plus their components
        #[clap(long, value_delimiter = ',')]
        subset: Option<Vec<String>>,

        /// Output file
        #[clap(long, short = 'o', default_value = "out.ttf")]
        output: PathBuf,
    },

    /// Interpolate glyphs and print their layers as JSON
    Interpolate {
        source: PathBuf,

        /// Glyph names
        #[clap(required = true)]
        glyphs: Vec<String>,

        /// Location such as wght=450,wdth=100
        #[clap(long, default_value = "")]
        at: String,

        /// Read --at as designspace coordinates instead of userspace
        #[clap(long)]
        designspace: bool,

        /// Print SVG path data instead of layer JSON
        #[clap(long)]
        svg: bool,
    },

    /// Convert a location between userspace and designspace
    Map {
        source: PathBuf,

        /// Location such as wght=450,wdth=100
        #[clap(long)]
        at: String,

        /// Convert from designspace to userspace
        #[clap(long)]
        reverse: bool,
    },

    /// Recompile whenever the source changes
    Watch {
        source: PathBuf,

        /// Output file, rewritten after every successful compile
        #[clap(long, short = 'o', default_value = "preview.ttf")]
        output: PathBuf,

        /// Quiet period in milliseconds before compiling
        #[clap(long)]
        delay_ms: Option<u64>,
    },
}

impl Command {
    pub fn source(&self) -> &PathBuf {
        match self {
            Command::Compile { source, .. }
            | Command::Interpolate { source, .. }
            | Command::Map { source, .. }
            | Command::Watch { source, .. } => source,
        }
    }
}

impl CliArgs {
    /// Validate the CLI arguments after parsing
    ///
    /// This ensures that paths exist, targets are known and locations parse
    /// before any work starts, with clear error messages for common mistakes.
    pub fn validate(&self) -> Result<(), String> {
        let Some(command) = &self.command else {
            return Ok(());
        };

        let source = command.source();
        if !source.exists() {
            return Err(format!(
                "Font source does not exist: {}\nMake sure the path is correct and the file exists.",
                source.display()
            ));
        }

        match command {
            Command::Compile {
                target: Some(target),
                ..
            } => {
                if target.parse::<Target>().is_err() {
                    let available = Target::all_names().join(", ");
                    return Err(format!("Unknown target: '{target}'\nAvailable targets: {available}"));
                }
            }
            Command::Interpolate { at, .. } | Command::Map { at, .. } => {
                parse_location::<Userspace>(at)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Merge built-in defaults, settings.json and CLI flags
    ///
    /// Priority order:
    /// 1. CLI argument
    /// 2. Config file setting (~/.config/fontlive/settings.json)
    /// 3. Built-in default
    pub fn settings(&self, config: Option<&ConfigFile>) -> PipelineSettings {
        let mut settings = PipelineSettings::from_config(config);
        if let Some(fontc) = &self.fontc {
            debug!("Using fontc from CLI: {}", fontc.display());
            settings.fontc_path = fontc.clone();
        }
        if let Some(secs) = self.compile_timeout {
            settings.engine.compile_timeout = Duration::from_secs(secs);
        }
        if let Some(Command::Watch {
            delay_ms: Some(ms), ..
        }) = &self.command
        {
            settings.auto_compile_delay = Duration::from_millis(*ms);
        }
        settings
    }
}

/// Parse a `--designspace` location from the command line.
pub fn parse_design_location(text: &str) -> Result<DesignLocation, String> {
    parse_location(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile_command() {
        let args = CliArgs::parse_from([
            "fontlive", "compile", "font.json", "--target", "typing", "--subset", "A,B", "-o", "a.ttf",
        ]);
        match args.command {
            Some(Command::Compile {
                target,
                subset,
                output,
                ..
            }) => {
                assert_eq!(target.as_deref(), Some("typing"));
                assert_eq!(subset, Some(vec!["A".to_string(), "B".to_string()]));
                assert_eq!(output, PathBuf::from("a.ttf"));
            }
            other => panic!("expected compile, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = CliArgs::parse_from(["fontlive", "--fontc", "/opt/fontc", "watch", "f.json", "--delay-ms", "300"]);
        let config = ConfigFile {
            fontc_path: Some(PathBuf::from("/usr/bin/fontc")),
            auto_compile_delay_ms: Some(2000),
            compile_timeout_secs: Some(60),
            ..Default::default()
        };
        let settings = args.settings(Some(&config));
        assert_eq!(settings.fontc_path, PathBuf::from("/opt/fontc"));
        assert_eq!(settings.auto_compile_delay, Duration::from_millis(300));
        assert_eq!(settings.engine.compile_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_unknown_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("font.json");
        std::fs::write(&source, "{}").unwrap();

        let source = source.to_str().unwrap();
        let args = CliArgs::parse_from(["fontlive", "compile", source, "--target", "print"]);
        let error = args.validate().unwrap_err();
        assert!(error.contains("Unknown target: 'print'"));
    }

    #[test]
    fn test_validate_missing_source() {
        let args = CliArgs::parse_from(["fontlive", "map", "/nonexistent/font.json", "--at", "wght=400"]);
        assert!(args.validate().unwrap_err().contains("does not exist"));
    }
}
