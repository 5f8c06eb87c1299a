//! Compiler engine backed by the `fontc` executable
//!
//! Compiling writes the source out as UFO masters plus a designspace in a
//! scratch directory and runs fontc on it. Interpolation does not need fontc
//! and runs the variation model in-process.

use super::protocol::CompileOptions;
use super::variation;
use super::CompilerEngine;
use crate::data::ufo::{write_compile_sources, ExportParts};
use crate::font_source::{DesignLocation, FontSource, LayerData};
use std::borrow::Cow;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

pub const DEFAULT_FONTC: &str = "fontc";

pub struct FontcEngine {
    fontc: PathBuf,
    version: Option<String>,
}

impl FontcEngine {
    pub fn new(fontc: impl Into<PathBuf>) -> Self {
        Self {
            fontc: fontc.into(),
            version: None,
        }
    }

    fn export_parts(options: &CompileOptions) -> ExportParts {
        ExportParts {
            kerning: !options.skip_kerning,
            features: !options.skip_features,
            metrics: !options.skip_metrics,
            outlines: !options.skip_outlines,
        }
    }

    /// The glyphs that reach fontc. An empty subset list means no subsetting.
    fn compile_source<'a>(font: &'a FontSource, options: &CompileOptions) -> Cow<'a, FontSource> {
        match &options.subset_glyphs {
            Some(glyphs) if !glyphs.is_empty() => {
                let mut subset = font.clone();
                subset.retain_glyphs(glyphs);
                Cow::Owned(subset)
            }
            _ => Cow::Borrowed(font),
        }
    }

    fn run_fontc(&self, font: &FontSource, options: &CompileOptions) -> anyhow::Result<Vec<u8>> {
        let scratch = tempfile::Builder::new().prefix("fontlive-").tempdir()?;
        let source = write_compile_sources(font, scratch.path(), Self::export_parts(options))?;
        let output = scratch.path().join("font.ttf");

        let mut cmd = Command::new(&self.fontc);
        cmd.arg(&source).arg("--output-file").arg(&output);
        if options.dont_use_production_names {
            cmd.arg("--no-production-names");
        }
        debug!("Running {:?}", cmd);

        let result = cmd
            .output()
            .map_err(|e| anyhow::anyhow!("Failed to run {}: {}", self.fontc.display(), e))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!("fontc compilation failed: {}", stderr.trim());
        }

        Ok(std::fs::read(&output)?)
    }
}

impl Default for FontcEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FONTC)
    }
}

impl CompilerEngine for FontcEngine {
    fn version(&self) -> String {
        self.version
            .clone()
            .unwrap_or_else(|| "fontc (version unknown)".to_string())
    }

    fn check_capabilities(&mut self) -> Result<(), String> {
        let output = Command::new(&self.fontc)
            .arg("--version")
            .output()
            .map_err(|e| format!("fontc is not available at '{}': {}", self.fontc.display(), e))?;
        if !output.status.success() {
            return Err(format!(
                "'{} --version' exited with {}",
                self.fontc.display(),
                output.status
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("Found {}", version);
        self.version = Some(version);
        Ok(())
    }

    fn compile(&mut self, font: &FontSource, options: &CompileOptions) -> Result<Vec<u8>, String> {
        let font = Self::compile_source(font, options);
        self.run_fontc(&font, options).map_err(|e| format!("{e:#}"))
    }

    fn interpolate(
        &mut self,
        font: &FontSource,
        glyph_name: &str,
        location: &DesignLocation,
    ) -> Result<LayerData, String> {
        variation::interpolate_glyph(font, glyph_name, location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font_source::tests::sample_font;

    #[test]
    fn test_missing_executable_fails_capability_check() {
        let mut engine = FontcEngine::new("/nonexistent/fontc-binary");
        let error = engine.check_capabilities().unwrap_err();
        assert!(error.contains("not available"));
        assert_eq!(engine.version(), "fontc (version unknown)");
    }

    #[test]
    fn test_skip_options_map_to_export_parts() {
        let parts = FontcEngine::export_parts(&CompileOptions {
            skip_kerning: true,
            skip_outlines: true,
            ..Default::default()
        });
        assert!(!parts.kerning);
        assert!(parts.features);
        assert!(parts.metrics);
        assert!(!parts.outlines);
    }

    #[test]
    fn test_empty_subset_keeps_every_glyph() {
        let font = sample_font();
        let options = CompileOptions {
            subset_glyphs: Some(Vec::new()),
            ..Default::default()
        };
        let source = FontcEngine::compile_source(&font, &options);
        assert_eq!(source.glyphs.len(), font.glyphs.len());

        let options = CompileOptions {
            subset_glyphs: Some(vec!["Aacute".to_string()]),
            ..Default::default()
        };
        let source = FontcEngine::compile_source(&font, &options);
        let mut names: Vec<&str> = source.glyphs.iter().map(|g| g.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["A", "Aacute"]);
    }

    #[test]
    fn test_interpolation_runs_without_fontc() {
        let mut engine = FontcEngine::new("/nonexistent/fontc-binary");
        let layer = engine
            .interpolate(&sample_font(), "C", &DesignLocation::new().with("wght", 100.0))
            .unwrap();
        assert_eq!(layer.width, 580.0);
    }
}
