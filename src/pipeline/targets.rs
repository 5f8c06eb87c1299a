//! Named compile targets
//!
//! Each target is a fixed set of compiler options tuned for one use: full
//! exports, glyph overviews, typing previews and the auto-compile loop.

use crate::core::errors::PipelineError;
use crate::engine::CompileOptions;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Full-fidelity export
    User,
    /// Outlines and metrics only, for the glyph grid
    GlyphOverview,
    /// Keep metrics and outlines, development glyph names
    Typing,
    /// Full fidelity minus production naming, optionally subset
    Editing,
}

impl Target {
    pub const ALL: [Target; 4] = [Target::User, Target::GlyphOverview, Target::Typing, Target::Editing];

    pub fn name(&self) -> &'static str {
        match self {
            Target::User => "user",
            Target::GlyphOverview => "glyph_overview",
            Target::Typing => "typing",
            Target::Editing => "editing",
        }
    }

    pub fn all_names() -> Vec<&'static str> {
        Self::ALL.iter().map(Target::name).collect()
    }

    /// Options for this target, restricted to `subset` when given.
    pub fn options(&self, subset: Option<Vec<String>>) -> CompileOptions {
        let mut options = match self {
            Target::User => CompileOptions::default(),
            Target::GlyphOverview => CompileOptions {
                skip_kerning: true,
                skip_features: true,
                ..Default::default()
            },
            Target::Typing => CompileOptions {
                skip_kerning: true,
                dont_use_production_names: true,
                ..Default::default()
            },
            Target::Editing => CompileOptions {
                dont_use_production_names: true,
                ..Default::default()
            },
        };
        options.subset_glyphs = subset;
        options
    }
}

impl FromStr for Target {
    type Err = PipelineError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|target| target.name() == name)
            .ok_or_else(|| PipelineError::UnknownTarget(name.to_string()))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
