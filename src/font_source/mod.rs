//! Font source data structures
//!
//! This module contains the serialized font description the editor hands to
//! the compiler engine: axes, masters placed in designspace, glyphs with one
//! layer per master, kerning, features and vertical metrics.

pub mod axes;
pub mod layer;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

pub use axes::{
    Axis, AxisMap, DesignLocation, Designspace, Location, Normalized, NormalizedLocation,
    UserLocation, Userspace,
};
pub use layer::{Anchor, Guide, LayerData, Node, NodeType, Shape};

/// Kerning pairs as `left -> right -> value`
pub type Kerning = BTreeMap<String, BTreeMap<String, f64>>;

/// A complete font description, as serialized to the compiler engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontSource {
    #[serde(default)]
    pub family_name: String,
    #[serde(default = "default_units_per_em")]
    pub units_per_em: f64,
    #[serde(default)]
    pub metrics: VerticalMetrics,
    #[serde(default)]
    pub axes: Vec<Axis>,
    pub masters: Vec<Master>,
    #[serde(default)]
    pub glyphs: Vec<Glyph>,
    /// OpenType feature code in AFDKO syntax
    #[serde(default)]
    pub features: String,
}

fn default_units_per_em() -> f64 {
    1000.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerticalMetrics {
    pub ascender: Option<f64>,
    pub descender: Option<f64>,
    pub cap_height: Option<f64>,
    pub x_height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Master {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: DesignLocation,
    #[serde(default)]
    pub kerning: Kerning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub name: String,
    #[serde(default)]
    pub codepoints: Vec<u32>,
    #[serde(default)]
    pub layers: Vec<MasterLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterLayer {
    pub master_id: String,
    #[serde(flatten)]
    pub layer: LayerData,
}

impl Glyph {
    pub fn layer_for(&self, master_id: &str) -> Option<&LayerData> {
        self.layers
            .iter()
            .find(|l| l.master_id == master_id)
            .map(|l| &l.layer)
    }
}

impl FontSource {
    /// Load a font from a `.json` font description or a `.ufo` directory.
    pub fn load(path: &Path) -> Result<Self> {
        let is_ufo = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("ufo"))
            .unwrap_or(false);

        let font = if is_ufo {
            crate::data::ufo::load_ufo_source(path)?
        } else {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read font source {}", path.display()))?;
            Self::from_json(&contents)
                .with_context(|| format!("Failed to parse font source {}", path.display()))?
        };

        for problem in font.validate() {
            warn!("{}: {}", path.display(), problem);
        }
        debug!(
            "Loaded '{}' with {} glyphs, {} masters and {} axes",
            font.family_name,
            font.glyphs.len(),
            font.masters.len(),
            font.axes.len()
        );
        Ok(font)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn axis(&self, tag: &str) -> Option<&Axis> {
        self.axes.iter().find(|axis| axis.tag == tag)
    }

    pub fn glyph(&self, name: &str) -> Option<&Glyph> {
        self.glyphs.iter().find(|glyph| glyph.name == name)
    }

    pub fn glyph_mut(&mut self, name: &str) -> Option<&mut Glyph> {
        self.glyphs.iter_mut().find(|glyph| glyph.name == name)
    }

    /// Describe data problems that do not prevent loading.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut tags = BTreeSet::new();
        for axis in &self.axes {
            if !tags.insert(axis.tag.as_str()) {
                problems.push(format!("duplicate axis tag '{}'", axis.tag));
            }
            if axis.tag.len() != 4 {
                problems.push(format!("axis tag '{}' is not four characters", axis.tag));
            }
            if !axis.map.is_invertible() {
                problems.push(format!(
                    "axis '{}' map is not monotonic in designspace; designspace to userspace conversion will be approximate",
                    axis.tag
                ));
            }
        }

        if self.masters.is_empty() {
            problems.push("font has no masters".to_string());
        }

        let master_ids: BTreeSet<&str> = self.masters.iter().map(|m| m.id.as_str()).collect();
        for glyph in &self.glyphs {
            for layer in &glyph.layers {
                if !master_ids.contains(layer.master_id.as_str()) {
                    problems.push(format!(
                        "glyph '{}' has a layer for unknown master '{}'",
                        glyph.name, layer.master_id
                    ));
                }
            }
        }

        problems
    }

    /// Keep only `names`, `.notdef` and every glyph they reach through
    /// components.
    pub fn retain_glyphs(&mut self, names: &[String]) {
        let mut keep: BTreeSet<String> = names.iter().cloned().collect();
        keep.insert(".notdef".to_string());

        let mut queue: Vec<String> = keep.iter().cloned().collect();
        while let Some(name) = queue.pop() {
            let Some(glyph) = self.glyph(&name) else {
                continue;
            };
            for layer in &glyph.layers {
                for reference in layer.layer.component_references() {
                    if keep.insert(reference.to_string()) {
                        queue.push(reference.to_string());
                    }
                }
            }
        }

        let before = self.glyphs.len();
        self.glyphs.retain(|glyph| keep.contains(&glyph.name));
        for master in &mut self.masters {
            master.kerning.retain(|left, _| keep.contains(left));
            for pairs in master.kerning.values_mut() {
                pairs.retain(|right, _| keep.contains(right));
            }
        }
        debug!("Subset font from {} to {} glyphs", before, self.glyphs.len());
    }
}
