//! UFO file I/O operations
//!
//! Importing a single UFO as a font source, and exporting a font source as
//! one UFO per master plus a `.designspace` document for fontc.

use crate::font_source::{FontSource, LayerData, Master, MasterLayer, VerticalMetrics};
use anyhow::{Context, Result};
use norad::designspace::{self, DesignSpaceDocument};
use norad::Font;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_MASTER_ID: &str = "default";

/// Load a UFO from disk as a single-master font source
pub fn load_ufo_source(path: &Path) -> Result<FontSource> {
    let font = Font::load(path).with_context(|| format!("Failed to load UFO {}", path.display()))?;

    let glyphs = font
        .default_layer()
        .iter()
        .map(|glyph| crate::font_source::Glyph {
            name: glyph.name().to_string(),
            codepoints: glyph.codepoints.iter().map(|c| c as u32).collect(),
            layers: vec![MasterLayer {
                master_id: DEFAULT_MASTER_ID.to_string(),
                layer: LayerData::from_norad_glyph(glyph),
            }],
        })
        .collect();

    let kerning = font
        .kerning
        .iter()
        .map(|(left, pairs)| {
            let pairs = pairs
                .iter()
                .map(|(right, value)| (right.to_string(), *value))
                .collect();
            (left.to_string(), pairs)
        })
        .collect();

    let units_per_em = font
        .font_info
        .units_per_em
        .map(|v| v.to_string().parse().unwrap_or(1000.0))
        .unwrap_or(1000.0);

    Ok(FontSource {
        family_name: font.font_info.family_name.clone().unwrap_or_default(),
        units_per_em,
        metrics: VerticalMetrics::from_norad_font_info(&font.font_info),
        axes: Vec::new(),
        masters: vec![Master {
            id: DEFAULT_MASTER_ID.to_string(),
            name: font.font_info.style_name.clone().unwrap_or_else(|| "Regular".to_string()),
            location: Default::default(),
            kerning,
        }],
        glyphs,
        features: font.features.clone(),
    })
}

/// Options controlling which parts of the source reach the written UFOs
#[derive(Debug, Clone, Copy)]
pub struct ExportParts {
    pub kerning: bool,
    pub features: bool,
    pub metrics: bool,
    pub outlines: bool,
}

impl Default for ExportParts {
    fn default() -> Self {
        Self {
            kerning: true,
            features: true,
            metrics: true,
            outlines: true,
        }
    }
}

/// Build the norad font for one master
pub fn master_to_norad(source: &FontSource, master: &Master, parts: ExportParts) -> Result<Font> {
    let mut font = Font::new();

    font.font_info.family_name = Some(source.family_name.clone());
    font.font_info.style_name = Some(master.name.clone());
    if let Some(upm) = norad::fontinfo::NonNegativeIntegerOrFloat::new(source.units_per_em) {
        font.font_info.units_per_em = Some(upm);
    }
    if parts.metrics {
        source.metrics.apply_to_norad_font_info(&mut font.font_info);
    }
    if parts.features {
        font.features = source.features.clone();
    }
    if parts.kerning {
        for (left, pairs) in &master.kerning {
            let left: norad::Name = left
                .parse()
                .with_context(|| format!("Invalid kerning glyph name '{left}'"))?;
            let entry = font.kerning.entry(left).or_default();
            for (right, value) in pairs {
                let right: norad::Name = right
                    .parse()
                    .with_context(|| format!("Invalid kerning glyph name '{right}'"))?;
                entry.insert(right, *value);
            }
        }
    }

    let layer = font.default_layer_mut();
    for glyph in &source.glyphs {
        if let Some(layer_data) = glyph.layer_for(&master.id) {
            let norad_glyph = layer_data
                .to_norad_glyph(&glyph.name, &glyph.codepoints, parts.outlines)
                .with_context(|| format!("Failed to convert glyph '{}'", glyph.name))?;
            layer.insert_glyph(norad_glyph);
        }
    }

    Ok(font)
}

/// Write every master to `dir` and return the path fontc should compile:
/// the UFO itself for single-master sources, a designspace otherwise.
pub fn write_compile_sources(source: &FontSource, dir: &Path, parts: ExportParts) -> Result<PathBuf> {
    let mut ufo_names = Vec::with_capacity(source.masters.len());
    for (index, master) in source.masters.iter().enumerate() {
        let font = master_to_norad(source, master, parts)?;
        let file_name = format!("master-{index}.ufo");
        let path = dir.join(&file_name);
        font.save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        ufo_names.push(file_name);
    }

    if source.axes.is_empty() && source.masters.len() == 1 {
        return Ok(dir.join(&ufo_names[0]));
    }

    let document = designspace_document(source, &ufo_names);
    let path = dir.join("font.designspace");
    document
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Wrote designspace with {} sources to {}", ufo_names.len(), path.display());
    Ok(path)
}

fn designspace_document(source: &FontSource, ufo_names: &[String]) -> DesignSpaceDocument {
    let axis_name = |axis: &crate::font_source::Axis| {
        if axis.name.is_empty() {
            axis.tag.clone()
        } else {
            axis.name.clone()
        }
    };

    let axes = source
        .axes
        .iter()
        .map(|axis| designspace::Axis {
            name: axis_name(axis),
            tag: axis.tag.clone(),
            default: axis.default as f32,
            hidden: axis.hidden,
            minimum: Some(axis.min as f32),
            maximum: Some(axis.max as f32),
            map: (!axis.map.is_empty()).then(|| {
                axis.map
                    .0
                    .iter()
                    .map(|&(input, output)| designspace::AxisMapping {
                        input: input as f32,
                        output: output as f32,
                    })
                    .collect()
            }),
            ..Default::default()
        })
        .collect();

    let sources = source
        .masters
        .iter()
        .zip(ufo_names)
        .map(|(master, file_name)| designspace::Source {
            familyname: Some(source.family_name.clone()),
            stylename: Some(master.name.clone()),
            name: Some(master.name.clone()),
            filename: file_name.clone(),
            location: source
                .axes
                .iter()
                .map(|axis| designspace::Dimension {
                    name: axis_name(axis),
                    xvalue: Some(
                        master
                            .location
                            .get(&axis.tag)
                            .unwrap_or_else(|| axis.user_to_designspace(axis.default))
                            as f32,
                    ),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        })
        .collect();

    DesignSpaceDocument {
        format: 5.0,
        axes,
        sources,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font_source::tests::sample_font;

    #[test]
    fn test_designspace_lists_axes_and_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_compile_sources(&sample_font(), dir.path(), ExportParts::default()).unwrap();

        let document = DesignSpaceDocument::load(&path).unwrap();
        assert_eq!(document.axes.len(), 1);
        let weight = &document.axes[0];
        assert_eq!(weight.tag, "wght");
        assert_eq!(weight.minimum, Some(100.0));
        assert!(weight
            .map
            .as_ref()
            .unwrap()
            .contains(&designspace::AxisMapping { input: 400.0, output: 30.0 }));

        assert_eq!(document.sources.len(), 2);
        assert_eq!(document.sources[1].filename, "master-1.ufo");
        assert_eq!(document.sources[1].location[0].xvalue, Some(100.0));
    }

    #[test]
    fn test_write_and_reload_single_master() {
        let dir = tempfile::tempdir().unwrap();
        let mut font = sample_font();
        font.axes.clear();
        font.masters.truncate(1);

        let path = write_compile_sources(&font, dir.path(), ExportParts::default()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("ufo"));

        let reloaded = load_ufo_source(&path).unwrap();
        assert_eq!(reloaded.family_name, "Sample Sans");
        assert_eq!(reloaded.glyphs.len(), font.glyphs.len());
        assert_eq!(reloaded.metrics.ascender, Some(800.0));
        let a = reloaded.glyph("A").unwrap();
        assert_eq!(a.codepoints, vec![0x41]);
        assert_eq!(a.layers[0].layer.width, 500.0);
    }

    #[test]
    fn test_export_parts_drop_features_and_metrics() {
        let mut font = sample_font();
        font.features = "languagesystem DFLT dflt;".to_string();
        let parts = ExportParts {
            features: false,
            metrics: false,
            ..Default::default()
        };
        let norad_font = master_to_norad(&font, &font.masters[0], parts).unwrap();
        assert!(norad_font.features.is_empty());
        assert_eq!(norad_font.font_info.ascender, None);
    }
}
