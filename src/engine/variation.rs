//! Master-support variation model
//!
//! Masters are placed at normalized locations. Each master gets a support
//! region; a value at any location is the default master's value plus the
//! scaled deltas of every master whose region covers the location. This is
//! the same model OpenType variable fonts use, so interpolated previews
//! match the compiled font.

use crate::font_source::{
    axes::normalize_location, DesignLocation, FontSource, LayerData, NormalizedLocation, Shape,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Deepest component nesting resolved during interpolation
pub const MAX_COMPONENT_DEPTH: usize = 8;

/// Per-axis `(lower, peak, upper)` tents
type Region = BTreeMap<String, (f64, f64, f64)>;

#[derive(Debug, Clone)]
pub struct VariationModel {
    /// Master locations in model order, zero coordinates dropped
    locations: Vec<BTreeMap<String, f64>>,
    /// Model order index to caller's master index
    reverse_mapping: Vec<usize>,
    supports: Vec<Region>,
    delta_weights: Vec<Vec<(usize, f64)>>,
}

impl VariationModel {
    /// Build a model over master locations; `axis_order` ranks axes when
    /// masters are sorted. One master must sit at the origin.
    pub fn new(masters: &[NormalizedLocation], axis_order: &[String]) -> Result<Self, String> {
        let stripped: Vec<BTreeMap<String, f64>> = masters
            .iter()
            .map(|location| {
                location
                    .iter()
                    .filter(|(_, value)| *value != 0.0)
                    .map(|(tag, value)| (tag.to_string(), value))
                    .collect()
            })
            .collect();

        for (index, location) in stripped.iter().enumerate() {
            if stripped[..index].contains(location) {
                return Err(format!("two masters share the location {location:?}"));
            }
        }
        if !stripped.iter().any(BTreeMap::is_empty) {
            return Err("no master at the default location".to_string());
        }

        let axis_points = on_axis_points(&stripped);
        let mut order: Vec<usize> = (0..stripped.len()).collect();
        order.sort_by(|&a, &b| {
            sort_key(&stripped[a], &axis_points, axis_order)
                .partial_cmp(&sort_key(&stripped[b], &axis_points, axis_order))
                .unwrap_or(Ordering::Equal)
        });

        let locations: Vec<BTreeMap<String, f64>> =
            order.iter().map(|&index| stripped[index].clone()).collect();
        let supports = master_supports(&locations);
        let delta_weights = locations
            .iter()
            .enumerate()
            .map(|(i, location)| {
                supports[..i]
                    .iter()
                    .enumerate()
                    .filter_map(|(j, support)| {
                        let scalar = support_scalar(location, support);
                        (scalar != 0.0).then_some((j, scalar))
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            locations,
            reverse_mapping: order,
            supports,
            delta_weights,
        })
    }

    /// Turn per-master value vectors (in the caller's master order) into
    /// deltas in model order.
    pub fn deltas(&self, master_values: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, String> {
        if master_values.len() != self.locations.len() {
            return Err(format!(
                "expected {} master values, got {}",
                self.locations.len(),
                master_values.len()
            ));
        }
        let width = master_values[0].len();
        if master_values.iter().any(|values| values.len() != width) {
            return Err("master values differ in length".to_string());
        }

        let mut out: Vec<Vec<f64>> = Vec::with_capacity(master_values.len());
        for (i, weights) in self.delta_weights.iter().enumerate() {
            let mut delta = master_values[self.reverse_mapping[i]].clone();
            for &(j, weight) in weights {
                for (value, earlier) in delta.iter_mut().zip(&out[j]) {
                    *value -= earlier * weight;
                }
            }
            out.push(delta);
        }
        Ok(out)
    }

    /// Contribution of each model-order master at `location`
    pub fn scalars(&self, location: &NormalizedLocation) -> Vec<f64> {
        let location: BTreeMap<String, f64> = location
            .iter()
            .map(|(tag, value)| (tag.to_string(), value))
            .collect();
        self.supports
            .iter()
            .map(|support| support_scalar(&location, support))
            .collect()
    }

    pub fn interpolate(
        &self,
        location: &NormalizedLocation,
        master_values: &[Vec<f64>],
    ) -> Result<Vec<f64>, String> {
        let deltas = self.deltas(master_values)?;
        let mut result = vec![0.0; deltas[0].len()];
        for (delta, scalar) in deltas.iter().zip(self.scalars(location)) {
            if scalar == 0.0 {
                continue;
            }
            for (value, d) in result.iter_mut().zip(delta) {
                *value += d * scalar;
            }
        }
        Ok(result)
    }
}

/// Values each axis takes on masters that lie on a single axis, plus zero.
fn on_axis_points(locations: &[BTreeMap<String, f64>]) -> BTreeMap<String, Vec<f64>> {
    let mut points: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for location in locations {
        if location.len() != 1 {
            continue;
        }
        for (tag, value) in location {
            let entry = points.entry(tag.clone()).or_insert_with(|| vec![0.0]);
            if !entry.contains(value) {
                entry.push(*value);
            }
        }
    }
    points
}

/// Sort key: fewer axes first, on-axis points first, then axis order,
/// direction and distance from the origin.
fn sort_key(
    location: &BTreeMap<String, f64>,
    axis_points: &BTreeMap<String, Vec<f64>>,
    axis_order: &[String],
) -> (usize, isize, Vec<usize>, Vec<String>, Vec<i8>, Vec<f64>) {
    let on_point = location
        .iter()
        .filter(|(tag, value)| {
            axis_points
                .get(*tag)
                .map(|points| points.contains(*value))
                .unwrap_or(false)
        })
        .count();

    let mut ordered: Vec<&String> = axis_order
        .iter()
        .filter(|tag| location.contains_key(*tag))
        .collect();
    ordered.extend(location.keys().filter(|tag| !axis_order.contains(*tag)));

    let rank = ordered
        .iter()
        .map(|tag| {
            axis_order
                .iter()
                .position(|t| t == *tag)
                .unwrap_or(0x10000)
        })
        .collect();
    let values: Vec<f64> = ordered.iter().map(|tag| location[*tag]).collect();
    let signs = values
        .iter()
        .map(|v| if *v < 0.0 { -1 } else { i8::from(*v > 0.0) })
        .collect();

    (
        location.len(),
        -(on_point as isize),
        rank,
        ordered.into_iter().cloned().collect(),
        signs,
        values.iter().map(|v| v.abs()).collect(),
    )
}

fn master_supports(locations: &[BTreeMap<String, f64>]) -> Vec<Region> {
    let mut min_v: BTreeMap<&str, f64> = BTreeMap::new();
    let mut max_v: BTreeMap<&str, f64> = BTreeMap::new();
    for location in locations {
        for (tag, value) in location {
            let min = min_v.entry(tag).or_insert(*value);
            *min = min.min(*value);
            let max = max_v.entry(tag).or_insert(*value);
            *max = max.max(*value);
        }
    }

    let regions: Vec<Region> = locations
        .iter()
        .map(|location| {
            location
                .iter()
                .map(|(tag, value)| {
                    let tent = if *value > 0.0 {
                        (0.0, *value, max_v[tag.as_str()])
                    } else {
                        (min_v[tag.as_str()], *value, 0.0)
                    };
                    (tag.clone(), tent)
                })
                .collect()
        })
        .collect();

    let mut supports = Vec::with_capacity(regions.len());
    for (i, region) in regions.iter().enumerate() {
        let axes: BTreeSet<&String> = region.keys().collect();
        let mut region = region.clone();

        for previous in &regions[..i] {
            if previous.keys().collect::<BTreeSet<_>>() != axes {
                continue;
            }
            let inside = region.iter().all(|(tag, (lower, peak, upper))| {
                let value = previous[tag].1;
                value == *peak || (*lower < value && value < *upper)
            });
            if !inside {
                continue;
            }

            // Shrink the region along the axes where the earlier master
            // sits closest to this one
            let mut best_axes: BTreeMap<String, (f64, f64, f64)> = BTreeMap::new();
            let mut best_ratio = -1.0;
            for (tag, (_, value, _)) in previous {
                let (lower, peak, upper) = region[tag];
                let (new_lower, new_upper, ratio) = if *value < peak {
                    (*value, upper, (value - peak) / (lower - peak))
                } else if peak < *value {
                    (lower, *value, (value - peak) / (upper - peak))
                } else {
                    continue;
                };
                if ratio > best_ratio {
                    best_axes.clear();
                    best_ratio = ratio;
                }
                if ratio == best_ratio {
                    best_axes.insert(tag.clone(), (new_lower, peak, new_upper));
                }
            }
            region.extend(best_axes);
        }
        supports.push(region);
    }
    supports
}

/// Weight of a support region at a location, in 0..=1.
pub fn support_scalar(location: &BTreeMap<String, f64>, support: &Region) -> f64 {
    let mut scalar = 1.0;
    for (tag, &(lower, peak, upper)) in support {
        if peak == 0.0 || lower > peak || peak > upper || (lower < 0.0 && upper > 0.0) {
            continue;
        }
        let value = location.get(tag).copied().unwrap_or(0.0);
        if value == peak {
            continue;
        }
        if value <= lower || upper <= value {
            return 0.0;
        }
        scalar *= if value < peak {
            (value - lower) / (peak - lower)
        } else {
            (value - upper) / (peak - upper)
        };
    }
    scalar
}

/// Interpolate one glyph of `font` at a designspace location, resolving
/// component layers recursively.
pub fn interpolate_glyph(
    font: &FontSource,
    glyph_name: &str,
    location: &DesignLocation,
) -> Result<LayerData, String> {
    let normalized = normalize_location(location, &font.axes);
    interpolate_at(font, glyph_name, &normalized, 0)
}

fn interpolate_at(
    font: &FontSource,
    glyph_name: &str,
    location: &NormalizedLocation,
    depth: usize,
) -> Result<LayerData, String> {
    if depth > MAX_COMPONENT_DEPTH {
        return Err(format!(
            "component nesting deeper than {MAX_COMPONENT_DEPTH} at '{glyph_name}'"
        ));
    }
    let glyph = font
        .glyph(glyph_name)
        .ok_or_else(|| format!("glyph '{glyph_name}' not found"))?;

    let mut master_locations = Vec::new();
    let mut layers = Vec::new();
    for master in &font.masters {
        if let Some(layer) = glyph.layer_for(&master.id) {
            master_locations.push(normalize_location(&master.location, &font.axes));
            layers.push(layer);
        }
    }
    let Some(reference) = layers.first().copied() else {
        return Err(format!("glyph '{glyph_name}' has no master layers"));
    };

    let mut layer = if layers.len() == 1 {
        reference.clone()
    } else {
        let axis_order: Vec<String> = font.axes.iter().map(|axis| axis.tag.clone()).collect();
        let model = VariationModel::new(&master_locations, &axis_order)
            .map_err(|e| format!("glyph '{glyph_name}': {e}"))?;
        let values = layers
            .iter()
            .map(|layer| flatten(reference, layer))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("glyph '{glyph_name}' masters are incompatible: {e}"))?;
        let interpolated = model.interpolate(location, &values)?;
        rebuild(reference, &interpolated)
    };

    for shape in &mut layer.shapes {
        if let Shape::Component {
            reference,
            layer: resolved,
            ..
        } = shape
        {
            let component = interpolate_at(font, reference, location, depth + 1)?;
            *resolved = Some(Box::new(component));
        }
    }
    Ok(layer)
}

/// Collect the interpolatable numbers of `layer`, checking that its
/// structure matches `reference`.
fn flatten(reference: &LayerData, layer: &LayerData) -> Result<Vec<f64>, String> {
    let mut values = vec![layer.width];

    if reference.shapes.len() != layer.shapes.len() {
        return Err(format!(
            "{} shapes against {}",
            layer.shapes.len(),
            reference.shapes.len()
        ));
    }
    for (index, (expected, shape)) in reference.shapes.iter().zip(&layer.shapes).enumerate() {
        match (expected, shape) {
            (Shape::Path { nodes: a, .. }, Shape::Path { nodes: b, .. }) => {
                if a.len() != b.len() {
                    return Err(format!("shape {index} has {} nodes against {}", b.len(), a.len()));
                }
                if a.iter().zip(b).any(|(n, m)| n.node_type != m.node_type) {
                    return Err(format!("shape {index} node types differ"));
                }
                values.extend(b.iter().flat_map(|node| [node.x, node.y]));
            }
            (
                Shape::Component { reference: a, .. },
                Shape::Component {
                    reference: b,
                    transform,
                    ..
                },
            ) if a == b => values.extend_from_slice(transform),
            _ => return Err(format!("shape {index} differs in kind or component")),
        }
    }

    for anchor in &reference.anchors {
        let matching = layer
            .anchors
            .iter()
            .find(|a| a.name == anchor.name)
            .ok_or_else(|| format!("anchor '{}' missing", anchor.name))?;
        values.extend([matching.x, matching.y]);
    }
    Ok(values)
}

/// Inverse of [`flatten`]: lay `values` back onto `reference`'s structure.
fn rebuild(reference: &LayerData, values: &[f64]) -> LayerData {
    let mut values = values.iter().copied();
    let mut next = || values.next().unwrap_or(0.0);

    let mut layer = reference.clone();
    layer.width = next();
    for shape in &mut layer.shapes {
        match shape {
            Shape::Path { nodes, .. } => {
                for node in nodes {
                    node.x = next();
                    node.y = next();
                }
            }
            Shape::Component { transform, .. } => {
                for value in transform.iter_mut() {
                    *value = next();
                }
            }
        }
    }
    for anchor in &mut layer.anchors {
        anchor.x = next();
        anchor.y = next();
    }
    layer
}
