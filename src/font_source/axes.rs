//! Variation axes and coordinate-space mapping
//!
//! A font exposes three coordinate spaces for its variation axes:
//!
//! - **userspace**: the values a slider shows (e.g. weight 100..900)
//! - **designspace**: the values masters are drawn at, reached from userspace
//!   through each axis's [`AxisMap`]
//! - **normalized**: designspace rescaled to -1..1 around the axis default
//!
//! [`Location`] carries its space as a type parameter so a bare map of
//! coordinates can never be handed to code expecting another space.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// Piecewise-linear correspondence between userspace and designspace for one
/// axis, as `(user, designspace)` control points sorted by user coordinate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisMap(pub Vec<(f64, f64)>);

impl AxisMap {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self(points)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the map is non-decreasing in both coordinates, so that running
    /// the forward algorithm on swapped pairs gives a true inverse.
    pub fn is_invertible(&self) -> bool {
        self.0
            .windows(2)
            .all(|pair| pair[0].0 <= pair[1].0 && pair[0].1 <= pair[1].1)
    }

    fn swapped(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.0.iter().map(|&(user, design)| (design, user))
    }
}

/// Map a userspace value to designspace through `map`.
pub fn map_user_to_designspace(value: f64, map: &AxisMap) -> f64 {
    piecewise_linear(value, map.0.iter().copied())
}

/// Map a designspace value back to userspace by running the forward algorithm
/// on the swapped control points.
///
/// Maps that are not monotonic in the designspace coordinate give a
/// deterministic but not necessarily inverse result.
pub fn map_designspace_to_userspace(value: f64, map: &AxisMap) -> f64 {
    piecewise_linear(value, map.swapped())
}

/// Interpolate `value` over `(input, output)` control points.
///
/// Clamps outside the first and last inputs and returns control point outputs
/// exactly. Empty input is the identity. Unsorted input never panics: when no
/// segment brackets the value the last point's output is used.
fn piecewise_linear(value: f64, points: impl Iterator<Item = (f64, f64)>) -> f64 {
    let points: Vec<(f64, f64)> = points.collect();
    let (Some(&first), Some(&last)) = (points.first(), points.last()) else {
        return value;
    };

    if value <= first.0 {
        return first.1;
    }
    if value >= last.0 {
        return last.1;
    }

    for segment in points.windows(2) {
        let (x0, y0) = segment[0];
        let (x1, y1) = segment[1];
        if value == x0 {
            return y0;
        }
        if value == x1 {
            return y1;
        }
        if x0 < value && value < x1 {
            let t = (value - x0) / (x1 - x0);
            return y0 + t * (y1 - y0);
        }
    }

    last.1
}

/// One variation axis of a font.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Four-letter OpenType tag, e.g. `wght`
    pub tag: String,
    #[serde(default)]
    pub name: String,
    /// Userspace minimum
    pub min: f64,
    /// Userspace default
    pub default: f64,
    /// Userspace maximum
    pub max: f64,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub map: AxisMap,
}

impl Axis {
    pub fn new(tag: &str, min: f64, default: f64, max: f64) -> Self {
        Self {
            tag: tag.to_string(),
            name: tag.to_string(),
            min,
            default,
            max,
            hidden: false,
            map: AxisMap::default(),
        }
    }

    pub fn with_map(mut self, points: Vec<(f64, f64)>) -> Self {
        self.map = AxisMap::new(points);
        self
    }

    pub fn user_to_designspace(&self, value: f64) -> f64 {
        map_user_to_designspace(value, &self.map)
    }

    pub fn designspace_to_user(&self, value: f64) -> f64 {
        map_designspace_to_userspace(value, &self.map)
    }

    /// The axis bounds in designspace as `(min, default, max)`.
    pub fn designspace_bounds(&self) -> (f64, f64, f64) {
        (
            self.user_to_designspace(self.min),
            self.user_to_designspace(self.default),
            self.user_to_designspace(self.max),
        )
    }

    /// Normalize a designspace value to -1..1 around the axis default.
    pub fn normalize(&self, value: f64) -> f64 {
        let (min, default, max) = self.designspace_bounds();
        if value < default {
            if default <= min {
                return 0.0;
            }
            ((value - default) / (default - min)).max(-1.0)
        } else if value > default {
            if max <= default {
                return 0.0;
            }
            ((value - default) / (max - default)).min(1.0)
        } else {
            0.0
        }
    }
}

/// Marker for userspace locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Userspace;

/// Marker for designspace locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Designspace;

/// Marker for normalized locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Normalized;

/// Axis tag to coordinate, in the space named by `S`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Location<S> {
    coords: BTreeMap<String, f64>,
    #[serde(skip)]
    space: PhantomData<S>,
}

pub type UserLocation = Location<Userspace>;
pub type DesignLocation = Location<Designspace>;
pub type NormalizedLocation = Location<Normalized>;

impl<S> Location<S> {
    pub fn new() -> Self {
        Self {
            coords: BTreeMap::new(),
            space: PhantomData,
        }
    }

    pub fn with(mut self, tag: &str, value: f64) -> Self {
        self.set(tag, value);
        self
    }

    pub fn set(&mut self, tag: &str, value: f64) {
        self.coords.insert(tag.to_string(), value);
    }

    pub fn get(&self, tag: &str) -> Option<f64> {
        self.coords.get(tag).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.coords.iter().map(|(tag, value)| (tag.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

impl<S> FromIterator<(String, f64)> for Location<S> {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            coords: iter.into_iter().collect(),
            space: PhantomData,
        }
    }
}

impl<S> fmt::Display for Location<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .coords
            .iter()
            .map(|(tag, value)| format!("{tag}={value}"))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Convert a userspace location to designspace across every axis of the font,
/// filling in each axis's default for tags missing from `location`.
pub fn user_location_to_designspace(location: &UserLocation, axes: &[Axis]) -> DesignLocation {
    axes.iter()
        .map(|axis| {
            let user = location.get(&axis.tag).unwrap_or(axis.default);
            (axis.tag.clone(), axis.user_to_designspace(user))
        })
        .collect()
}

/// Convert a designspace location to userspace across every axis of the font,
/// filling in each axis's default for tags missing from `location`.
pub fn designspace_location_to_user(location: &DesignLocation, axes: &[Axis]) -> UserLocation {
    axes.iter()
        .map(|axis| {
            let user = match location.get(&axis.tag) {
                Some(design) => axis.designspace_to_user(design),
                None => axis.default,
            };
            (axis.tag.clone(), user)
        })
        .collect()
}

/// Normalize a designspace location, filling axis defaults (0.0) for
/// missing tags.
pub fn normalize_location(location: &DesignLocation, axes: &[Axis]) -> NormalizedLocation {
    axes.iter()
        .map(|axis| {
            let normalized = match location.get(&axis.tag) {
                Some(design) => axis.normalize(design),
                None => 0.0,
            };
            (axis.tag.clone(), normalized)
        })
        .collect()
}

/// Parse `wght=400,wdth=100` style locations from the command line.
pub fn parse_location<S>(text: &str) -> Result<Location<S>, String> {
    let mut location = Location::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (tag, value) = part
            .split_once('=')
            .ok_or_else(|| format!("Expected TAG=VALUE, got '{part}'"))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| format!("Invalid coordinate for axis '{}': '{}'", tag.trim(), value))?;
        location.set(tag.trim(), value);
    }
    Ok(location)
}
