//! Glyph layer data
//!
//! The same structure describes master layers in a font source and the
//! interpolated layers handed to the presentation layer.

use kurbo::{Affine, BezPath, Point};
use serde::{Deserialize, Serialize};

/// One glyph layer: advance width, shapes, anchors and guides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerData {
    pub width: f64,
    #[serde(default)]
    pub shapes: Vec<Shape>,
    #[serde(default)]
    pub anchors: Vec<Anchor>,
    #[serde(default)]
    pub guides: Vec<Guide>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Path {
        nodes: Vec<Node>,
        #[serde(default = "default_closed")]
        closed: bool,
    },
    Component {
        reference: String,
        /// Affine transform as `[xx, xy, yx, yy, dx, dy]`
        #[serde(default = "identity_transform")]
        transform: [f64; 6],
        /// Resolved layer of the referenced glyph, filled in by interpolation
        #[serde(default, skip_serializing_if = "Option::is_none")]
        layer: Option<Box<LayerData>>,
    },
}

fn default_closed() -> bool {
    true
}

pub fn identity_transform() -> [f64; 6] {
    [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Move,
    Line,
    OffCurve,
    Curve,
    QCurve,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub x: f64,
    pub y: f64,
    pub node_type: NodeType,
    #[serde(default)]
    pub smooth: bool,
}

impl Node {
    pub fn new(x: f64, y: f64, node_type: NodeType) -> Self {
        Self {
            x,
            y,
            node_type,
            smooth: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub name: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub angle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl LayerData {
    /// Names of the glyphs this layer references as components.
    pub fn component_references(&self) -> impl Iterator<Item = &str> {
        self.shapes.iter().filter_map(|shape| match shape {
            Shape::Component { reference, .. } => Some(reference.as_str()),
            Shape::Path { .. } => None,
        })
    }

    /// Flatten the layer to bezier paths, including resolved component
    /// layers with their transforms applied.
    pub fn to_bezpaths(&self) -> Vec<BezPath> {
        let mut paths = Vec::new();
        for shape in &self.shapes {
            match shape {
                Shape::Path { nodes, closed } => paths.push(nodes_to_bezpath(nodes, *closed)),
                Shape::Component {
                    transform, layer, ..
                } => {
                    if let Some(layer) = layer {
                        let affine = Affine::new(*transform);
                        paths.extend(layer.to_bezpaths().into_iter().map(|p| affine * p));
                    }
                }
            }
        }
        paths
    }

    /// The flattened outline as SVG path data.
    pub fn svg_path(&self) -> String {
        self.to_bezpaths()
            .iter()
            .map(BezPath::to_svg)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Build a path from UFO-style nodes: off-curve points accumulate until the
/// next on-curve point decides whether they form a cubic or quadratic segment.
fn nodes_to_bezpath(nodes: &[Node], closed: bool) -> BezPath {
    let mut path = BezPath::new();
    let Some(start_index) = nodes.iter().position(|n| n.node_type != NodeType::OffCurve) else {
        return path;
    };

    // Closed contours may start with off-curve points; rotate so we begin on-curve.
    let ordered: Vec<&Node> = if closed {
        nodes[start_index..].iter().chain(nodes[..start_index].iter()).collect()
    } else {
        nodes.iter().collect()
    };

    let mut pending: Vec<Point> = Vec::new();
    let first = Point::new(ordered[0].x, ordered[0].y);
    path.move_to(first);

    let targets = ordered[1..].iter().map(|n| (Point::new(n.x, n.y), n.node_type));
    let closing = closed.then_some((first, ordered[0].node_type));

    for (point, node_type) in targets.chain(closing) {
        match node_type {
            NodeType::OffCurve => pending.push(point),
            NodeType::Move | NodeType::Line => {
                pending.clear();
                path.line_to(point);
            }
            NodeType::Curve => {
                match pending.as_slice() {
                    [c1, c2] => path.curve_to(*c1, *c2, point),
                    [c] => path.quad_to(*c, point),
                    _ => path.line_to(point),
                }
                pending.clear();
            }
            NodeType::QCurve => {
                // Implied on-curve points between consecutive quadratic controls
                for pair in pending.windows(2) {
                    let implied = pair[0].midpoint(pair[1]);
                    path.quad_to(pair[0], implied);
                }
                match pending.last() {
                    Some(c) => path.quad_to(*c, point),
                    None => path.line_to(point),
                }
                pending.clear();
            }
        }
    }

    if closed {
        path.close_path();
    }
    path
}
