//! UFO format conversion utilities
//!
//! Conversion between our serialized layer structures and the norad UFO
//! types. This is pure data transformation, used both when importing a UFO
//! as a font source and when writing masters out for fontc.

use crate::font_source::{Anchor, Guide, LayerData, Node, NodeType, Shape, VerticalMetrics};
use anyhow::{anyhow, Result};

impl LayerData {
    /// Convert from a norad glyph
    pub fn from_norad_glyph(norad_glyph: &norad::Glyph) -> Self {
        let mut shapes: Vec<Shape> = norad_glyph
            .contours
            .iter()
            .map(Shape::from_norad_contour)
            .collect();

        shapes.extend(norad_glyph.components.iter().map(Shape::from_norad_component));

        let anchors = norad_glyph
            .anchors
            .iter()
            .map(|anchor| Anchor {
                name: anchor
                    .name
                    .as_ref()
                    .map(|name| name.to_string())
                    .unwrap_or_default(),
                x: anchor.x,
                y: anchor.y,
            })
            .collect();

        let guides = norad_glyph
            .guidelines
            .iter()
            .map(Guide::from_norad_guideline)
            .collect();

        Self {
            width: norad_glyph.width,
            shapes,
            anchors,
            guides,
        }
    }

    /// Convert to a norad glyph named `name`, skipping outlines if requested
    pub fn to_norad_glyph(&self, name: &str, codepoints: &[u32], outlines: bool) -> Result<norad::Glyph> {
        let mut glyph = norad::Glyph::new(name);
        glyph.width = self.width;

        for &codepoint in codepoints {
            if let Some(c) = char::from_u32(codepoint) {
                glyph.codepoints.insert(c);
            }
        }

        if outlines {
            for shape in &self.shapes {
                match shape {
                    Shape::Path { nodes, closed } => {
                        glyph.contours.push(nodes_to_norad_contour(nodes, *closed));
                    }
                    Shape::Component {
                        reference,
                        transform,
                        ..
                    } => {
                        glyph
                            .components
                            .push(component_to_norad(reference, transform)?);
                    }
                }
            }
        }

        for anchor in &self.anchors {
            let anchor_name: Option<norad::Name> = anchor.name.parse().ok();
            glyph
                .anchors
                .push(norad::Anchor::new(anchor.x, anchor.y, anchor_name, None, None));
        }

        Ok(glyph)
    }
}

impl Shape {
    /// Convert from a norad contour
    pub fn from_norad_contour(norad_contour: &norad::Contour) -> Self {
        let nodes: Vec<Node> = norad_contour
            .points
            .iter()
            .map(|point| Node {
                x: point.x,
                y: point.y,
                node_type: NodeType::from_norad_point_type(&point.typ),
                smooth: point.smooth,
            })
            .collect();

        // UFO marks open contours by starting them with a move point
        let closed = !matches!(nodes.first(), Some(node) if node.node_type == NodeType::Move);
        Shape::Path { nodes, closed }
    }

    /// Convert from a norad component
    pub fn from_norad_component(norad_component: &norad::Component) -> Self {
        Shape::Component {
            reference: norad_component.base.to_string(),
            transform: [
                norad_component.transform.x_scale,
                norad_component.transform.xy_scale,
                norad_component.transform.yx_scale,
                norad_component.transform.y_scale,
                norad_component.transform.x_offset,
                norad_component.transform.y_offset,
            ],
            layer: None,
        }
    }
}

fn nodes_to_norad_contour(nodes: &[Node], closed: bool) -> norad::Contour {
    let points = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let mut typ = node.node_type.to_norad_point_type();
            if !closed && index == 0 {
                typ = norad::PointType::Move;
            }
            norad::ContourPoint::new(node.x, node.y, typ, node.smooth, None, None)
        })
        .collect();

    norad::Contour::new(points, None)
}

fn component_to_norad(reference: &str, transform: &[f64; 6]) -> Result<norad::Component> {
    let base_name: norad::Name = reference
        .parse()
        .map_err(|_| anyhow!("Invalid component reference '{}'", reference))?;

    let transform = norad::AffineTransform {
        x_scale: transform[0],
        xy_scale: transform[1],
        yx_scale: transform[2],
        y_scale: transform[3],
        x_offset: transform[4],
        y_offset: transform[5],
    };

    Ok(norad::Component::new(base_name, transform, None))
}

impl NodeType {
    pub fn from_norad_point_type(norad_type: &norad::PointType) -> Self {
        match norad_type {
            norad::PointType::Move => NodeType::Move,
            norad::PointType::Line => NodeType::Line,
            norad::PointType::OffCurve => NodeType::OffCurve,
            norad::PointType::Curve => NodeType::Curve,
            norad::PointType::QCurve => NodeType::QCurve,
        }
    }

    pub fn to_norad_point_type(&self) -> norad::PointType {
        match self {
            NodeType::Move => norad::PointType::Move,
            NodeType::Line => norad::PointType::Line,
            NodeType::OffCurve => norad::PointType::OffCurve,
            NodeType::Curve => norad::PointType::Curve,
            NodeType::QCurve => norad::PointType::QCurve,
        }
    }
}

impl VerticalMetrics {
    pub fn from_norad_font_info(info: &norad::FontInfo) -> Self {
        Self {
            ascender: info.ascender,
            descender: info.descender,
            cap_height: info.cap_height,
            x_height: info.x_height,
        }
    }

    pub fn apply_to_norad_font_info(&self, info: &mut norad::FontInfo) {
        info.ascender = self.ascender;
        info.descender = self.descender;
        info.cap_height = self.cap_height;
        info.x_height = self.x_height;
    }
}

impl Guide {
    pub fn from_norad_guideline(guideline: &norad::Guideline) -> Self {
        let (x, y, angle) = match guideline.line {
            norad::Line::Vertical(x) => (x, 0.0, 90.0),
            norad::Line::Horizontal(y) => (0.0, y, 0.0),
            norad::Line::Angle { x, y, degrees } => (x, y, degrees),
        };
        Self {
            x,
            y,
            angle,
            name: guideline.name.as_ref().map(|name| name.to_string()),
        }
    }
}
