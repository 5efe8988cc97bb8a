//! Shape geometry - the per-shape-type coordinate payload
//!
//! Geometry is a plain value. The only behavior it carries is the
//! type-aware linear interpolation used to synthesize non-key frames,
//! and clipping against image bounds for predictions.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{KeytrackError, KeytrackResult};

/// Shape kind of a frame record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    Rectangle,
    Polygon,
    Line,
    Point,
}

impl ShapeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeType::Rectangle => "rectangle",
            ShapeType::Polygon => "polygon",
            ShapeType::Line => "line",
            ShapeType::Point => "point",
        }
    }

    pub fn parse(s: &str) -> KeytrackResult<Self> {
        match s {
            "rectangle" => Ok(ShapeType::Rectangle),
            "polygon" => Ok(ShapeType::Polygon),
            "line" => Ok(ShapeType::Line),
            "point" => Ok(ShapeType::Point),
            other => Err(KeytrackError::UnknownShapeType(other.to_string())),
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when two polygon/line keyframes disagree on vertex count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexMismatch {
    /// Refuse to synthesize the span
    #[default]
    Reject,
    /// Resample both vertex lists to the larger count by ratio index mapping
    Resample,
}

/// Image bounds used to clip suggested geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A 2D vertex in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation towards `other`
    #[inline]
    pub fn lerp(&self, other: &Vertex, t: f64) -> Vertex {
        Vertex {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    pub fn clamp(&self, bounds: Bounds) -> Vertex {
        Vertex {
            x: self.x.clamp(0.0, bounds.width),
            y: self.y.clamp(0.0, bounds.height),
        }
    }
}

/// Axis-aligned rectangle, top-left corner plus size
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Build a normalized rectangle from two opposite corners
    pub fn from_corners(a: Vertex, b: Vertex) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            w: (a.x - b.x).abs(),
            h: (a.y - b.y).abs(),
        }
    }

    pub fn top_left(&self) -> Vertex {
        Vertex::new(self.x, self.y)
    }

    pub fn bottom_right(&self) -> Vertex {
        Vertex::new(self.x + self.w, self.y + self.h)
    }
}

/// Persisted form of polygon and line shapes
#[derive(Serialize, Deserialize)]
struct Polyline {
    points: Vec<Vertex>,
}

/// Per-shape-type geometry
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeGeometry {
    Rectangle(Rect),
    Polygon(Vec<Vertex>),
    Line(Vec<Vertex>),
    Point(Vertex),
}

impl ShapeGeometry {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            ShapeGeometry::Rectangle(_) => ShapeType::Rectangle,
            ShapeGeometry::Polygon(_) => ShapeType::Polygon,
            ShapeGeometry::Line(_) => ShapeType::Line,
            ShapeGeometry::Point(_) => ShapeType::Point,
        }
    }

    /// Number of vertices the shape is interpolated over
    pub fn vertex_count(&self) -> usize {
        match self {
            ShapeGeometry::Rectangle(_) => 2,
            ShapeGeometry::Polygon(points) | ShapeGeometry::Line(points) => points.len(),
            ShapeGeometry::Point(_) => 1,
        }
    }

    /// Decode the persisted `shape` payload for the given shape type
    pub fn from_parts(shape_type: ShapeType, shape: Value) -> KeytrackResult<Self> {
        let invalid = |e: serde_json::Error| KeytrackError::InvalidShape {
            shape_type,
            reason: e.to_string(),
        };
        match shape_type {
            ShapeType::Rectangle => serde_json::from_value(shape)
                .map(ShapeGeometry::Rectangle)
                .map_err(invalid),
            ShapeType::Polygon => serde_json::from_value::<Polyline>(shape)
                .map(|p| ShapeGeometry::Polygon(p.points))
                .map_err(invalid),
            ShapeType::Line => serde_json::from_value::<Polyline>(shape)
                .map(|p| ShapeGeometry::Line(p.points))
                .map_err(invalid),
            ShapeType::Point => serde_json::from_value(shape)
                .map(ShapeGeometry::Point)
                .map_err(invalid),
        }
    }

    /// Encode as the persisted `shape` payload
    pub fn to_value(&self) -> Value {
        match self {
            ShapeGeometry::Rectangle(r) => json!({ "x": r.x, "y": r.y, "w": r.w, "h": r.h }),
            ShapeGeometry::Polygon(points) | ShapeGeometry::Line(points) => {
                let points: Vec<Value> = points.iter().map(|p| json!({ "x": p.x, "y": p.y })).collect();
                json!({ "points": points })
            }
            ShapeGeometry::Point(p) => json!({ "x": p.x, "y": p.y }),
        }
    }

    /// Whether a span between `self` and `other` can be synthesized
    pub fn compatible(&self, other: &ShapeGeometry, policy: VertexMismatch) -> bool {
        match (self, other) {
            (ShapeGeometry::Rectangle(_), ShapeGeometry::Rectangle(_))
            | (ShapeGeometry::Point(_), ShapeGeometry::Point(_)) => true,
            (ShapeGeometry::Polygon(a), ShapeGeometry::Polygon(b))
            | (ShapeGeometry::Line(a), ShapeGeometry::Line(b)) => match policy {
                VertexMismatch::Reject => a.len() == b.len(),
                VertexMismatch::Resample => !a.is_empty() && !b.is_empty(),
            },
            _ => false,
        }
    }

    /// Type-aware linear interpolation at position `t` in `[0, 1]`
    ///
    /// Rectangles interpolate each corner independently, polygons and lines
    /// interpolate corresponding vertices by index, points interpolate the
    /// coordinate. Returns `None` for incompatible shapes.
    pub fn lerp(&self, to: &ShapeGeometry, t: f64, policy: VertexMismatch) -> Option<ShapeGeometry> {
        if !self.compatible(to, policy) {
            return None;
        }

        let t = t.clamp(0.0, 1.0);

        match (self, to) {
            (ShapeGeometry::Rectangle(a), ShapeGeometry::Rectangle(b)) => {
                let top_left = a.top_left().lerp(&b.top_left(), t);
                let bottom_right = a.bottom_right().lerp(&b.bottom_right(), t);
                Some(ShapeGeometry::Rectangle(Rect::from_corners(top_left, bottom_right)))
            }
            (ShapeGeometry::Polygon(a), ShapeGeometry::Polygon(b)) => {
                Some(ShapeGeometry::Polygon(lerp_vertices(a, b, t)))
            }
            (ShapeGeometry::Line(a), ShapeGeometry::Line(b)) => {
                Some(ShapeGeometry::Line(lerp_vertices(a, b, t)))
            }
            (ShapeGeometry::Point(a), ShapeGeometry::Point(b)) => Some(ShapeGeometry::Point(a.lerp(b, t))),
            _ => None,
        }
    }

    /// Clamp every coordinate into the image bounds
    pub fn clip(&self, bounds: Bounds) -> ShapeGeometry {
        match self {
            ShapeGeometry::Rectangle(r) => ShapeGeometry::Rectangle(Rect::from_corners(
                r.top_left().clamp(bounds),
                r.bottom_right().clamp(bounds),
            )),
            ShapeGeometry::Polygon(points) => {
                ShapeGeometry::Polygon(points.iter().map(|p| p.clamp(bounds)).collect())
            }
            ShapeGeometry::Line(points) => {
                ShapeGeometry::Line(points.iter().map(|p| p.clamp(bounds)).collect())
            }
            ShapeGeometry::Point(p) => ShapeGeometry::Point(p.clamp(bounds)),
        }
    }
}

fn lerp_vertices(a: &[Vertex], b: &[Vertex], t: f64) -> Vec<Vertex> {
    if a.len() == b.len() {
        return a.iter().zip(b).map(|(p, q)| p.lerp(q, t)).collect();
    }

    let n = a.len().max(b.len());
    let a = resample(a, n);
    let b = resample(b, n);
    a.iter().zip(&b).map(|(p, q)| p.lerp(q, t)).collect()
}

/// Map `n` output slots onto `points` by index ratio
fn resample(points: &[Vertex], n: usize) -> Vec<Vertex> {
    (0..n).map(|i| points[i * points.len() / n]).collect()
}
