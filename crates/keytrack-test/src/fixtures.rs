//! Shared fixtures

use keytrack_core::{Attributes, CameraId, Rect, ShapeGeometry, Vertex};
use keytrack_runtime::{Session, SessionConfig};
use keytrack_state::Catalog;
use serde_json::Value;

/// One car instance with rectangle keyframes at frames 0 (x=0) and 5 (x=50)
pub const SAMPLE_PAYLOAD: &str = r#"[
  {
    "id": "i1",
    "category": "car",
    "number": 1,
    "children": [
      {
        "id": "it1",
        "name": "body",
        "number": 1,
        "cameras": [
          {
            "camera": "front",
            "frames": [
              {"frameIndex": 0, "isKeyFrame": true, "shapeType": "rectangle", "shape": {"x": 0, "y": 0, "w": 10, "h": 10}},
              {"frameIndex": 5, "isKeyFrame": true, "shapeType": "rectangle", "shape": {"x": 50, "y": 0, "w": 10, "h": 10}}
            ]
          }
        ]
      }
    ]
  }
]"#;

pub const CAMERAS: [&str; 3] = ["front", "rear", "side"];

/// Categories and item names used by fixtures and the fuzzer
pub fn sample_catalog() -> Catalog {
    let catalog = Catalog::new()
        .with_category("car", ["body", "wheel", "plate"])
        .with_category("person", ["body", "head"]);
    CAMERAS.iter().fold(catalog, |catalog, camera| catalog.with_camera(*camera))
}

/// Session with [`SAMPLE_PAYLOAD`] loaded
pub fn sample_session(config: SessionConfig) -> Session {
    let mut session = Session::new(sample_catalog(), config);
    session
        .load_json(SAMPLE_PAYLOAD)
        .expect("sample payload parses");
    session
}

pub fn camera(name: &str) -> CameraId {
    CameraId::from(name)
}

/// 10x10 rectangle at (x, 0)
pub fn rect(x: f64) -> ShapeGeometry {
    ShapeGeometry::Rectangle(Rect::new(x, 0.0, 10.0, 10.0))
}

pub fn polygon(points: &[(f64, f64)]) -> ShapeGeometry {
    ShapeGeometry::Polygon(points.iter().map(|&(x, y)| Vertex::new(x, y)).collect())
}

/// Left edge of a rectangle
pub fn rect_x(geometry: &ShapeGeometry) -> Option<f64> {
    match geometry {
        ShapeGeometry::Rectangle(rect) => Some(rect.x),
        _ => None,
    }
}

pub fn attributes<const N: usize>(pairs: [(&str, Value); N]) -> Attributes {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
