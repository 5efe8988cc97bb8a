//! Frame record - one frame's shape state on one camera track

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{FrameData, FrameIndex, ShapeGeometry, ShapeType};

/// Free-form attribute map attached to frames and instances
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// One frame of a camera track
///
/// Keyframes carry authored geometry; non-key frames carry geometry
/// synthesized by interpolation between two same-type keyframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "FrameData", try_from = "FrameData")]
pub struct FrameRecord {
    pub frame_index: FrameIndex,
    pub is_key_frame: bool,
    pub geometry: ShapeGeometry,
    /// Draw order within the (camera, frame), assigned by the sequence coordinator
    pub order: Option<u32>,
    pub attributes: Attributes,
}

impl FrameRecord {
    /// Create an authored keyframe
    pub fn keyframe(frame_index: FrameIndex, geometry: ShapeGeometry) -> Self {
        Self {
            frame_index,
            is_key_frame: true,
            geometry,
            order: None,
            attributes: Attributes::new(),
        }
    }

    /// Create a synthesized (non-key) frame
    pub fn synthesized(frame_index: FrameIndex, geometry: ShapeGeometry) -> Self {
        Self {
            is_key_frame: false,
            ..Self::keyframe(frame_index, geometry)
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    #[inline]
    pub fn shape_type(&self) -> ShapeType {
        self.geometry.shape_type()
    }
}
