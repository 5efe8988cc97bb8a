//! Shape suggestions for empty frames

use keytrack_core::{Bounds, FrameIndex, ShapeGeometry, ShapeType};

use crate::CameraTrack;

/// A proposed shape for a frame that has none
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    /// Keyframe whose geometry is being reused
    pub source: FrameIndex,
    pub geometry: ShapeGeometry,
}

impl CameraTrack {
    /// Suggest geometry for an empty `frame`
    ///
    /// Looks at the nearest keyframe on each side. When exactly one of them
    /// has `shape_type`, its geometry is proposed, clipped to `bounds` when
    /// given. Two same-type neighbours mean the frame belongs to a span and
    /// is left to interpolation. Never mutates the track.
    pub fn predict(&self, frame: FrameIndex, shape_type: ShapeType, bounds: Option<Bounds>) -> Option<Suggestion> {
        if self.contains(frame) {
            return None;
        }

        let previous = self.previous_key_frame(frame).filter(|r| r.shape_type() == shape_type);
        let next = self.next_key_frame(frame).filter(|r| r.shape_type() == shape_type);

        let source = match (previous, next) {
            (Some(only), None) | (None, Some(only)) => only,
            _ => return None,
        };

        let geometry = match bounds {
            Some(bounds) => source.geometry.clip(bounds),
            None => source.geometry.clone(),
        };

        Some(Suggestion {
            source: source.frame_index,
            geometry,
        })
    }
}
