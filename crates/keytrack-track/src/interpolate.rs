//! Keyframe interpolation
//!
//! `interpolate(f)` recomputes the two spans that touch keyframe `f`:
//! - backward: from the nearest keyframe before `f` up to `f - 1`
//! - forward: from `f + 1` up to the nearest keyframe after `f`
//!
//! Each span is handled independently. A span exists only when the
//! keyframe bounding it has the same shape type as `f`.

use keytrack_core::{FrameIndex, FrameRecord, ShapeOrders, TrackDelta, VertexMismatch};
use tracing::{debug, warn};

use crate::CameraTrack;

/// Interpolation configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterpolationConfig {
    /// Policy for polygon/line keyframes with differing vertex counts
    pub vertex_mismatch: VertexMismatch,
}

impl InterpolationConfig {
    /// Resample mismatched vertex lists instead of skipping the span
    pub fn resampling() -> Self {
        Self {
            vertex_mismatch: VertexMismatch::Resample,
        }
    }
}

impl CameraTrack {
    /// Keyframe anchoring the backward span of `frame`
    ///
    /// The nearest keyframe strictly before `frame`, if it shares the shape
    /// type of the record at `frame`.
    pub fn backward_anchor(&self, frame: FrameIndex) -> Option<&FrameRecord> {
        let target = self.get(frame)?;
        self.previous_key_frame(frame)
            .filter(|anchor| anchor.shape_type() == target.shape_type())
    }

    /// Keyframe closing the forward span of `frame`
    pub fn forward_anchor(&self, frame: FrameIndex) -> Option<&FrameRecord> {
        let target = self.get(frame)?;
        self.next_key_frame(frame)
            .filter(|anchor| anchor.shape_type() == target.shape_type())
    }

    /// Recompute the non-key frames on both sides of keyframe `frame`
    ///
    /// Missing frames in the backward span are created only when
    /// `insert_missing` is set; the forward span always fills gaps. Returns
    /// an empty delta when `frame` is not a keyframe or nothing changed.
    pub fn interpolate(&mut self, frame: FrameIndex, insert_missing: bool, orders: &ShapeOrders) -> TrackDelta {
        let mut delta = TrackDelta::new();

        let Some(target) = self.get(frame).filter(|r| r.is_key_frame).cloned() else {
            return delta;
        };

        if let Some(start) = self.backward_anchor(frame).cloned() {
            self.fill_span(&start, &target, insert_missing, orders, &mut delta);
        }
        if let Some(end) = self.forward_anchor(frame).cloned() {
            self.fill_span(&target, &end, true, orders, &mut delta);
        }

        if !delta.is_empty() {
            debug!(camera = %self.camera(), frame, touched = delta.len(), "interpolated");
        }
        delta
    }

    /// Synthesize every frame strictly between two keyframes
    fn fill_span(
        &mut self,
        start: &FrameRecord,
        end: &FrameRecord,
        insert_missing: bool,
        orders: &ShapeOrders,
        delta: &mut TrackDelta,
    ) {
        let (from, to) = (start.frame_index, end.frame_index);
        if to <= from + 1 {
            return;
        }

        let policy = self.config.vertex_mismatch;
        if !start.geometry.compatible(&end.geometry, policy) {
            warn!(
                camera = %self.camera(),
                from,
                to,
                from_vertices = start.geometry.vertex_count(),
                to_vertices = end.geometry.vertex_count(),
                "span left untouched, keyframes cannot be interpolated"
            );
            return;
        }

        let length = f64::from(to - from);
        for index in from + 1..to {
            let t = f64::from(index - from) / length;
            let Some(geometry) = start.geometry.lerp(&end.geometry, t, policy) else {
                continue;
            };

            let before = self.get(index).cloned();
            let after = match &before {
                Some(existing) => FrameRecord {
                    geometry,
                    ..existing.clone()
                },
                None if insert_missing => FrameRecord::synthesized(index, geometry)
                    .with_order(orders.next(self.camera(), index))
                    .with_attributes(start.attributes.clone()),
                None => continue,
            };

            if before.as_ref() != Some(&after) {
                self.insert_raw(after.clone());
                delta.record(index, before, Some(after));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keytrack_core::{CameraId, Rect, ShapeGeometry, ShapeType, Vertex};
    use proptest::prelude::*;

    fn rect(x: f64) -> ShapeGeometry {
        ShapeGeometry::Rectangle(Rect::new(x, 0.0, 10.0, 10.0))
    }

    fn x_of(record: &FrameRecord) -> f64 {
        match &record.geometry {
            ShapeGeometry::Rectangle(r) => r.x,
            other => panic!("expected rectangle, got {:?}", other.shape_type()),
        }
    }

    fn track_with(keys: &[(FrameIndex, ShapeGeometry)]) -> CameraTrack {
        let mut track = CameraTrack::new(CameraId::from("front"));
        for (frame, geometry) in keys {
            track.insert_raw(FrameRecord::keyframe(*frame, geometry.clone()));
        }
        track
    }

    #[test]
    fn test_rectangle_span_is_linear() {
        let orders = ShapeOrders::new();
        let mut track = track_with(&[(0, rect(0.0)), (10, rect(100.0))]);

        let delta = track.interpolate(10, true, &orders);
        assert_eq!(delta.len(), 9);

        for frame in 1..10 {
            let record = track.get(frame).unwrap();
            assert!(!record.is_key_frame);
            assert_eq!(record.shape_type(), ShapeType::Rectangle);
            assert!((x_of(record) - 10.0 * frame as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_interpolate_is_idempotent() {
        let orders = ShapeOrders::new();
        let mut track = track_with(&[(0, rect(0.0)), (10, rect(100.0))]);

        assert!(!track.interpolate(10, true, &orders).is_empty());
        assert!(track.interpolate(10, true, &orders).is_empty());
        assert!(track.interpolate(0, true, &orders).is_empty());
    }

    #[test]
    fn test_type_break_stops_span() {
        let orders = ShapeOrders::new();
        let polygon = ShapeGeometry::Polygon(vec![Vertex::new(0.0, 0.0), Vertex::new(5.0, 5.0), Vertex::new(0.0, 5.0)]);
        let mut track = track_with(&[(0, rect(0.0)), (10, polygon)]);

        assert!(track.interpolate(10, true, &orders).is_empty());
        assert!(track.interpolate(0, true, &orders).is_empty());
        assert_eq!(track.len(), 2);
    }

    #[test]
    fn test_backward_span_respects_insert_missing() {
        let orders = ShapeOrders::new();
        let mut track = track_with(&[(0, rect(0.0)), (4, rect(40.0))]);
        track.insert_raw(FrameRecord::synthesized(2, rect(0.0)));

        let delta = track.interpolate(4, false, &orders);
        assert_eq!(delta.frames().collect::<Vec<_>>(), vec![2]);
        assert!((x_of(track.get(2).unwrap()) - 20.0).abs() < 1e-9);
        assert!(!track.contains(1));
        assert!(!track.contains(3));
    }

    #[test]
    fn test_forward_span_always_fills() {
        let orders = ShapeOrders::new();
        let mut track = track_with(&[(0, rect(0.0)), (4, rect(40.0))]);

        let delta = track.interpolate(0, false, &orders);
        assert_eq!(delta.len(), 3);
        assert!((x_of(track.get(3).unwrap()) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_created_frames_draw_orders_and_copy_attributes() {
        let orders = ShapeOrders::new();
        let camera = CameraId::from("front");
        let mut attributes = keytrack_core::Attributes::new();
        attributes.insert("truncated".into(), serde_json::json!(false));

        let mut track = CameraTrack::new(camera.clone());
        track.insert_raw(FrameRecord::keyframe(0, rect(0.0)).with_attributes(attributes.clone()));
        track.insert_raw(FrameRecord::keyframe(2, rect(20.0)));
        orders.next(&camera, 1);

        track.interpolate(2, true, &orders);
        let created = track.get(1).unwrap();
        assert_eq!(created.order, Some(1));
        assert_eq!(created.attributes, attributes);
    }

    #[test]
    fn test_non_key_target_does_nothing() {
        let orders = ShapeOrders::new();
        let mut track = track_with(&[(0, rect(0.0)), (10, rect(100.0))]);
        track.insert_raw(FrameRecord::synthesized(5, rect(3.0)));

        assert!(track.interpolate(5, true, &orders).is_empty());
        assert!(track.interpolate(7, true, &orders).is_empty());
    }

    #[test]
    fn test_vertex_mismatch_policy() {
        let orders = ShapeOrders::new();
        let short = ShapeGeometry::Line(vec![Vertex::new(0.0, 0.0), Vertex::new(1.0, 1.0)]);
        let longer = ShapeGeometry::Line(vec![Vertex::new(0.0, 0.0), Vertex::new(2.0, 2.0), Vertex::new(4.0, 0.0)]);

        let mut rejecting = track_with(&[(0, short.clone()), (2, longer.clone())]);
        assert!(rejecting.interpolate(2, true, &orders).is_empty());

        let mut resampling = CameraTrack::with_config(CameraId::from("front"), InterpolationConfig::resampling());
        resampling.insert_raw(FrameRecord::keyframe(0, short));
        resampling.insert_raw(FrameRecord::keyframe(2, longer));
        assert_eq!(resampling.interpolate(2, true, &orders).len(), 1);
        assert_eq!(resampling.get(1).unwrap().geometry.vertex_count(), 3);
    }

    proptest! {
        #[test]
        fn prop_span_is_linear_and_idempotent(
            start in 0u32..50,
            gap in 2u32..30,
            x0 in -500.0f64..500.0,
            x1 in -500.0f64..500.0,
        ) {
            let orders = ShapeOrders::new();
            let end = start + gap;
            let mut track = track_with(&[(start, rect(x0)), (end, rect(x1))]);

            let delta = track.interpolate(end, true, &orders);
            prop_assert_eq!(delta.len() as u32, gap - 1);

            for frame in start + 1..end {
                let t = f64::from(frame - start) / f64::from(gap);
                let expected = x0 + (x1 - x0) * t;
                prop_assert!((x_of(track.get(frame).unwrap()) - expected).abs() < 1e-6);
            }

            prop_assert!(track.interpolate(end, true, &orders).is_empty());
            prop_assert!(track.interpolate(start, true, &orders).is_empty());
        }
    }
}
