//! Camera track - the per-camera frame timeline of one item

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Unbounded};

use keytrack_core::{
    Attributes, CameraId, FrameIndex, FrameRecord, ShapeGeometry, ShapeOrders, TrackDelta,
};
use serde::Serialize;
use tracing::{debug, trace};

use crate::InterpolationConfig;

/// Presence of a frame on a timeline
///
/// Ordered so that merging statuses across cameras or items is `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameStatus {
    Absent,
    Interpolated,
    Key,
}

impl FrameStatus {
    pub fn of(record: Option<&FrameRecord>) -> Self {
        match record {
            None => FrameStatus::Absent,
            Some(r) if r.is_key_frame => FrameStatus::Key,
            Some(_) => FrameStatus::Interpolated,
        }
    }

    #[inline]
    pub fn merge(self, other: FrameStatus) -> FrameStatus {
        self.max(other)
    }
}

/// Frame records of one item on one camera
#[derive(Debug, Clone, PartialEq)]
pub struct CameraTrack {
    camera: CameraId,
    frames: BTreeMap<FrameIndex, FrameRecord>,
    pub(crate) config: InterpolationConfig,
}

impl CameraTrack {
    pub fn new(camera: CameraId) -> Self {
        Self::with_config(camera, InterpolationConfig::default())
    }

    pub fn with_config(camera: CameraId, config: InterpolationConfig) -> Self {
        Self {
            camera,
            frames: BTreeMap::new(),
            config,
        }
    }

    pub fn camera(&self) -> &CameraId {
        &self.camera
    }

    pub fn config(&self) -> InterpolationConfig {
        self.config
    }

    pub fn get(&self, frame: FrameIndex) -> Option<&FrameRecord> {
        self.frames.get(&frame)
    }

    pub fn contains(&self, frame: FrameIndex) -> bool {
        self.frames.contains_key(&frame)
    }

    /// Iterate over records in frame order
    pub fn frames(&self) -> impl Iterator<Item = &FrameRecord> {
        self.frames.values()
    }

    pub fn frame_indices(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.frames.keys().copied()
    }

    pub fn key_frames(&self) -> impl Iterator<Item = &FrameRecord> {
        self.frames.values().filter(|r| r.is_key_frame)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Store a record as-is, without interpolation
    ///
    /// Used by bulk load and snapshot replay.
    pub fn insert_raw(&mut self, record: FrameRecord) -> Option<FrameRecord> {
        self.frames.insert(record.frame_index, record)
    }

    /// Drop a record as-is, without promoting neighbours
    pub fn remove_raw(&mut self, frame: FrameIndex) -> Option<FrameRecord> {
        self.frames.remove(&frame)
    }

    /// Mark `frame` a keyframe with the given geometry
    ///
    /// A new frame takes its order from `orders` unless one is given, and
    /// copies the nearest keyframe's attributes unless attributes are given.
    /// An existing frame keeps its order and attributes unless overridden.
    pub fn add_or_update_keyframe(
        &mut self,
        frame: FrameIndex,
        geometry: ShapeGeometry,
        order: Option<u32>,
        attributes: Option<Attributes>,
        orders: &ShapeOrders,
    ) -> TrackDelta {
        let before = self.frames.get(&frame).cloned();

        let record = match &before {
            Some(existing) => FrameRecord {
                frame_index: frame,
                is_key_frame: true,
                geometry,
                order: order.or(existing.order),
                attributes: attributes.unwrap_or_else(|| existing.attributes.clone()),
            },
            None => {
                let attributes = attributes.unwrap_or_else(|| {
                    self.nearest_key_frame(frame)
                        .and_then(|key| self.frames.get(&key))
                        .map(|r| r.attributes.clone())
                        .unwrap_or_default()
                });
                FrameRecord {
                    frame_index: frame,
                    is_key_frame: true,
                    geometry,
                    order: Some(order.unwrap_or_else(|| orders.next(&self.camera, frame))),
                    attributes,
                }
            }
        };

        trace!(camera = %self.camera, frame, created = before.is_none(), "keyframe set");

        self.frames.insert(frame, record.clone());
        let mut delta = TrackDelta::new();
        delta.record(frame, before, Some(record));
        delta
    }

    /// Replace the attributes of an existing frame
    pub fn set_attributes(&mut self, frame: FrameIndex, attributes: Attributes) -> TrackDelta {
        let mut delta = TrackDelta::new();
        if let Some(record) = self.frames.get_mut(&frame) {
            let before = record.clone();
            record.attributes = attributes;
            delta.record(frame, Some(before), Some(record.clone()));
        }
        delta
    }

    /// Delete the listed frames
    ///
    /// The surviving immediate neighbours of every removed frame are
    /// promoted to keyframes, so the geometry bounding the gap stays fixed.
    /// Frames that do not exist are ignored.
    pub fn remove(&mut self, frames: &[FrameIndex]) -> TrackDelta {
        let targets: BTreeSet<FrameIndex> = frames.iter().copied().collect();
        let mut delta = TrackDelta::new();

        for &frame in &targets {
            if let Some(removed) = self.frames.remove(&frame) {
                delta.record(frame, Some(removed), None);
            }
        }

        let removed: Vec<FrameIndex> = delta.removed().collect();
        for frame in removed {
            let neighbours = [frame.checked_sub(1), frame.checked_add(1)];
            for neighbour in neighbours.into_iter().flatten() {
                if targets.contains(&neighbour) {
                    continue;
                }
                if let Some(record) = self.frames.get_mut(&neighbour) {
                    if !record.is_key_frame {
                        let before = record.clone();
                        record.is_key_frame = true;
                        delta.record(neighbour, Some(before), Some(record.clone()));
                    }
                }
            }
        }

        if !delta.is_empty() {
            debug!(camera = %self.camera, removed = targets.len(), touched = delta.len(), "frames removed");
        }
        delta
    }

    /// Delete every frame without promotion
    pub fn clear(&mut self) -> TrackDelta {
        let mut delta = TrackDelta::new();
        for (frame, record) in std::mem::take(&mut self.frames) {
            delta.record(frame, Some(record), None);
        }
        delta
    }

    /// Nearest keyframe at or before `frame`, else the nearest after it
    pub fn nearest_key_frame(&self, frame: FrameIndex) -> Option<FrameIndex> {
        self.frames
            .range(..=frame)
            .rev()
            .find(|(_, r)| r.is_key_frame)
            .or_else(|| {
                self.frames
                    .range((Excluded(frame), Unbounded))
                    .find(|(_, r)| r.is_key_frame)
            })
            .map(|(index, _)| *index)
    }

    /// Nearest keyframe strictly before `frame`
    pub fn previous_key_frame(&self, frame: FrameIndex) -> Option<&FrameRecord> {
        self.frames
            .range(..frame)
            .rev()
            .map(|(_, r)| r)
            .find(|r| r.is_key_frame)
    }

    /// Nearest keyframe strictly after `frame`
    pub fn next_key_frame(&self, frame: FrameIndex) -> Option<&FrameRecord> {
        self.frames
            .range((Excluded(frame), Unbounded))
            .map(|(_, r)| r)
            .find(|r| r.is_key_frame)
    }

    pub fn frame_status(&self, frame: FrameIndex) -> FrameStatus {
        FrameStatus::of(self.frames.get(&frame))
    }

    /// Status of every stored frame
    pub fn statuses(&self) -> BTreeMap<FrameIndex, FrameStatus> {
        self.frames
            .iter()
            .map(|(index, record)| (*index, FrameStatus::of(Some(record))))
            .collect()
    }
}
