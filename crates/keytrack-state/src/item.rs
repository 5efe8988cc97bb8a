//! Annotation item - one labeled part of an instance

use std::collections::{BTreeMap, BTreeSet};

use keytrack_core::{
    Attributes, Bounds, CameraId, CameraRecord, FrameData, FrameIndex, FrameRecord, ItemId, ItemPatch, ItemRecord,
    ShapeGeometry, ShapeOrders, ShapeType, TrackDelta,
};
use keytrack_track::{CameraTrack, FrameStatus, InterpolationConfig, Suggestion};

/// One labeled part, tracked on every camera it appears in
///
/// Tracks exist only while they hold frames: any operation that empties a
/// track drops it before returning.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationItem {
    id: ItemId,
    name: String,
    number: u32,
    cameras: BTreeMap<CameraId, CameraTrack>,
    config: InterpolationConfig,
}

impl AnnotationItem {
    pub fn new(id: ItemId, name: impl Into<String>, number: u32, config: InterpolationConfig) -> Self {
        AnnotationItem {
            id,
            name: name.into(),
            number,
            cameras: BTreeMap::new(),
            config,
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// Item category within the instance category
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: u32) {
        self.number = number;
    }

    pub fn track(&self, camera: &CameraId) -> Option<&CameraTrack> {
        self.cameras.get(camera)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &CameraTrack> {
        self.cameras.values()
    }

    pub fn frame(&self, camera: &CameraId, frame: FrameIndex) -> Option<&FrameRecord> {
        self.cameras.get(camera).and_then(|track| track.get(frame))
    }

    pub fn has_frame(&self, camera: &CameraId, frame: FrameIndex) -> bool {
        self.frame(camera, frame).is_some()
    }

    /// Cameras holding at least one frame
    pub fn existed_cameras(&self) -> BTreeSet<CameraId> {
        self.cameras
            .iter()
            .filter(|(_, track)| !track.is_empty())
            .map(|(camera, _)| camera.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.values().all(CameraTrack::is_empty)
    }

    pub fn frame_statuses(&self, camera: &CameraId) -> BTreeMap<FrameIndex, FrameStatus> {
        self.cameras.get(camera).map(CameraTrack::statuses).unwrap_or_default()
    }

    pub fn add_or_update_keyframe(
        &mut self,
        camera: &CameraId,
        frame: FrameIndex,
        geometry: ShapeGeometry,
        order: Option<u32>,
        attributes: Option<Attributes>,
        orders: &ShapeOrders,
    ) -> TrackDelta {
        let config = self.config;
        self.cameras
            .entry(camera.clone())
            .or_insert_with(|| CameraTrack::with_config(camera.clone(), config))
            .add_or_update_keyframe(frame, geometry, order, attributes, orders)
    }

    pub fn interpolate(
        &mut self,
        camera: &CameraId,
        frame: FrameIndex,
        insert_missing: bool,
        orders: &ShapeOrders,
    ) -> TrackDelta {
        match self.cameras.get_mut(camera) {
            Some(track) => track.interpolate(frame, insert_missing, orders),
            None => TrackDelta::new(),
        }
    }

    pub fn predict(
        &self,
        camera: &CameraId,
        frame: FrameIndex,
        shape_type: ShapeType,
        bounds: Option<Bounds>,
    ) -> Option<Suggestion> {
        self.cameras
            .get(camera)
            .and_then(|track| track.predict(frame, shape_type, bounds))
    }

    pub fn set_frame_attributes(&mut self, camera: &CameraId, frame: FrameIndex, attributes: Attributes) -> TrackDelta {
        match self.cameras.get_mut(camera) {
            Some(track) => track.set_attributes(frame, attributes),
            None => TrackDelta::new(),
        }
    }

    /// Remove frames of one camera, promoting their neighbours
    pub fn remove_frames(&mut self, camera: &CameraId, frames: &[FrameIndex]) -> TrackDelta {
        let Some(track) = self.cameras.get_mut(camera) else {
            return TrackDelta::new();
        };
        let delta = track.remove(frames);
        self.drop_if_empty(camera);
        delta
    }

    /// Remove every frame of one camera
    pub fn clear_camera(&mut self, camera: &CameraId) -> TrackDelta {
        self.cameras
            .remove(camera)
            .map(|mut track| track.clear())
            .unwrap_or_default()
    }

    /// Remove every frame on every camera
    pub fn clear(&mut self) -> Vec<(CameraId, TrackDelta)> {
        std::mem::take(&mut self.cameras)
            .into_iter()
            .map(|(camera, mut track)| (camera, track.clear()))
            .collect()
    }

    pub(crate) fn insert_frame(&mut self, camera: &CameraId, record: FrameRecord) {
        let config = self.config;
        self.cameras
            .entry(camera.clone())
            .or_insert_with(|| CameraTrack::with_config(camera.clone(), config))
            .insert_raw(record);
    }

    pub(crate) fn remove_frame(&mut self, camera: &CameraId, frame: FrameIndex) {
        if let Some(track) = self.cameras.get_mut(camera) {
            track.remove_raw(frame);
            self.drop_if_empty(camera);
        }
    }

    fn drop_if_empty(&mut self, camera: &CameraId) {
        if self.cameras.get(camera).is_some_and(CameraTrack::is_empty) {
            self.cameras.remove(camera);
        }
    }

    /// Header used in snapshots
    pub fn header_patch(&self) -> ItemPatch {
        ItemPatch::header(self.name.clone(), self.number)
    }

    pub fn to_record(&self) -> ItemRecord {
        ItemRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            number: self.number,
            cameras: self
                .cameras
                .iter()
                .filter(|(_, track)| !track.is_empty())
                .map(|(camera, track)| CameraRecord {
                    camera: camera.clone(),
                    frames: track.frames().cloned().map(FrameData::from).collect(),
                })
                .collect(),
        }
    }
}
