//! Annotation instance - one tracked object

use std::collections::{BTreeMap, BTreeSet};

use keytrack_core::{
    Attributes, CameraId, CategoryId, DynamicAttributesRecord, DynamicDelta, DynamicFrameRecord, FrameIndex,
    InstanceId, InstancePatch, InstanceRecord, ItemId, KeytrackError, KeytrackResult, ShapeGeometry, ShapeOrders,
    TrackDelta,
};
use keytrack_track::FrameStatus;
use tracing::trace;

use crate::AnnotationItem;

/// Leaf deltas produced by one instance-level mutation
#[derive(Debug, Default)]
pub struct InstanceChange {
    pub frames: Vec<(ItemId, CameraId, TrackDelta)>,
    pub dynamic: BTreeMap<CameraId, DynamicDelta>,
}

impl InstanceChange {
    pub fn is_empty(&self) -> bool {
        self.frames.iter().all(|(_, _, delta)| delta.is_empty()) && self.dynamic.values().all(DynamicDelta::is_empty)
    }

    fn push_frames(&mut self, item: &ItemId, camera: &CameraId, delta: TrackDelta) {
        if !delta.is_empty() {
            self.frames.push((item.clone(), camera.clone(), delta));
        }
    }

    fn push_dynamic(&mut self, camera: &CameraId, delta: DynamicDelta) {
        if !delta.is_empty() {
            self.dynamic.entry(camera.clone()).or_default().merge(delta);
        }
    }
}

/// One tracked object: its items plus instance-level attributes
///
/// Dynamic attributes are per (camera, frame) and only live where at least
/// one item has a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationInstance {
    id: InstanceId,
    category: CategoryId,
    number: u32,
    attributes: Attributes,
    dynamic: BTreeMap<CameraId, BTreeMap<FrameIndex, Attributes>>,
    items: BTreeMap<ItemId, AnnotationItem>,
}

impl AnnotationInstance {
    pub fn new(id: InstanceId, category: CategoryId, number: u32, attributes: Attributes) -> Self {
        AnnotationInstance {
            id,
            category,
            number,
            attributes,
            dynamic: BTreeMap::new(),
            items: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn category(&self) -> &CategoryId {
        &self.category
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub(crate) fn set_number(&mut self, number: u32) {
        self.number = number;
    }

    pub(crate) fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }

    pub fn item(&self, id: &ItemId) -> Option<&AnnotationItem> {
        self.items.get(id)
    }

    pub(crate) fn item_mut(&mut self, id: &ItemId) -> Option<&mut AnnotationItem> {
        self.items.get_mut(id)
    }

    pub fn items(&self) -> impl Iterator<Item = &AnnotationItem> {
        self.items.values()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn insert_item(&mut self, item: AnnotationItem) {
        self.items.insert(item.id().clone(), item);
    }

    pub(crate) fn remove_item(&mut self, id: &ItemId) -> Option<AnnotationItem> {
        self.items.remove(id)
    }

    pub fn dynamic(&self, camera: &CameraId, frame: FrameIndex) -> Option<&Attributes> {
        self.dynamic.get(camera).and_then(|frames| frames.get(&frame))
    }

    pub fn dynamic_attributes(&self) -> &BTreeMap<CameraId, BTreeMap<FrameIndex, Attributes>> {
        &self.dynamic
    }

    /// Whether any item has a frame at (camera, frame)
    pub fn has_frame_at(&self, camera: &CameraId, frame: FrameIndex) -> bool {
        self.items.values().any(|item| item.has_frame(camera, frame))
    }

    /// Cameras on which any item holds a frame
    pub fn existed_cameras(&self) -> BTreeSet<CameraId> {
        self.items.values().flat_map(AnnotationItem::existed_cameras).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.values().all(AnnotationItem::is_empty)
    }

    /// Presence per frame on one camera, merged across items
    pub fn frame_statuses(&self, camera: &CameraId) -> BTreeMap<FrameIndex, FrameStatus> {
        let mut merged = BTreeMap::new();
        for item in self.items.values() {
            for (frame, status) in item.frame_statuses(camera) {
                merged
                    .entry(frame)
                    .and_modify(|s: &mut FrameStatus| *s = s.merge(status))
                    .or_insert(status);
            }
        }
        merged
    }

    /// Next free number among items named `name`
    pub fn next_item_number(&self, name: &str) -> u32 {
        self.items
            .values()
            .filter(|item| item.name() == name)
            .map(AnnotationItem::number)
            .max()
            .map_or(1, |max| max + 1)
    }

    fn item_or_err(&mut self, item: &ItemId) -> KeytrackResult<&mut AnnotationItem> {
        let instance = self.id.clone();
        self.items.get_mut(item).ok_or_else(|| KeytrackError::UnknownItem {
            instance,
            item: item.clone(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn set_keyframe(
        &mut self,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        geometry: ShapeGeometry,
        order: Option<u32>,
        attributes: Option<Attributes>,
        orders: &ShapeOrders,
    ) -> KeytrackResult<InstanceChange> {
        let delta = self
            .item_or_err(item)?
            .add_or_update_keyframe(camera, frame, geometry, order, attributes, orders);
        let mut change = InstanceChange::default();
        change.push_frames(item, camera, delta);
        Ok(change)
    }

    /// Interpolate one item's track around keyframe `frame`
    ///
    /// Frames of the backward span that have no dynamic attributes inherit
    /// those of the anchoring keyframe.
    pub(crate) fn interpolate(
        &mut self,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        insert_missing: bool,
        orders: &ShapeOrders,
    ) -> KeytrackResult<InstanceChange> {
        let target = self.item_or_err(item)?;
        let delta = target.interpolate(camera, frame, insert_missing, orders);

        let mut span = Vec::new();
        let mut anchor = None;
        if let Some(track) = target.track(camera) {
            if track.get(frame).is_some_and(|r| r.is_key_frame) {
                anchor = track.backward_anchor(frame).map(|r| r.frame_index);
            }
            if let Some(start) = anchor {
                span.extend(track.frame_indices().filter(|f| *f > start && *f < frame));
            }
        }

        let mut change = InstanceChange::default();
        change.push_frames(item, camera, delta);
        if let Some(anchor) = anchor {
            let propagated = self.propagate_dynamic(camera, anchor, &span);
            change.push_dynamic(camera, propagated);
        }
        Ok(change)
    }

    fn propagate_dynamic(&mut self, camera: &CameraId, anchor: FrameIndex, frames: &[FrameIndex]) -> DynamicDelta {
        let mut delta = DynamicDelta::new();
        let Some(source) = self.dynamic(camera, anchor).cloned() else {
            return delta;
        };

        let slots = self.dynamic.entry(camera.clone()).or_default();
        for &frame in frames {
            if !slots.contains_key(&frame) {
                slots.insert(frame, source.clone());
                delta.record(frame, None, Some(source.clone()));
            }
        }
        if !delta.is_empty() {
            trace!(instance = %self.id, camera = %camera, anchor, filled = delta.len(), "dynamic attributes propagated");
        }
        delta
    }

    /// Drop dynamic attributes at frames no item covers any more
    fn prune_dynamic(&mut self, camera: &CameraId, frames: impl IntoIterator<Item = FrameIndex>) -> DynamicDelta {
        let uncovered: Vec<FrameIndex> = frames.into_iter().filter(|f| !self.has_frame_at(camera, *f)).collect();

        let mut delta = DynamicDelta::new();
        if let Some(slots) = self.dynamic.get_mut(camera) {
            for frame in uncovered {
                if let Some(removed) = slots.remove(&frame) {
                    delta.record(frame, Some(removed), None);
                }
            }
            if slots.is_empty() {
                self.dynamic.remove(camera);
            }
        }
        delta
    }

    pub(crate) fn remove_frames(
        &mut self,
        item: &ItemId,
        camera: &CameraId,
        frames: &[FrameIndex],
    ) -> KeytrackResult<InstanceChange> {
        let delta = self.item_or_err(item)?.remove_frames(camera, frames);
        let removed: Vec<FrameIndex> = delta.removed().collect();

        let mut change = InstanceChange::default();
        change.push_frames(item, camera, delta);
        let pruned = self.prune_dynamic(camera, removed);
        change.push_dynamic(camera, pruned);
        Ok(change)
    }

    pub(crate) fn clear_camera(&mut self, item: &ItemId, camera: &CameraId) -> KeytrackResult<InstanceChange> {
        let delta = self.item_or_err(item)?.clear_camera(camera);
        let removed: Vec<FrameIndex> = delta.removed().collect();

        let mut change = InstanceChange::default();
        change.push_frames(item, camera, delta);
        let pruned = self.prune_dynamic(camera, removed);
        change.push_dynamic(camera, pruned);
        Ok(change)
    }

    pub(crate) fn clear_item(&mut self, item: &ItemId) -> KeytrackResult<InstanceChange> {
        let cleared = self.item_or_err(item)?.clear();

        let mut change = InstanceChange::default();
        let mut removed: Vec<(CameraId, Vec<FrameIndex>)> = Vec::new();
        for (camera, delta) in cleared {
            removed.push((camera.clone(), delta.removed().collect()));
            change.push_frames(item, &camera, delta);
        }
        for (camera, frames) in removed {
            let pruned = self.prune_dynamic(&camera, frames);
            change.push_dynamic(&camera, pruned);
        }
        Ok(change)
    }

    /// Remove every frame of every item
    pub(crate) fn clear(&mut self) -> InstanceChange {
        let ids: Vec<ItemId> = self.items.keys().cloned().collect();
        let mut change = InstanceChange::default();
        for id in ids {
            if let Ok(cleared) = self.clear_item(&id) {
                change.frames.extend(cleared.frames);
                for (camera, delta) in cleared.dynamic {
                    change.push_dynamic(&camera, delta);
                }
            }
        }
        change
    }

    pub(crate) fn set_frame_attributes(
        &mut self,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        attributes: Attributes,
    ) -> KeytrackResult<InstanceChange> {
        let target = self.item_or_err(item)?;
        if !target.has_frame(camera, frame) {
            return Err(KeytrackError::FrameNotFound {
                camera: camera.clone(),
                frame,
            });
        }
        let delta = target.set_frame_attributes(camera, frame, attributes);
        let mut change = InstanceChange::default();
        change.push_frames(item, camera, delta);
        Ok(change)
    }

    /// Replace the dynamic attributes at (camera, frame)
    ///
    /// An empty map removes the entry. Fails when no item has a frame there.
    pub(crate) fn set_dynamic_attributes(
        &mut self,
        camera: &CameraId,
        frame: FrameIndex,
        attributes: Attributes,
    ) -> KeytrackResult<DynamicDelta> {
        if !self.has_frame_at(camera, frame) {
            return Err(KeytrackError::FrameNotFound {
                camera: camera.clone(),
                frame,
            });
        }

        let before = self.dynamic(camera, frame).cloned();
        let after = (!attributes.is_empty()).then_some(attributes);
        match &after {
            Some(attributes) => {
                self.insert_dynamic(camera, frame, attributes.clone());
            }
            None => self.remove_dynamic(camera, frame),
        }

        let mut delta = DynamicDelta::new();
        delta.record(frame, before, after);
        Ok(delta)
    }

    pub(crate) fn insert_dynamic(&mut self, camera: &CameraId, frame: FrameIndex, attributes: Attributes) {
        self.dynamic.entry(camera.clone()).or_default().insert(frame, attributes);
    }

    pub(crate) fn remove_dynamic(&mut self, camera: &CameraId, frame: FrameIndex) {
        if let Some(slots) = self.dynamic.get_mut(camera) {
            slots.remove(&frame);
            if slots.is_empty() {
                self.dynamic.remove(camera);
            }
        }
    }

    /// Header used in snapshots
    pub fn header_patch(&self) -> InstancePatch {
        InstancePatch::header(self.category.clone(), self.number, self.attributes.clone())
    }

    pub fn to_record(&self) -> InstanceRecord {
        let dynamic: Vec<DynamicAttributesRecord> = self
            .dynamic
            .iter()
            .filter(|(_, frames)| !frames.is_empty())
            .map(|(camera, frames)| DynamicAttributesRecord {
                camera: camera.clone(),
                frames: frames
                    .iter()
                    .map(|(frame, attributes)| DynamicFrameRecord {
                        frame_index: *frame,
                        attributes: attributes.clone(),
                    })
                    .collect(),
            })
            .collect();

        InstanceRecord {
            id: self.id.clone(),
            category: self.category.clone(),
            number: self.number,
            attributes: (!self.attributes.is_empty()).then(|| self.attributes.clone()),
            dynamic_attributes: (!dynamic.is_empty()).then_some(dynamic),
            children: self
                .items
                .values()
                .filter(|item| !item.is_empty())
                .map(AnnotationItem::to_record)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keytrack_core::Rect;
    use keytrack_track::InterpolationConfig;
    use serde_json::json;

    fn rect(x: f64) -> ShapeGeometry {
        ShapeGeometry::Rectangle(Rect::new(x, 0.0, 10.0, 10.0))
    }

    fn attrs(key: &str, value: serde_json::Value) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(key.to_string(), value);
        attributes
    }

    fn instance_with_items(names: &[(&str, &str)]) -> AnnotationInstance {
        let mut instance = AnnotationInstance::new("i1".into(), "car".into(), 1, Attributes::new());
        for (id, name) in names {
            let number = instance.next_item_number(name);
            instance.insert_item(AnnotationItem::new((*id).into(), *name, number, InterpolationConfig::default()));
        }
        instance
    }

    #[test]
    fn test_item_numbers_per_name() {
        let instance = instance_with_items(&[("a", "wheel"), ("b", "wheel"), ("c", "body")]);
        assert_eq!(instance.item(&"b".into()).unwrap().number(), 2);
        assert_eq!(instance.item(&"c".into()).unwrap().number(), 1);
        assert_eq!(instance.next_item_number("wheel"), 3);
        assert_eq!(instance.next_item_number("mirror"), 1);
    }

    #[test]
    fn test_dynamic_propagates_into_backward_span() {
        let orders = ShapeOrders::new();
        let front = CameraId::from("front");
        let item = ItemId::from("a");
        let mut instance = instance_with_items(&[("a", "body")]);

        instance.set_keyframe(&item, &front, 0, rect(0.0), None, None, &orders).unwrap();
        instance.set_keyframe(&item, &front, 4, rect(40.0), None, None, &orders).unwrap();
        instance.set_dynamic_attributes(&front, 0, attrs("moving", json!(true))).unwrap();

        instance.set_keyframe(&item, &front, 2, rect(0.0), None, None, &orders).unwrap();
        instance.set_dynamic_attributes(&front, 2, attrs("moving", json!(false))).unwrap();
        instance.remove_frames(&item, &front, &[2]).unwrap();
        assert!(instance.dynamic(&front, 2).is_none());

        let change = instance.interpolate(&item, &front, 4, true, &orders).unwrap();
        assert_eq!(change.frames[0].2.len(), 3);
        assert_eq!(change.dynamic[&front].len(), 3);
        for frame in 1..4 {
            assert_eq!(instance.dynamic(&front, frame), Some(&attrs("moving", json!(true))));
        }
        assert!(instance.dynamic(&front, 4).is_none());
    }

    #[test]
    fn test_propagation_keeps_existing_dynamic() {
        let orders = ShapeOrders::new();
        let front = CameraId::from("front");
        let item = ItemId::from("a");
        let mut instance = instance_with_items(&[("a", "body")]);

        instance.set_keyframe(&item, &front, 0, rect(0.0), None, None, &orders).unwrap();
        instance.set_keyframe(&item, &front, 2, rect(20.0), None, None, &orders).unwrap();
        instance.interpolate(&item, &front, 2, true, &orders).unwrap();
        instance.set_dynamic_attributes(&front, 0, attrs("lane", json!(1))).unwrap();
        instance.set_dynamic_attributes(&front, 1, attrs("lane", json!(2))).unwrap();

        let change = instance.interpolate(&item, &front, 2, true, &orders).unwrap();
        assert!(change.is_empty());
        assert_eq!(instance.dynamic(&front, 1), Some(&attrs("lane", json!(2))));
    }

    #[test]
    fn test_dynamic_survives_while_another_item_covers_frame() {
        let orders = ShapeOrders::new();
        let front = CameraId::from("front");
        let (body, wheel) = (ItemId::from("a"), ItemId::from("b"));
        let mut instance = instance_with_items(&[("a", "body"), ("b", "wheel")]);

        instance.set_keyframe(&body, &front, 3, rect(0.0), None, None, &orders).unwrap();
        instance.set_keyframe(&wheel, &front, 3, rect(5.0), None, None, &orders).unwrap();
        instance.set_dynamic_attributes(&front, 3, attrs("parked", json!(true))).unwrap();

        let change = instance.remove_frames(&body, &front, &[3]).unwrap();
        assert!(change.dynamic.is_empty());
        assert!(instance.dynamic(&front, 3).is_some());

        let change = instance.clear_item(&wheel).unwrap();
        assert_eq!(change.dynamic[&front].removed().collect::<Vec<_>>(), vec![3]);
        assert!(instance.dynamic_attributes().is_empty());
        assert!(instance.is_empty());
    }

    #[test]
    fn test_dynamic_requires_covering_frame() {
        let mut instance = instance_with_items(&[("a", "body")]);
        let result = instance.set_dynamic_attributes(&"front".into(), 9, attrs("x", json!(1)));
        assert!(matches!(result, Err(KeytrackError::FrameNotFound { frame: 9, .. })));
    }

    #[test]
    fn test_merged_statuses_and_cameras() {
        let orders = ShapeOrders::new();
        let front = CameraId::from("front");
        let (body, wheel) = (ItemId::from("a"), ItemId::from("b"));
        let mut instance = instance_with_items(&[("a", "body"), ("b", "wheel")]);

        instance.set_keyframe(&body, &front, 0, rect(0.0), None, None, &orders).unwrap();
        instance.set_keyframe(&body, &front, 2, rect(2.0), None, None, &orders).unwrap();
        instance.interpolate(&body, &front, 2, true, &orders).unwrap();
        instance.set_keyframe(&wheel, &front, 1, rect(1.0), None, None, &orders).unwrap();
        instance.set_keyframe(&wheel, &"rear".into(), 7, rect(1.0), None, None, &orders).unwrap();

        let statuses = instance.frame_statuses(&front);
        assert_eq!(statuses[&1], FrameStatus::Key);
        assert_eq!(statuses.len(), 3);
        assert_eq!(instance.existed_cameras().len(), 2);
    }

    #[test]
    fn test_unknown_item_is_an_error() {
        let orders = ShapeOrders::new();
        let mut instance = instance_with_items(&[]);
        let result = instance.set_keyframe(&"nope".into(), &"front".into(), 0, rect(0.0), None, None, &orders);
        assert!(matches!(result, Err(KeytrackError::UnknownItem { .. })));
    }
}
