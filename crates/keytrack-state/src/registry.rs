//! Instance registry
//!
//! Owns every instance and mediates every mutation of the tree. Each
//! mutating operation follows the same steps:
//!
//! 1. validate caller references (errors leave the tree untouched)
//! 2. touch the paths about to change
//! 3. mutate, absorbing the leaf deltas
//! 4. settle: destroy emptied items and instances, repair the selection
//! 5. commit the change set into a normalized [`Delta`]

use std::collections::{BTreeMap, BTreeSet};

use keytrack_core::{
    Attributes, Bounds, CameraId, CategoryId, Delta, DynamicDelta, FrameIndex, InstanceId, ItemId, KeytrackError,
    KeytrackResult, ShapeGeometry, ShapeOrders, ShapeType, Snapshot,
};
use keytrack_track::{FrameStatus, InterpolationConfig, Suggestion};
use tracing::debug;

use crate::{capture_paths, AnnotationInstance, AnnotationItem, Catalog, ChangeSet, Path, Selection};

/// Optional parts of a keyframe edit
///
/// The default does not interpolate. An edit made that way leaves the
/// non-key frames of the surrounding spans as they were, and the caller
/// must run [`InstanceRegistry::interpolate`] on the keyframe before they
/// are consistent again. [`KeyframeOptions::interpolated`] does both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeOptions {
    /// Draw order; a new frame draws one from the shape-order counter when unset
    pub order: Option<u32>,
    /// Frame attributes; kept (or copied from the nearest keyframe) when unset
    pub attributes: Option<Attributes>,
    /// Re-interpolate the spans around the edited keyframe
    pub interpolate: bool,
    /// Create missing frames in the backward span when interpolating
    pub insert_missing: bool,
}

impl KeyframeOptions {
    pub fn interpolated(insert_missing: bool) -> Self {
        KeyframeOptions {
            interpolate: true,
            insert_missing,
            ..Default::default()
        }
    }
}

/// Result of an operation that creates an item
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub instance: InstanceId,
    pub item: ItemId,
    pub delta: Delta,
}

/// All annotation instances of a sequence
#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    pub(crate) instances: BTreeMap<InstanceId, AnnotationInstance>,
    catalog: Catalog,
    pub(crate) selection: Selection,
    orders: ShapeOrders,
    config: InterpolationConfig,
}

impl InstanceRegistry {
    pub fn new(catalog: Catalog) -> Self {
        InstanceRegistry {
            catalog,
            ..Default::default()
        }
    }

    /// Share the shape-order counter with a frame-sequence coordinator
    pub fn with_orders(mut self, orders: ShapeOrders) -> Self {
        self.orders = orders;
        self
    }

    pub fn with_config(mut self, config: InterpolationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn orders(&self) -> &ShapeOrders {
        &self.orders
    }

    pub fn config(&self) -> InterpolationConfig {
        self.config
    }

    // ---- queries ----

    pub fn instance(&self, id: &InstanceId) -> Option<&AnnotationInstance> {
        self.instances.get(id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &AnnotationInstance> {
        self.instances.values()
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.instances.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn item(&self, id: &InstanceId, item: &ItemId) -> KeytrackResult<&AnnotationItem> {
        self.require_instance(id)?
            .item(item)
            .ok_or_else(|| KeytrackError::UnknownItem {
                instance: id.clone(),
                item: item.clone(),
            })
    }

    /// Next free number in a category (max existing + 1)
    pub fn next_instance_number(&self, category: &CategoryId) -> u32 {
        self.instances
            .values()
            .filter(|instance| instance.category() == category)
            .map(AnnotationInstance::number)
            .max()
            .map_or(1, |max| max + 1)
    }

    pub fn next_item_number(&self, id: &InstanceId, name: &str) -> KeytrackResult<u32> {
        Ok(self.require_instance(id)?.next_item_number(name))
    }

    /// Suggest geometry for an empty frame of an item
    pub fn predict(
        &self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        shape_type: ShapeType,
        bounds: Option<Bounds>,
    ) -> KeytrackResult<Option<Suggestion>> {
        Ok(self.item(id, item)?.predict(camera, frame, shape_type, bounds))
    }

    /// Presence per frame on one camera, merged across every instance
    pub fn frame_statuses(&self, camera: &CameraId) -> BTreeMap<FrameIndex, FrameStatus> {
        let mut merged = BTreeMap::new();
        for instance in self.instances.values() {
            for (frame, status) in instance.frame_statuses(camera) {
                merged
                    .entry(frame)
                    .and_modify(|s: &mut FrameStatus| *s = s.merge(status))
                    .or_insert(status);
            }
        }
        merged
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Move the selection cursor; targets must exist
    pub fn select(&mut self, selection: Selection) -> KeytrackResult<()> {
        let Some(id) = &selection.instance else {
            self.selection.clear();
            return Ok(());
        };
        let instance = self.require_instance(id)?;
        if let Some(item) = &selection.item {
            if instance.item(item).is_none() {
                return Err(KeytrackError::UnknownItem {
                    instance: id.clone(),
                    item: item.clone(),
                });
            }
        }
        self.selection = selection;
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Full snapshot of the named instances (absent ones recorded as absent)
    pub fn snapshot_instances(&self, ids: &[InstanceId]) -> Snapshot {
        let paths: BTreeSet<Path> = ids.iter().flat_map(|id| Path::whole_instance(self, id)).collect();
        capture_paths(self, &paths)
    }

    fn require_instance(&self, id: &InstanceId) -> KeytrackResult<&AnnotationInstance> {
        self.instances
            .get(id)
            .ok_or_else(|| KeytrackError::UnknownInstance(id.clone()))
    }

    fn require_instance_mut(&mut self, id: &InstanceId) -> KeytrackResult<&mut AnnotationInstance> {
        self.instances
            .get_mut(id)
            .ok_or_else(|| KeytrackError::UnknownInstance(id.clone()))
    }

    // ---- creation ----

    /// Create an instance holding one item with one keyframe
    pub fn create_instance(
        &mut self,
        category: CategoryId,
        item_name: &str,
        camera: &CameraId,
        frame: FrameIndex,
        geometry: ShapeGeometry,
        attributes: Attributes,
    ) -> KeytrackResult<Created> {
        self.catalog.check_item(&category, item_name)?;
        self.catalog.check_camera(camera)?;

        let id = InstanceId::generate();
        let number = self.next_instance_number(&category);

        let mut changes = ChangeSet::new();
        changes.touch_instance(self, &id);
        self.instances.insert(
            id.clone(),
            AnnotationInstance::new(id.clone(), category.clone(), number, attributes),
        );
        debug!(instance = %id, %category, number, "instance created");

        let item = self.insert_item(&mut changes, &id, item_name, camera, frame, geometry)?;
        self.selection = Selection::item(id.clone(), item.clone());
        self.settle(&mut changes);

        Ok(Created {
            instance: id,
            item,
            delta: changes.commit(self),
        })
    }

    /// Add an item with one keyframe to an existing instance
    pub fn add_item(
        &mut self,
        id: &InstanceId,
        item_name: &str,
        camera: &CameraId,
        frame: FrameIndex,
        geometry: ShapeGeometry,
    ) -> KeytrackResult<Created> {
        let category = self.require_instance(id)?.category().clone();
        self.catalog.check_item(&category, item_name)?;
        self.catalog.check_camera(camera)?;

        let mut changes = ChangeSet::new();
        changes.touch_instance(self, id);
        let item = self.insert_item(&mut changes, id, item_name, camera, frame, geometry)?;
        self.selection = Selection::item(id.clone(), item.clone());
        self.settle(&mut changes);

        Ok(Created {
            instance: id.clone(),
            item,
            delta: changes.commit(self),
        })
    }

    fn insert_item(
        &mut self,
        changes: &mut ChangeSet,
        id: &InstanceId,
        item_name: &str,
        camera: &CameraId,
        frame: FrameIndex,
        geometry: ShapeGeometry,
    ) -> KeytrackResult<ItemId> {
        let item = ItemId::generate();
        changes.touch_item(self, id, &item);

        let config = self.config;
        let orders = self.orders.clone();
        let instance = self.require_instance_mut(id)?;
        let number = instance.next_item_number(item_name);
        instance.insert_item(AnnotationItem::new(item.clone(), item_name, number, config));
        let change = instance.set_keyframe(&item, camera, frame, geometry, None, None, &orders)?;
        changes.absorb(id, &change);

        debug!(instance = %id, item = %item, name = item_name, number, "item created");
        Ok(item)
    }

    // ---- edits ----

    /// Set a keyframe on one item, optionally re-interpolating around it
    pub fn set_keyframe(
        &mut self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        geometry: ShapeGeometry,
        options: KeyframeOptions,
    ) -> KeytrackResult<Delta> {
        self.catalog.check_camera(camera)?;
        self.item(id, item)?;

        let mut changes = ChangeSet::new();
        changes.touch_item(self, id, item);

        let orders = self.orders.clone();
        let instance = self.require_instance_mut(id)?;
        let change = instance.set_keyframe(item, camera, frame, geometry, options.order, options.attributes, &orders)?;
        changes.absorb(id, &change);
        if options.interpolate {
            let change = instance.interpolate(item, camera, frame, options.insert_missing, &orders)?;
            changes.absorb(id, &change);
        }

        self.settle(&mut changes);
        Ok(changes.commit(self))
    }

    /// Recompute the spans around keyframe `frame` of one item
    pub fn interpolate(
        &mut self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        insert_missing: bool,
    ) -> KeytrackResult<Delta> {
        self.item(id, item)?;

        let mut changes = ChangeSet::new();
        changes.touch_item(self, id, item);

        let orders = self.orders.clone();
        let change = self
            .require_instance_mut(id)?
            .interpolate(item, camera, frame, insert_missing, &orders)?;
        changes.absorb(id, &change);

        self.settle(&mut changes);
        Ok(changes.commit(self))
    }

    pub fn set_instance_attributes(&mut self, id: &InstanceId, attributes: Attributes) -> KeytrackResult<Delta> {
        self.require_instance(id)?;

        let mut changes = ChangeSet::new();
        changes.touch_instance(self, id);
        self.require_instance_mut(id)?.set_attributes(attributes);
        Ok(changes.commit(self))
    }

    pub fn set_dynamic_attributes(
        &mut self,
        id: &InstanceId,
        camera: &CameraId,
        frame: FrameIndex,
        attributes: Attributes,
    ) -> KeytrackResult<Delta> {
        self.require_instance(id)?;

        let mut changes = ChangeSet::new();
        changes.touch_instance(self, id);
        let delta = self
            .require_instance_mut(id)?
            .set_dynamic_attributes(camera, frame, attributes)?;
        changes.absorb_dynamic(id, camera, &delta);
        Ok(changes.commit(self))
    }

    pub fn set_frame_attributes(
        &mut self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        attributes: Attributes,
    ) -> KeytrackResult<Delta> {
        self.item(id, item)?;

        let mut changes = ChangeSet::new();
        changes.touch_item(self, id, item);
        let change = self
            .require_instance_mut(id)?
            .set_frame_attributes(item, camera, frame, attributes)?;
        changes.absorb(id, &change);
        Ok(changes.commit(self))
    }

    /// Give an instance a new number within its category
    pub fn renumber_instance(&mut self, id: &InstanceId, number: u32) -> KeytrackResult<Delta> {
        let instance = self.require_instance(id)?;
        let category = instance.category().clone();
        let taken = self
            .instances
            .values()
            .any(|other| other.id() != id && other.category() == &category && other.number() == number);
        if taken {
            return Err(KeytrackError::NumberTaken { category, number });
        }

        let mut changes = ChangeSet::new();
        changes.touch_instance(self, id);
        self.require_instance_mut(id)?.set_number(number);
        debug!(instance = %id, number, "instance renumbered");
        Ok(changes.commit(self))
    }

    // ---- removal ----

    /// Delete frames of one item on one camera
    pub fn remove_frames(
        &mut self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frames: &[FrameIndex],
    ) -> KeytrackResult<Delta> {
        self.item(id, item)?;

        let mut changes = ChangeSet::new();
        changes.touch_item(self, id, item);
        let change = self.require_instance_mut(id)?.remove_frames(item, camera, frames)?;
        changes.absorb(id, &change);

        self.settle(&mut changes);
        Ok(changes.commit(self))
    }

    /// Delete one item's whole track on one camera
    pub fn remove_camera(&mut self, id: &InstanceId, item: &ItemId, camera: &CameraId) -> KeytrackResult<Delta> {
        self.item(id, item)?;

        let mut changes = ChangeSet::new();
        changes.touch_item(self, id, item);
        let change = self.require_instance_mut(id)?.clear_camera(item, camera)?;
        changes.absorb(id, &change);

        self.settle(&mut changes);
        Ok(changes.commit(self))
    }

    pub fn remove_item(&mut self, id: &InstanceId, item: &ItemId) -> KeytrackResult<Delta> {
        self.item(id, item)?;

        let mut changes = ChangeSet::new();
        changes.touch_item(self, id, item);
        let change = self.require_instance_mut(id)?.clear_item(item)?;
        changes.absorb(id, &change);

        self.settle(&mut changes);
        Ok(changes.commit(self))
    }

    pub fn remove_instance(&mut self, id: &InstanceId) -> KeytrackResult<Delta> {
        let items: Vec<ItemId> = self.require_instance(id)?.items().map(|i| i.id().clone()).collect();

        let mut changes = ChangeSet::new();
        for item in &items {
            changes.touch_item(self, id, item);
        }
        let change = self.require_instance_mut(id)?.clear();
        changes.absorb(id, &change);

        self.settle(&mut changes);
        Ok(changes.commit(self))
    }

    /// Destroy emptied items and instances among the touched ones
    ///
    /// The single place where containers are destroyed. Every destroyed
    /// node is touched first so its before-value is part of the change.
    pub(crate) fn settle(&mut self, changes: &mut ChangeSet) {
        for id in changes.touched_instances() {
            let Some(instance) = self.instances.get(&id) else {
                continue;
            };

            let emptied: Vec<ItemId> = instance
                .items()
                .filter(|item| item.is_empty())
                .map(|item| item.id().clone())
                .collect();
            for item in emptied {
                changes.touch_item(self, &id, &item);
                if let Some(removed) = self.instances.get_mut(&id).and_then(|i| i.remove_item(&item)) {
                    assert!(
                        removed.existed_cameras().is_empty(),
                        "item {item} destroyed while holding frames"
                    );
                    debug!(instance = %id, item = %item, "empty item removed");
                }
            }

            let Some(instance) = self.instances.get(&id) else {
                continue;
            };
            if instance.item_count() > 0 {
                continue;
            }

            changes.touch_instance(self, &id);
            let leftover: Vec<(CameraId, DynamicDelta)> = instance
                .dynamic_attributes()
                .iter()
                .map(|(camera, frames)| {
                    let mut delta = DynamicDelta::new();
                    for (frame, attributes) in frames {
                        delta.record(*frame, Some(attributes.clone()), None);
                    }
                    (camera.clone(), delta)
                })
                .collect();
            for (camera, delta) in &leftover {
                changes.absorb_dynamic(&id, camera, delta);
            }

            self.instances.remove(&id);
            debug!(instance = %id, "empty instance removed");
        }

        if self.selection.repair(&self.instances) {
            debug!(selection = ?self.selection, "selection repaired");
        }
    }

    /// Drop every instance and reset the counters
    pub fn clear(&mut self) {
        self.instances.clear();
        self.selection.clear();
        self.orders.reset();
    }
}
