//! Change capture
//!
//! A [`ChangeSet`] follows one logical mutation. Every path is touched
//! before it is mutated, so its before-value is the value the mutation
//! started from. Committing captures the current value of every touched
//! path and pairs the two snapshots into a normalized [`Delta`].

use std::collections::BTreeSet;

use keytrack_core::{
    CameraId, Delta, DynamicDelta, FrameIndex, InstanceId, ItemId, Snapshot, TrackDelta,
};

use crate::{AnnotationInstance, AnnotationItem, InstanceChange, InstanceRegistry};

/// Address of one node in the annotation tree
///
/// Variants are ordered parent-first, so iterating a sorted set of paths
/// always visits an instance before its items and an item before its frames.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Path {
    Instance(InstanceId),
    Item(InstanceId, ItemId),
    Frame(InstanceId, ItemId, CameraId, FrameIndex),
    Dynamic(InstanceId, CameraId, FrameIndex),
}

impl Path {
    pub fn instance(&self) -> &InstanceId {
        match self {
            Path::Instance(id) | Path::Item(id, _) | Path::Frame(id, ..) | Path::Dynamic(id, ..) => id,
        }
    }

    /// Every path present in a snapshot, absent markers included
    pub fn collect(snapshot: &Snapshot) -> BTreeSet<Path> {
        let mut paths = BTreeSet::new();
        for (id, patch) in &snapshot.instances {
            paths.insert(Path::Instance(id.clone()));
            let Some(patch) = patch else { continue };

            for (camera, slots) in &patch.dynamic {
                for frame in slots.keys() {
                    paths.insert(Path::Dynamic(id.clone(), camera.clone(), *frame));
                }
            }
            for (item, item_patch) in &patch.items {
                paths.insert(Path::Item(id.clone(), item.clone()));
                let Some(item_patch) = item_patch else { continue };
                for (camera, slots) in &item_patch.cameras {
                    for frame in slots.keys() {
                        paths.insert(Path::Frame(id.clone(), item.clone(), camera.clone(), *frame));
                    }
                }
            }
        }
        paths
    }

    /// Every path that currently exists under an instance
    pub fn whole_instance(registry: &InstanceRegistry, id: &InstanceId) -> BTreeSet<Path> {
        let mut paths = BTreeSet::from([Path::Instance(id.clone())]);
        let Some(instance) = registry.instance(id) else {
            return paths;
        };

        for (camera, frames) in instance.dynamic_attributes() {
            for frame in frames.keys() {
                paths.insert(Path::Dynamic(id.clone(), camera.clone(), *frame));
            }
        }
        for item in instance.items() {
            paths.insert(Path::Item(id.clone(), item.id().clone()));
            for track in item.tracks() {
                for frame in track.frame_indices() {
                    paths.insert(Path::Frame(id.clone(), item.id().clone(), track.camera().clone(), frame));
                }
            }
        }
        paths
    }

    /// Record "absent" for this path unless the snapshot already holds it
    pub fn mark_absent(&self, snapshot: &mut Snapshot) {
        match self {
            Path::Instance(id) => {
                snapshot.instances.entry(id.clone()).or_insert(None);
            }
            Path::Item(id, item) => {
                if let Some(Some(patch)) = snapshot.instances.get_mut(id) {
                    patch.items.entry(item.clone()).or_insert(None);
                }
            }
            Path::Frame(id, item, camera, frame) => snapshot.observe_frame(id, item, camera, *frame, None),
            Path::Dynamic(id, camera, frame) => snapshot.observe_dynamic(id, camera, *frame, None),
        }
    }
}

/// Capture the current value of every path
pub fn capture_paths(registry: &InstanceRegistry, paths: &BTreeSet<Path>) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for path in paths {
        match path {
            Path::Instance(id) => {
                let value = registry.instance(id).map(AnnotationInstance::header_patch);
                snapshot.instances.insert(id.clone(), value);
            }
            Path::Item(id, item) => {
                let value = registry
                    .instance(id)
                    .and_then(|instance| instance.item(item))
                    .map(AnnotationItem::header_patch);
                if let Some(Some(patch)) = snapshot.instances.get_mut(id) {
                    patch.items.insert(item.clone(), value);
                }
            }
            Path::Frame(id, item, camera, frame) => {
                let value = registry
                    .instance(id)
                    .and_then(|instance| instance.item(item))
                    .and_then(|item| item.frame(camera, *frame))
                    .cloned();
                snapshot.observe_frame(id, item, camera, *frame, value);
            }
            Path::Dynamic(id, camera, frame) => {
                let value = registry
                    .instance(id)
                    .and_then(|instance| instance.dynamic(camera, *frame))
                    .cloned();
                snapshot.observe_dynamic(id, camera, *frame, value);
            }
        }
    }
    snapshot
}

/// Pair a before-snapshot taken at the start of an interaction with the
/// current state of the same instances
///
/// `touched` names instances the interaction may have created or changed
/// beyond those the before-snapshot already covers.
pub fn settle_interaction(registry: &InstanceRegistry, before: Snapshot, touched: &[InstanceId]) -> Delta {
    let mut paths = Path::collect(&before);
    let ids: BTreeSet<InstanceId> = before.instance_ids().chain(touched).cloned().collect();
    for id in &ids {
        paths.extend(Path::whole_instance(registry, id));
    }

    let mut before = before;
    for path in &paths {
        path.mark_absent(&mut before);
    }
    let after = capture_paths(registry, &paths);
    Delta::new(before, after).normalize()
}

/// Before-values and touched paths of one logical mutation
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    before: Snapshot,
    paths: BTreeSet<Path>,
}

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &BTreeSet<Path> {
        &self.paths
    }

    pub fn touched_instances(&self) -> BTreeSet<InstanceId> {
        self.paths.iter().map(|path| path.instance().clone()).collect()
    }

    /// Remember an instance header before it changes
    pub fn touch_instance(&mut self, registry: &InstanceRegistry, id: &InstanceId) {
        if !self.paths.insert(Path::Instance(id.clone())) {
            return;
        }
        let value = registry.instance(id).map(AnnotationInstance::header_patch);
        self.before.instances.entry(id.clone()).or_insert(value);
    }

    /// Remember an item header before it changes
    pub fn touch_item(&mut self, registry: &InstanceRegistry, id: &InstanceId, item: &ItemId) {
        self.touch_instance(registry, id);
        if !self.paths.insert(Path::Item(id.clone(), item.clone())) {
            return;
        }
        let value = registry
            .instance(id)
            .and_then(|instance| instance.item(item))
            .map(AnnotationItem::header_patch);
        if let Some(Some(patch)) = self.before.instances.get_mut(id) {
            patch.items.entry(item.clone()).or_insert(value);
        }
    }

    /// Take the before-values of frames a track operation reported
    pub fn absorb_frames(&mut self, id: &InstanceId, item: &ItemId, camera: &CameraId, delta: &TrackDelta) {
        self.paths.insert(Path::Instance(id.clone()));
        self.paths.insert(Path::Item(id.clone(), item.clone()));
        for (frame, value) in &delta.before {
            self.paths.insert(Path::Frame(id.clone(), item.clone(), camera.clone(), *frame));
            self.before.observe_frame(id, item, camera, *frame, value.clone());
        }
    }

    /// Take the before-values of dynamic attribute slots
    pub fn absorb_dynamic(&mut self, id: &InstanceId, camera: &CameraId, delta: &DynamicDelta) {
        self.paths.insert(Path::Instance(id.clone()));
        for (frame, value) in &delta.before {
            self.paths.insert(Path::Dynamic(id.clone(), camera.clone(), *frame));
            self.before.observe_dynamic(id, camera, *frame, value.clone());
        }
    }

    pub fn absorb(&mut self, id: &InstanceId, change: &InstanceChange) {
        for (item, camera, delta) in &change.frames {
            self.absorb_frames(id, item, camera, delta);
        }
        for (camera, delta) in &change.dynamic {
            self.absorb_dynamic(id, camera, delta);
        }
    }

    /// Capture after-values and pair them with the recorded before-values
    pub fn commit(self, registry: &InstanceRegistry) -> Delta {
        let after = capture_paths(registry, &self.paths);
        Delta::new(self.before, after).normalize()
    }
}
