//! Partial snapshots - the unit of undo/redo
//!
//! A snapshot is a sparse copy of the annotation tree restricted to the
//! paths one operation touched. At every level `None` means "absent at
//! that moment", so replaying a snapshot both creates and deletes.
//!
//! A [`Delta`] pairs the snapshot taken before an operation with the one
//! taken after it, over the same set of paths.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Attributes, CameraId, CategoryId, FrameIndex, FrameRecord, InstanceId, ItemId};

/// Frame slots of one camera
pub type FramePatch = BTreeMap<FrameIndex, Option<FrameRecord>>;

/// Dynamic attribute slots of one camera
pub type DynamicPatch = BTreeMap<FrameIndex, Option<Attributes>>;

/// Sparse copy of the instance tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub instances: BTreeMap<InstanceId, Option<InstancePatch>>,
}

/// Instance header plus the touched parts of its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePatch {
    pub category: CategoryId,
    pub number: u32,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dynamic: BTreeMap<CameraId, DynamicPatch>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub items: BTreeMap<ItemId, Option<ItemPatch>>,
}

/// Item header plus the touched frame slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    pub name: String,
    pub number: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cameras: BTreeMap<CameraId, FramePatch>,
}

impl InstancePatch {
    pub fn header(category: CategoryId, number: u32, attributes: Attributes) -> Self {
        Self {
            category,
            number,
            attributes,
            dynamic: BTreeMap::new(),
            items: BTreeMap::new(),
        }
    }

    fn same_header(&self, other: &InstancePatch) -> bool {
        self.category == other.category && self.number == other.number && self.attributes == other.attributes
    }

    fn absorb(&mut self, later: InstancePatch) {
        for (camera, slots) in later.dynamic {
            let target = self.dynamic.entry(camera).or_default();
            for (frame, value) in slots {
                target.entry(frame).or_insert(value);
            }
        }
        absorb_optional(&mut self.items, later.items, ItemPatch::absorb);
    }
}

impl ItemPatch {
    pub fn header(name: impl Into<String>, number: u32) -> Self {
        Self {
            name: name.into(),
            number,
            cameras: BTreeMap::new(),
        }
    }

    fn absorb(&mut self, later: ItemPatch) {
        for (camera, slots) in later.cameras {
            let target = self.cameras.entry(camera).or_default();
            for (frame, value) in slots {
                target.entry(frame).or_insert(value);
            }
        }
    }
}

/// Merge `later` into `acc`, keeping entries `acc` already holds
fn absorb_optional<K: Ord, V>(
    acc: &mut BTreeMap<K, Option<V>>,
    later: BTreeMap<K, Option<V>>,
    merge: impl Fn(&mut V, V),
) {
    for (key, value) in later {
        match acc.get_mut(&key) {
            None => {
                acc.insert(key, value);
            }
            Some(Some(existing)) => {
                if let Some(value) = value {
                    merge(existing, value);
                }
            }
            Some(None) => {}
        }
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Snapshot::default()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = &InstanceId> {
        self.instances.keys()
    }

    /// Merge a later observation, keeping every value already recorded
    pub fn absorb(&mut self, later: Snapshot) {
        absorb_optional(&mut self.instances, later.instances, InstancePatch::absorb);
    }

    /// Record a frame value unless the slot was already observed
    ///
    /// Does nothing when the snapshot says the instance or item was absent.
    pub fn observe_frame(
        &mut self,
        instance: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        value: Option<FrameRecord>,
    ) {
        let Some(Some(patch)) = self.instances.get_mut(instance) else {
            return;
        };
        let Some(Some(item_patch)) = patch.items.get_mut(item) else {
            return;
        };
        item_patch
            .cameras
            .entry(camera.clone())
            .or_default()
            .entry(frame)
            .or_insert(value);
    }

    /// Record a dynamic attribute value unless the slot was already observed
    pub fn observe_dynamic(
        &mut self,
        instance: &InstanceId,
        camera: &CameraId,
        frame: FrameIndex,
        value: Option<Attributes>,
    ) {
        let Some(Some(patch)) = self.instances.get_mut(instance) else {
            return;
        };
        patch
            .dynamic
            .entry(camera.clone())
            .or_default()
            .entry(frame)
            .or_insert(value);
    }

    /// Number of frame slots in the snapshot
    pub fn frame_slots(&self) -> usize {
        self.instances
            .values()
            .flatten()
            .flat_map(|patch| patch.items.values().flatten())
            .flat_map(|item| item.cameras.values())
            .map(BTreeMap::len)
            .sum()
    }
}

/// Paired before/after snapshots of one logical mutation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub before: Snapshot,
    pub after: Snapshot,
}

impl Delta {
    pub fn new(before: Snapshot, after: Snapshot) -> Self {
        Self { before, after }
    }

    /// True when the mutation changed nothing
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    /// Instances named on either side
    pub fn touched_instances(&self) -> BTreeSet<InstanceId> {
        self.before
            .instance_ids()
            .chain(self.after.instance_ids())
            .cloned()
            .collect()
    }

    /// Drop every path whose before and after values are equal
    pub fn normalize(mut self) -> Self {
        prune_map(&mut self.before.instances, &mut self.after.instances, prune_instance);
        self
    }
}

/// Remove keys present on both sides whose values `settle` reports equal
fn prune_map<K: Ord + Clone, V>(
    before: &mut BTreeMap<K, V>,
    after: &mut BTreeMap<K, V>,
    mut settle: impl FnMut(&mut V, &mut V) -> bool,
) {
    let shared: Vec<K> = before.keys().filter(|k| after.contains_key(*k)).cloned().collect();
    for key in shared {
        let (Some(b), Some(a)) = (before.get_mut(&key), after.get_mut(&key)) else {
            continue;
        };
        if settle(b, a) {
            before.remove(&key);
            after.remove(&key);
        }
    }
}

fn prune_slots<T: PartialEq>(before: &mut BTreeMap<FrameIndex, Option<T>>, after: &mut BTreeMap<FrameIndex, Option<T>>) -> bool {
    prune_map(before, after, |b, a| b == a);
    before.is_empty() && after.is_empty()
}

fn prune_item(before: &mut Option<ItemPatch>, after: &mut Option<ItemPatch>) -> bool {
    match (before, after) {
        (None, None) => true,
        (Some(b), Some(a)) => {
            prune_map(&mut b.cameras, &mut a.cameras, |b, a| prune_slots(b, a));
            b.name == a.name && b.number == a.number && b.cameras.is_empty() && a.cameras.is_empty()
        }
        _ => false,
    }
}

fn prune_instance(before: &mut Option<InstancePatch>, after: &mut Option<InstancePatch>) -> bool {
    match (before, after) {
        (None, None) => true,
        (Some(b), Some(a)) => {
            prune_map(&mut b.dynamic, &mut a.dynamic, |b, a| prune_slots(b, a));
            prune_map(&mut b.items, &mut a.items, prune_item);
            b.same_header(a)
                && b.dynamic.is_empty()
                && a.dynamic.is_empty()
                && b.items.is_empty()
                && a.items.is_empty()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Rect, ShapeGeometry};

    fn frame(index: FrameIndex, x: f64) -> FrameRecord {
        FrameRecord::keyframe(index, ShapeGeometry::Rectangle(Rect::new(x, 0.0, 10.0, 10.0)))
    }

    fn instance_with(frames: FramePatch) -> Option<InstancePatch> {
        let mut item = ItemPatch::header("body", 1);
        item.cameras.insert(CameraId::from("front"), frames);
        let mut patch = InstancePatch::header(CategoryId::from("car"), 1, Attributes::new());
        patch.items.insert(ItemId::from("it1"), Some(item));
        Some(patch)
    }

    fn snapshot(patch: Option<InstancePatch>) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.instances.insert(InstanceId::from("i1"), patch);
        snapshot
    }

    #[test]
    fn test_normalize_drops_unchanged_paths() {
        let before = snapshot(instance_with(FramePatch::from([(0, Some(frame(0, 0.0))), (1, Some(frame(1, 1.0)))])));
        let after = snapshot(instance_with(FramePatch::from([(0, Some(frame(0, 0.0))), (1, Some(frame(1, 5.0)))])));

        let delta = Delta::new(before, after).normalize();
        assert_eq!(delta.before.frame_slots(), 1);
        assert_eq!(delta.after.frame_slots(), 1);
    }

    #[test]
    fn test_normalize_to_empty() {
        let same = snapshot(instance_with(FramePatch::from([(0, Some(frame(0, 0.0)))])));
        let delta = Delta::new(same.clone(), same).normalize();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_removed_instance_is_kept() {
        let before = snapshot(instance_with(FramePatch::from([(0, Some(frame(0, 0.0)))])));
        let after = snapshot(None);
        let delta = Delta::new(before, after).normalize();
        assert!(!delta.is_empty());
        assert_eq!(delta.touched_instances().len(), 1);
    }

    #[test]
    fn test_absorb_keeps_first_observation() {
        let mut acc = snapshot(instance_with(FramePatch::from([(0, Some(frame(0, 0.0)))])));
        let later = snapshot(instance_with(FramePatch::from([(0, None), (1, Some(frame(1, 1.0)))])));
        acc.absorb(later);

        let patch = acc.instances[&InstanceId::from("i1")].as_ref().unwrap();
        let slots = &patch.items[&ItemId::from("it1")].as_ref().unwrap().cameras[&CameraId::from("front")];
        assert_eq!(slots[&0], Some(frame(0, 0.0)));
        assert_eq!(slots[&1], Some(frame(1, 1.0)));

        let mut absent = snapshot(None);
        absent.absorb(acc.clone());
        assert_eq!(absent.instances[&InstanceId::from("i1")], None);
    }

    #[test]
    fn test_observe_frame_respects_absent_parent() {
        let mut absent = snapshot(None);
        absent.observe_frame(&"i1".into(), &"it1".into(), &"front".into(), 3, Some(frame(3, 3.0)));
        assert_eq!(absent.frame_slots(), 0);

        let mut present = snapshot(instance_with(FramePatch::new()));
        present.observe_frame(&"i1".into(), &"it1".into(), &"front".into(), 3, None);
        present.observe_frame(&"i1".into(), &"it1".into(), &"front".into(), 3, Some(frame(3, 3.0)));
        assert_eq!(present.frame_slots(), 1);
        let patch = present.instances[&InstanceId::from("i1")].as_ref().unwrap();
        let slots = &patch.items[&ItemId::from("it1")].as_ref().unwrap().cameras[&CameraId::from("front")];
        assert_eq!(slots[&3], None);
    }
}
