//! Snapshot replay
//!
//! Applying a snapshot brings every path it names to the recorded value,
//! in three passes:
//!
//! 1. delete everything the snapshot marks absent
//! 2. create or update everything it marks present
//! 3. settle emptied containers and repair the selection
//!
//! Deleting first means an entity recreated by the second pass never
//! meets a stale copy of itself.

use keytrack_core::{InstanceId, InstancePatch, ItemId, ItemPatch, Snapshot};
use keytrack_history::Replay;
use keytrack_track::InterpolationConfig;
use tracing::{debug, trace};

use crate::{AnnotationInstance, AnnotationItem, ChangeSet, InstanceRegistry};

impl InstanceRegistry {
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.apply_deletions(snapshot);
        self.apply_updates(snapshot);

        let mut settled = ChangeSet::new();
        for id in snapshot.instance_ids() {
            settled.touch_instance(self, id);
        }
        self.settle(&mut settled);

        debug!(instances = snapshot.instances.len(), frames = snapshot.frame_slots(), "snapshot applied");
    }

    fn apply_deletions(&mut self, snapshot: &Snapshot) {
        for (id, patch) in &snapshot.instances {
            let Some(patch) = patch else {
                if self.instances.remove(id).is_some() {
                    trace!(instance = %id, "instance removed by replay");
                }
                continue;
            };
            let Some(instance) = self.instances.get_mut(id) else {
                continue;
            };

            for (camera, slots) in &patch.dynamic {
                for (frame, value) in slots {
                    if value.is_none() {
                        instance.remove_dynamic(camera, *frame);
                    }
                }
            }

            for (item_id, item_patch) in &patch.items {
                let Some(item_patch) = item_patch else {
                    instance.remove_item(item_id);
                    continue;
                };
                let Some(item) = instance.item_mut(item_id) else {
                    continue;
                };
                for (camera, slots) in &item_patch.cameras {
                    for (frame, value) in slots {
                        if value.is_none() {
                            item.remove_frame(camera, *frame);
                        }
                    }
                }
            }
        }
    }

    fn apply_updates(&mut self, snapshot: &Snapshot) {
        let config = self.config();
        let orders = self.orders().clone();

        for (id, patch) in &snapshot.instances {
            let Some(patch) = patch else { continue };
            let instance = self
                .instances
                .entry(id.clone())
                .or_insert_with(|| restore_instance(id, patch));
            instance.set_number(patch.number);
            instance.set_attributes(patch.attributes.clone());

            for (item_id, item_patch) in &patch.items {
                let Some(item_patch) = item_patch else { continue };
                if instance.item(item_id).is_none() {
                    instance.insert_item(restore_item(item_id, item_patch, config));
                }
                let Some(item) = instance.item_mut(item_id) else {
                    continue;
                };
                item.set_number(item_patch.number);

                for (camera, slots) in &item_patch.cameras {
                    for record in slots.values().flatten() {
                        if let Some(order) = record.order {
                            orders.observe(camera, record.frame_index, order);
                        }
                        item.insert_frame(camera, record.clone());
                    }
                }
            }

            for (camera, slots) in &patch.dynamic {
                for (frame, value) in slots {
                    if let Some(attributes) = value {
                        instance.insert_dynamic(camera, *frame, attributes.clone());
                    }
                }
            }
        }
    }
}

fn restore_instance(id: &InstanceId, patch: &InstancePatch) -> AnnotationInstance {
    trace!(instance = %id, "instance restored by replay");
    AnnotationInstance::new(id.clone(), patch.category.clone(), patch.number, patch.attributes.clone())
}

fn restore_item(id: &ItemId, patch: &ItemPatch, config: InterpolationConfig) -> AnnotationItem {
    AnnotationItem::new(id.clone(), patch.name.clone(), patch.number, config)
}

impl Replay<Snapshot> for InstanceRegistry {
    fn replay(&mut self, snapshot: &Snapshot) {
        self.apply_snapshot(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use crate::{Catalog, InstanceRegistry, KeyframeOptions};
    use keytrack_core::{Attributes, CameraId, Delta, InstanceId, ItemId, Rect, ShapeGeometry};
    use keytrack_history::{ChangeLog, ChangeLogConfig};
    use proptest::prelude::*;
    use serde_json::json;

    fn rect(x: f64) -> ShapeGeometry {
        ShapeGeometry::Rectangle(Rect::new(x, 0.0, 10.0, 10.0))
    }

    fn front() -> CameraId {
        CameraId::from("front")
    }

    #[test]
    fn test_undo_redo_restores_cascaded_instance() {
        let mut registry = InstanceRegistry::new(Catalog::new());
        let mut log = ChangeLog::new(ChangeLogConfig::default());

        let created = registry
            .create_instance("car".into(), "body", &front(), 0, rect(0.0), Attributes::new())
            .unwrap();
        log.push(created.delta.before, created.delta.after);

        let delta = registry
            .set_keyframe(&created.instance, &created.item, &front(), 4, rect(40.0), KeyframeOptions::interpolated(true))
            .unwrap();
        log.push(delta.before, delta.after);
        let populated = registry.to_records();

        let mut attributes = Attributes::new();
        attributes.insert("moving".into(), json!(true));
        let delta = registry
            .set_dynamic_attributes(&created.instance, &front(), 2, attributes)
            .unwrap();
        log.push(delta.before, delta.after);
        let annotated = registry.to_records();

        let delta = registry.remove_instance(&created.instance).unwrap();
        log.push(delta.before, delta.after);
        assert!(registry.is_empty());

        assert!(log.undo(&mut registry));
        assert_eq!(registry.to_records(), annotated);

        assert!(log.undo(&mut registry));
        assert_eq!(registry.to_records(), populated);

        assert!(log.undo(&mut registry));
        assert!(log.undo(&mut registry));
        assert!(registry.is_empty());

        while log.redo(&mut registry) {}
        assert!(registry.is_empty());

        log.undo(&mut registry);
        assert_eq!(registry.to_records(), annotated);
    }

    #[test]
    fn test_undo_removed_frame_restores_neighbours() {
        let mut registry = InstanceRegistry::default();
        let created = registry
            .create_instance("car".into(), "body", &front(), 0, rect(0.0), Attributes::new())
            .unwrap();
        registry
            .set_keyframe(&created.instance, &created.item, &front(), 4, rect(40.0), KeyframeOptions::interpolated(true))
            .unwrap();
        let before = registry.to_records();

        let delta = registry
            .remove_frames(&created.instance, &created.item, &front(), &[2])
            .unwrap();
        let item = registry.item(&created.instance, &created.item).unwrap();
        assert!(item.frame(&front(), 1).unwrap().is_key_frame);
        assert!(item.frame(&front(), 3).unwrap().is_key_frame);

        registry.apply_snapshot(&delta.before);
        assert_eq!(registry.to_records(), before);

        registry.apply_snapshot(&delta.after);
        assert!(!registry.item(&created.instance, &created.item).unwrap().has_frame(&front(), 2));
    }

    #[test]
    fn test_replay_repairs_selection() {
        let mut registry = InstanceRegistry::default();
        let created = registry
            .create_instance("car".into(), "body", &front(), 0, rect(0.0), Attributes::new())
            .unwrap();
        assert!(!registry.selection().is_empty());

        registry.apply_snapshot(&created.delta.before);
        assert!(registry.is_empty());
        assert!(registry.selection().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Edit {
        Key(u32, f64),
        Remove(u32),
        Flag(u32, bool),
    }

    fn edit() -> impl Strategy<Value = Edit> {
        prop_oneof![
            3 => (0u32..12, 0u32..10).prop_map(|(frame, step)| Edit::Key(frame, f64::from(step) * 10.0)),
            1 => (0u32..12).prop_map(Edit::Remove),
            1 => (0u32..12, any::<bool>()).prop_map(|(frame, flag)| Edit::Flag(frame, flag)),
        ]
    }

    /// Apply one edit to the tracked instance, recreating it once it is gone
    fn apply(registry: &mut InstanceRegistry, target: &mut Option<(InstanceId, ItemId)>, edit: &Edit) -> Option<Delta> {
        let live = target.clone().filter(|(id, _)| registry.contains(id));
        match (edit, live) {
            (Edit::Key(frame, x), None) => {
                let created = registry
                    .create_instance("car".into(), "body", &front(), *frame, rect(*x), Attributes::new())
                    .ok()?;
                *target = Some((created.instance, created.item));
                Some(created.delta)
            }
            (Edit::Key(frame, x), Some((id, item))) => registry
                .set_keyframe(&id, &item, &front(), *frame, rect(*x), KeyframeOptions::interpolated(true))
                .ok(),
            (Edit::Remove(frame), Some((id, item))) => registry.remove_frames(&id, &item, &front(), &[*frame]).ok(),
            (Edit::Flag(frame, flag), Some((id, _))) => {
                let mut attributes = Attributes::new();
                attributes.insert("moving".into(), json!(flag));
                registry.set_dynamic_attributes(&id, &front(), *frame, attributes).ok()
            }
            (_, None) => None,
        }
    }

    proptest! {
        #[test]
        fn prop_undo_redo_replays_every_state(edits in proptest::collection::vec(edit(), 1..40)) {
            let mut registry = InstanceRegistry::new(Catalog::new());
            let mut log = ChangeLog::new(ChangeLogConfig::unbounded());
            let mut target = None;
            let mut states = vec![registry.to_records()];

            for edit in &edits {
                if let Some(delta) = apply(&mut registry, &mut target, edit) {
                    if !delta.is_empty() {
                        log.push(delta.before, delta.after);
                        states.push(registry.to_records());
                    }
                }
            }
            prop_assert_eq!(log.len(), states.len() - 1);

            for expected in states.iter().rev().skip(1) {
                prop_assert!(log.undo(&mut registry));
                prop_assert_eq!(&registry.to_records(), expected);
            }
            prop_assert!(registry.is_empty());

            for expected in states.iter().skip(1) {
                prop_assert!(log.redo(&mut registry));
                prop_assert_eq!(&registry.to_records(), expected);
            }
        }
    }
}
