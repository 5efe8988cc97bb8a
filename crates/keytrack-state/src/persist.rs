//! Bulk load and save of persisted instance records
//!
//! Loading is lenient: records that reference unknown categories, item
//! names or cameras are dropped, malformed frames are skipped, and
//! duplicate instance numbers are reassigned. Nothing here fails except
//! JSON that does not parse at all.

use std::collections::{BTreeMap, BTreeSet};

use keytrack_core::{
    parse_instances, render_instances, CameraId, CategoryId, FrameIndex, FrameRecord, InstanceId, InstanceRecord,
    ItemRecord, KeytrackResult,
};
use tracing::{debug, warn};

use crate::{AnnotationInstance, AnnotationItem, InstanceRegistry};

/// What a load kept and what it dropped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub instances: usize,
    pub items: usize,
    pub frames: usize,
    pub skipped_instances: usize,
    pub skipped_items: usize,
    pub skipped_cameras: usize,
    pub skipped_frames: usize,
    pub skipped_dynamic: usize,
    /// Instances whose number collided and was reassigned
    pub renumbered: Vec<InstanceId>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_instances == 0
            && self.skipped_items == 0
            && self.skipped_cameras == 0
            && self.skipped_frames == 0
            && self.skipped_dynamic == 0
            && self.renumbered.is_empty()
    }
}

impl InstanceRegistry {
    /// Replace the whole tree with the given records
    pub fn load(&mut self, records: Vec<InstanceRecord>) -> LoadReport {
        self.clear();
        let mut report = LoadReport::default();

        let mut accepted: Vec<AnnotationInstance> = Vec::new();
        let mut seen: BTreeSet<InstanceId> = BTreeSet::new();
        for record in records {
            if !self.catalog().accepts_category(&record.category) {
                warn!(instance = %record.id, category = %record.category, "unknown category, instance dropped");
                report.skipped_instances += 1;
                continue;
            }
            if seen.contains(&record.id) {
                warn!(instance = %record.id, "duplicate instance id, record dropped");
                report.skipped_instances += 1;
                continue;
            }

            let id = record.id.clone();
            match self.build_instance(record, &mut report) {
                Some(instance) => {
                    seen.insert(id);
                    accepted.push(instance);
                }
                None => {
                    debug!(instance = %id, "instance has no frames left, dropped");
                    report.skipped_instances += 1;
                }
            }
        }

        self.assign_numbers(&mut accepted, &mut report);

        for instance in accepted {
            for item in instance.items() {
                for track in item.tracks() {
                    for frame in track.frames() {
                        if let Some(order) = frame.order {
                            self.orders().observe(track.camera(), frame.frame_index, order);
                        }
                    }
                }
            }
            report.instances += 1;
            self.instances.insert(instance.id().clone(), instance);
        }

        debug!(
            instances = report.instances,
            items = report.items,
            frames = report.frames,
            clean = report.is_clean(),
            "annotations loaded"
        );
        report
    }

    /// Parse and load a JSON array of instance records
    pub fn load_json(&mut self, json: &str) -> KeytrackResult<LoadReport> {
        let records = parse_instances(json)?;
        Ok(self.load(records))
    }

    /// Current tree as persisted records; empty branches are omitted
    pub fn to_records(&self) -> Vec<InstanceRecord> {
        self.instances
            .values()
            .filter(|instance| !instance.is_empty())
            .map(AnnotationInstance::to_record)
            .collect()
    }

    pub fn to_json(&self) -> KeytrackResult<String> {
        render_instances(&self.to_records())
    }

    fn build_instance(&self, record: InstanceRecord, report: &mut LoadReport) -> Option<AnnotationInstance> {
        let mut instance = AnnotationInstance::new(
            record.id,
            record.category,
            record.number,
            record.attributes.unwrap_or_default(),
        );

        for child in record.children {
            if !self.catalog().accepts_item(instance.category(), &child.name) {
                warn!(instance = %instance.id(), item = %child.id, name = %child.name, "unknown item name, item dropped");
                report.skipped_items += 1;
                continue;
            }
            if instance.item(&child.id).is_some() {
                warn!(instance = %instance.id(), item = %child.id, "duplicate item id, record dropped");
                report.skipped_items += 1;
                continue;
            }
            match self.build_item(instance.category(), child, report) {
                Some(item) => {
                    report.items += 1;
                    instance.insert_item(item);
                }
                None => report.skipped_items += 1,
            }
        }

        if instance.is_empty() {
            return None;
        }

        for dynamic in record.dynamic_attributes.unwrap_or_default() {
            if !self.catalog().accepts_camera(&dynamic.camera) {
                report.skipped_dynamic += dynamic.frames.len();
                continue;
            }
            for frame in dynamic.frames {
                if instance.has_frame_at(&dynamic.camera, frame.frame_index) && !frame.attributes.is_empty() {
                    instance.insert_dynamic(&dynamic.camera, frame.frame_index, frame.attributes);
                } else {
                    report.skipped_dynamic += 1;
                }
            }
        }

        Some(instance)
    }

    fn build_item(&self, category: &CategoryId, record: ItemRecord, report: &mut LoadReport) -> Option<AnnotationItem> {
        let mut item = AnnotationItem::new(record.id, record.name, record.number, self.config());

        for camera in record.cameras {
            if !self.catalog().accepts_camera(&camera.camera) {
                warn!(%category, item = %item.id(), camera = %camera.camera, "unknown camera, track dropped");
                report.skipped_cameras += 1;
                continue;
            }
            let camera_id: CameraId = camera.camera;
            let mut seen: BTreeSet<FrameIndex> = BTreeSet::new();
            for data in camera.frames {
                let index = data.frame_index;
                if !seen.insert(index) {
                    report.skipped_frames += 1;
                    continue;
                }
                match FrameRecord::try_from(data) {
                    Ok(frame) => {
                        report.frames += 1;
                        item.insert_frame(&camera_id, frame);
                    }
                    Err(error) => {
                        warn!(item = %item.id(), camera = %camera_id, frame = index, %error, "malformed frame skipped");
                        report.skipped_frames += 1;
                    }
                }
            }
        }

        (!item.is_empty()).then_some(item)
    }

    /// Keep the first holder of each number; give later duplicates fresh ones
    fn assign_numbers(&self, accepted: &mut [AnnotationInstance], report: &mut LoadReport) {
        let mut highest: BTreeMap<CategoryId, u32> = BTreeMap::new();
        for instance in accepted.iter() {
            let max = highest.entry(instance.category().clone()).or_insert(0);
            *max = (*max).max(instance.number());
        }

        let mut used: BTreeSet<(CategoryId, u32)> = BTreeSet::new();
        for instance in accepted.iter_mut() {
            let key = (instance.category().clone(), instance.number());
            if used.insert(key) {
                continue;
            }

            let max = highest.entry(instance.category().clone()).or_insert(0);
            *max += 1;
            let fresh = *max;
            warn!(instance = %instance.id(), from = instance.number(), to = fresh, "duplicate instance number reassigned");
            instance.set_number(fresh);
            used.insert((instance.category().clone(), fresh));
            report.renumbered.push(instance.id().clone());
        }
    }
}
