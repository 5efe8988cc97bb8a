//! Annotation session
//!
//! Every mutating method runs the registry operation, records a non-empty
//! delta in the change log, then notifies subscribers. A failed operation
//! records nothing and notifies no one.

use std::collections::BTreeSet;

use keytrack_core::{
    Attributes, Bounds, CameraId, CategoryId, Delta, FrameIndex, InstanceId, InstanceRecord, ItemId,
    KeytrackResult, ShapeGeometry, ShapeOrders, ShapeType, Snapshot,
};
use keytrack_history::{ChangeLog, PreserveToken};
use keytrack_state::{
    settle_interaction, Catalog, Created, InstanceRegistry, KeyframeOptions, LoadReport, Selection,
};
use keytrack_track::Suggestion;
use tracing::{debug, trace};

use crate::{ChangeKind, ChangeNotice, InteractionGuard, SessionConfig, Subscribers, SubscriptionId};

/// Instance registry together with its undo history and subscribers
#[derive(Debug)]
pub struct Session {
    registry: InstanceRegistry,
    history: ChangeLog<Snapshot>,
    config: SessionConfig,
    guard: InteractionGuard,
    subscribers: Subscribers,
}

impl Default for Session {
    fn default() -> Self {
        Session::new(Catalog::new(), SessionConfig::default())
    }
}

impl Session {
    pub fn new(catalog: Catalog, config: SessionConfig) -> Self {
        Session::with_registry(InstanceRegistry::new(catalog), config)
    }

    /// Share a shape-order counter with the frame-sequence coordinator
    pub fn with_orders(catalog: Catalog, orders: ShapeOrders, config: SessionConfig) -> Self {
        Session::with_registry(InstanceRegistry::new(catalog).with_orders(orders), config)
    }

    fn with_registry(registry: InstanceRegistry, config: SessionConfig) -> Self {
        Session {
            registry: registry.with_config(config.interpolation),
            history: ChangeLog::new(config.history),
            config,
            guard: InteractionGuard::default(),
            subscribers: Subscribers::new(),
        }
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Direct registry access for interactions bracketed by
    /// [`begin_interaction`](Self::begin_interaction) and
    /// [`finish_interaction`](Self::finish_interaction)
    ///
    /// Changes made here are recorded only through the bracketing calls.
    pub fn registry_mut(&mut self) -> &mut InstanceRegistry {
        &mut self.registry
    }

    pub fn history(&self) -> &ChangeLog<Snapshot> {
        &self.history
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn guard(&self) -> InteractionGuard {
        self.guard
    }

    pub fn set_modal_open(&mut self, open: bool) {
        self.guard.modal_open = open;
    }

    pub fn set_drawing(&mut self, drawing: bool) {
        self.guard.drawing = drawing;
    }

    pub fn can_undo(&self) -> bool {
        !self.guard.is_busy() && self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        !self.guard.is_busy() && self.history.can_redo()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ChangeNotice) + Send + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // Queries

    pub fn predict(
        &self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        shape_type: ShapeType,
        bounds: Option<Bounds>,
    ) -> KeytrackResult<Option<Suggestion>> {
        self.registry.predict(id, item, camera, frame, shape_type, bounds)
    }

    pub fn selection(&self) -> &Selection {
        self.registry.selection()
    }

    // Recorded edits

    pub fn create_instance(
        &mut self,
        category: CategoryId,
        item_name: &str,
        camera: &CameraId,
        frame: FrameIndex,
        geometry: ShapeGeometry,
        attributes: Attributes,
    ) -> KeytrackResult<Created> {
        let created = self
            .registry
            .create_instance(category, item_name, camera, frame, geometry, attributes)?;
        self.record(created.delta.clone());
        Ok(created)
    }

    pub fn add_item(
        &mut self,
        id: &InstanceId,
        item_name: &str,
        camera: &CameraId,
        frame: FrameIndex,
        geometry: ShapeGeometry,
    ) -> KeytrackResult<Created> {
        let created = self.registry.add_item(id, item_name, camera, frame, geometry)?;
        self.record(created.delta.clone());
        Ok(created)
    }

    /// Options applied by [`edit_keyframe`](Self::edit_keyframe)
    pub fn edit_options(&self) -> KeyframeOptions {
        KeyframeOptions {
            interpolate: self.config.interpolate_on_edit,
            ..Default::default()
        }
    }

    /// Upsert a keyframe, re-interpolating per the session config
    pub fn edit_keyframe(
        &mut self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        geometry: ShapeGeometry,
    ) -> KeytrackResult<bool> {
        let options = self.edit_options();
        self.set_keyframe(id, item, camera, frame, geometry, options)
    }

    pub fn set_keyframe(
        &mut self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        geometry: ShapeGeometry,
        options: KeyframeOptions,
    ) -> KeytrackResult<bool> {
        let delta = self.registry.set_keyframe(id, item, camera, frame, geometry, options)?;
        Ok(self.record(delta))
    }

    pub fn interpolate(
        &mut self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        insert_missing: bool,
    ) -> KeytrackResult<bool> {
        let delta = self.registry.interpolate(id, item, camera, frame, insert_missing)?;
        Ok(self.record(delta))
    }

    pub fn set_instance_attributes(&mut self, id: &InstanceId, attributes: Attributes) -> KeytrackResult<bool> {
        let delta = self.registry.set_instance_attributes(id, attributes)?;
        Ok(self.record(delta))
    }

    pub fn set_dynamic_attributes(
        &mut self,
        id: &InstanceId,
        camera: &CameraId,
        frame: FrameIndex,
        attributes: Attributes,
    ) -> KeytrackResult<bool> {
        let delta = self.registry.set_dynamic_attributes(id, camera, frame, attributes)?;
        Ok(self.record(delta))
    }

    pub fn set_frame_attributes(
        &mut self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frame: FrameIndex,
        attributes: Attributes,
    ) -> KeytrackResult<bool> {
        let delta = self.registry.set_frame_attributes(id, item, camera, frame, attributes)?;
        Ok(self.record(delta))
    }

    pub fn renumber_instance(&mut self, id: &InstanceId, number: u32) -> KeytrackResult<bool> {
        let delta = self.registry.renumber_instance(id, number)?;
        Ok(self.record(delta))
    }

    pub fn remove_frames(
        &mut self,
        id: &InstanceId,
        item: &ItemId,
        camera: &CameraId,
        frames: &[FrameIndex],
    ) -> KeytrackResult<bool> {
        let delta = self.registry.remove_frames(id, item, camera, frames)?;
        Ok(self.record(delta))
    }

    pub fn remove_camera(&mut self, id: &InstanceId, item: &ItemId, camera: &CameraId) -> KeytrackResult<bool> {
        let delta = self.registry.remove_camera(id, item, camera)?;
        Ok(self.record(delta))
    }

    pub fn remove_item(&mut self, id: &InstanceId, item: &ItemId) -> KeytrackResult<bool> {
        let delta = self.registry.remove_item(id, item)?;
        Ok(self.record(delta))
    }

    pub fn remove_instance(&mut self, id: &InstanceId) -> KeytrackResult<bool> {
        let delta = self.registry.remove_instance(id)?;
        Ok(self.record(delta))
    }

    /// Selection changes are not recorded in the history
    pub fn select(&mut self, selection: Selection) -> KeytrackResult<()> {
        if &selection == self.registry.selection() {
            return Ok(());
        }
        self.registry.select(selection)?;
        let instances = self.registry.selection().instance.clone();
        self.notify(ChangeKind::Selection, instances);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        let Some(previous) = self.registry.selection().instance.clone() else {
            return;
        };
        self.registry.clear_selection();
        self.notify(ChangeKind::Selection, [previous]);
    }

    // History

    /// Revert the most recent change; a no-op while the guard is busy
    pub fn undo(&mut self) -> bool {
        if self.guard.is_busy() {
            trace!(guard = ?self.guard, "undo suppressed");
            return false;
        }
        let Some(entry) = self.history.peek_undo() else {
            return false;
        };
        let instances = affected(&entry.before, &entry.after);
        if !self.history.undo(&mut self.registry) {
            return false;
        }
        self.notify(ChangeKind::Undo, instances);
        true
    }

    /// Reapply the most recently undone change; a no-op while the guard is busy
    pub fn redo(&mut self) -> bool {
        if self.guard.is_busy() {
            trace!(guard = ?self.guard, "redo suppressed");
            return false;
        }
        let Some(entry) = self.history.peek_redo() else {
            return false;
        };
        let instances = affected(&entry.before, &entry.after);
        if !self.history.redo(&mut self.registry) {
            return false;
        }
        self.notify(ChangeKind::Redo, instances);
        true
    }

    /// Snapshot the named instances before an interaction that resolves later
    ///
    /// A second call supersedes the first; its token goes stale.
    pub fn begin_interaction(&mut self, instances: &[InstanceId]) -> PreserveToken {
        let before = self.registry.snapshot_instances(instances);
        let token = self.history.preserve(before);
        trace!(%token, instances = instances.len(), "interaction started");
        token
    }

    /// Record the interaction started under `token`
    ///
    /// `touched` names instances the interaction created or changed beyond
    /// those passed to `begin_interaction`. Returns false for a stale token
    /// or an interaction that changed nothing.
    pub fn finish_interaction(&mut self, token: PreserveToken, touched: &[InstanceId]) -> bool {
        let registry = &self.registry;
        let mut instances = BTreeSet::new();
        let recorded = self.history.save_with(token, |before| {
            let delta = settle_interaction(registry, before, touched);
            if delta.is_empty() {
                return None;
            }
            instances = delta.touched_instances();
            Some((delta.before, delta.after))
        });

        if recorded {
            self.notify(ChangeKind::Edit, instances);
        }
        recorded
    }

    pub fn abandon_interaction(&mut self) {
        self.history.abandon();
    }

    // Bulk load and save

    /// Replace every instance; the history starts over
    pub fn load(&mut self, records: Vec<InstanceRecord>) -> LoadReport {
        let previous: Vec<InstanceId> = self.registry.instances().map(|i| i.id().clone()).collect();
        let report = self.registry.load(records);
        self.history.clear();

        let instances: BTreeSet<InstanceId> = previous
            .into_iter()
            .chain(self.registry.instances().map(|i| i.id().clone()))
            .collect();
        debug!(instances = report.instances, clean = report.is_clean(), "session loaded");
        self.notify(ChangeKind::Load, instances);
        report
    }

    pub fn load_json(&mut self, json: &str) -> KeytrackResult<LoadReport> {
        let records = keytrack_core::parse_instances(json)?;
        Ok(self.load(records))
    }

    pub fn to_records(&self) -> Vec<InstanceRecord> {
        self.registry.to_records()
    }

    pub fn to_json(&self) -> KeytrackResult<String> {
        self.registry.to_json()
    }

    /// Push a non-empty delta and notify; returns whether anything changed
    fn record(&mut self, delta: Delta) -> bool {
        if delta.is_empty() {
            trace!("no-op change not recorded");
            return false;
        }
        let instances = delta.touched_instances();
        self.history.push(delta.before, delta.after);
        self.notify(ChangeKind::Edit, instances);
        true
    }

    fn notify(&mut self, kind: ChangeKind, instances: impl IntoIterator<Item = InstanceId>) {
        self.subscribers.notify(&ChangeNotice::new(kind, instances));
    }
}

fn affected(before: &Snapshot, after: &Snapshot) -> BTreeSet<InstanceId> {
    before.instance_ids().chain(after.instance_ids()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keytrack_core::{KeytrackError, Rect};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn rect(x: f64) -> ShapeGeometry {
        ShapeGeometry::Rectangle(Rect::new(x, 0.0, 10.0, 10.0))
    }

    fn front() -> CameraId {
        CameraId::from("front")
    }

    fn x_at(session: &Session, created: &Created, frame: FrameIndex) -> Option<f64> {
        let item = session.registry().item(&created.instance, &created.item).ok()?;
        match &item.frame(&front(), frame)?.geometry {
            ShapeGeometry::Rectangle(rect) => Some(rect.x),
            _ => None,
        }
    }

    fn recorder(session: &mut Session) -> Arc<Mutex<Vec<ChangeNotice>>> {
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        session.subscribe(move |notice| sink.lock().push(notice.clone()));
        notices
    }

    fn create(session: &mut Session) -> Created {
        session
            .create_instance("car".into(), "body", &front(), 0, rect(0.0), Attributes::new())
            .unwrap()
    }

    #[test]
    fn test_edits_are_recorded_and_notified() {
        let mut session = Session::default();
        let notices = recorder(&mut session);

        let created = create(&mut session);
        assert_eq!(session.history().len(), 1);

        let mut attributes = Attributes::new();
        attributes.insert("color".into(), json!("red"));
        assert!(session.set_instance_attributes(&created.instance, attributes.clone()).unwrap());
        assert!(!session.set_instance_attributes(&created.instance, attributes).unwrap());
        assert_eq!(session.history().len(), 2);

        let notices = notices.lock();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.kind == ChangeKind::Edit));
        assert!(notices[0].touches(&created.instance));
    }

    #[test]
    fn test_failed_edit_records_nothing() {
        let mut session = Session::default();
        let notices = recorder(&mut session);
        create(&mut session);

        let result = session.remove_instance(&"missing".into());
        assert!(matches!(result, Err(KeytrackError::UnknownInstance(_))));
        assert_eq!(session.history().len(), 1);
        assert_eq!(notices.lock().len(), 1);
    }

    #[test]
    fn test_undo_redo_notify() {
        let mut session = Session::default();
        let created = create(&mut session);
        let notices = recorder(&mut session);

        assert!(session.remove_instance(&created.instance).unwrap());
        assert!(session.registry().is_empty());

        assert!(session.undo());
        assert!(session.registry().contains(&created.instance));
        assert!(session.redo());
        assert!(session.registry().is_empty());
        assert!(!session.redo());

        let kinds: Vec<ChangeKind> = notices.lock().iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Edit, ChangeKind::Undo, ChangeKind::Redo]);
        assert!(notices.lock()[1].touches(&created.instance));
    }

    #[test]
    fn test_guard_suppresses_undo_and_redo() {
        let mut session = Session::default();
        create(&mut session);

        session.set_drawing(true);
        assert!(!session.can_undo());
        assert!(!session.undo());
        assert_eq!(session.registry().len(), 1);

        session.set_drawing(false);
        session.set_modal_open(true);
        assert!(!session.undo());

        session.set_modal_open(false);
        assert!(session.undo());
        assert!(session.registry().is_empty());

        session.set_modal_open(true);
        assert!(!session.redo());
        assert!(session.history().can_redo());
    }

    #[test]
    fn test_edit_keyframe_follows_config() {
        let mut session = Session::default();
        let created = create(&mut session);
        session
            .set_keyframe(
                &created.instance,
                &created.item,
                &front(),
                4,
                rect(40.0),
                KeyframeOptions::interpolated(true),
            )
            .unwrap();
        assert_eq!(x_at(&session, &created, 3), Some(30.0));

        assert!(session
            .edit_keyframe(&created.instance, &created.item, &front(), 2, rect(100.0))
            .unwrap());
        assert_eq!(x_at(&session, &created, 1), Some(50.0));
        assert_eq!(x_at(&session, &created, 3), Some(70.0));

        let mut still = Session::new(
            Catalog::new(),
            SessionConfig {
                interpolate_on_edit: false,
                ..Default::default()
            },
        );
        let created = create(&mut still);
        still
            .set_keyframe(&created.instance, &created.item, &front(), 4, rect(40.0), KeyframeOptions::interpolated(true))
            .unwrap();
        still
            .edit_keyframe(&created.instance, &created.item, &front(), 2, rect(100.0))
            .unwrap();
        assert_eq!(x_at(&still, &created, 1), Some(10.0));
    }

    #[test]
    fn test_load_resets_history() {
        let mut session = Session::default();
        let created = create(&mut session);
        let json = session.to_json().unwrap();
        session.remove_instance(&created.instance).unwrap();
        let notices = recorder(&mut session);

        let report = session.load_json(&json).unwrap();
        assert_eq!(report.instances, 1);
        assert!(report.is_clean());
        assert!(session.history().is_empty());
        assert!(!session.undo());

        let notices = notices.lock();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, ChangeKind::Load);
        assert_eq!(notices[0].instances, vec![created.instance.clone()]);
    }

    #[test]
    fn test_interaction_records_one_entry() {
        let mut session = Session::default();
        let created = create(&mut session);
        let before = session.to_records();

        let token = session.begin_interaction(&[created.instance.clone()]);
        session
            .registry_mut()
            .set_keyframe(&created.instance, &created.item, &front(), 0, rect(25.0), KeyframeOptions::default())
            .unwrap();
        session
            .registry_mut()
            .set_keyframe(&created.instance, &created.item, &front(), 3, rect(50.0), KeyframeOptions::default())
            .unwrap();
        assert!(session.finish_interaction(token, &[]));
        assert_eq!(session.history().len(), 2);

        assert!(session.undo());
        assert_eq!(session.to_records(), before);
        assert!(session.redo());
        assert_eq!(x_at(&session, &created, 3), Some(50.0));
    }

    #[test]
    fn test_interaction_creating_instance() {
        let mut session = Session::default();
        let token = session.begin_interaction(&[]);
        let created = session
            .registry_mut()
            .create_instance("car".into(), "body", &front(), 0, rect(0.0), Attributes::new())
            .unwrap();
        assert!(session.finish_interaction(token, &[created.instance.clone()]));

        assert!(session.undo());
        assert!(session.registry().is_empty());
        assert!(session.redo());
        assert_eq!(x_at(&session, &created, 0), Some(0.0));
    }

    #[test]
    fn test_stale_and_empty_interactions() {
        let mut session = Session::default();
        let created = create(&mut session);
        let ids = [created.instance.clone()];

        let stale = session.begin_interaction(&ids);
        let current = session.begin_interaction(&ids);
        session
            .registry_mut()
            .set_keyframe(&created.instance, &created.item, &front(), 0, rect(5.0), KeyframeOptions::default())
            .unwrap();
        assert!(!session.finish_interaction(stale, &[]));
        assert!(session.finish_interaction(current, &[]));
        assert!(!session.finish_interaction(current, &[]));
        assert_eq!(session.history().len(), 2);

        let token = session.begin_interaction(&ids);
        assert!(!session.finish_interaction(token, &[]));
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_selection_notifies_without_recording() {
        let mut session = Session::default();
        let created = create(&mut session);
        let notices = recorder(&mut session);

        session.select(Selection::instance(created.instance.clone())).unwrap();
        session.select(Selection::instance(created.instance.clone())).unwrap();
        session.clear_selection();
        session.clear_selection();
        assert!(session.select(Selection::instance("missing".into())).is_err());

        assert_eq!(session.history().len(), 1);
        let notices = notices.lock();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.kind == ChangeKind::Selection));
    }
}
