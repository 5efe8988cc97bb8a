//! Scenario Fuzzer - Random editing sessions with history checks
//!
//! Drives a [`Session`] through seeded random edits, undos and redos.
//! After every step the registry is checked for structural invariants, and
//! every undo or redo must land exactly on the state recorded when that
//! point of the history was first reached. The run ends by undoing to the
//! very beginning and redoing to the end.

use std::collections::BTreeMap;

use keytrack_core::{
    Attributes, CameraId, CategoryId, FrameIndex, InstanceId, InstanceRecord, ItemId, KeytrackResult,
    ShapeGeometry, Vertex,
};
use keytrack_runtime::{Session, SessionConfig};
use keytrack_state::{InstanceRegistry, KeyframeOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{debug, trace};

use crate::{rect, sample_catalog, CAMERAS};

/// Fuzzer configuration
#[derive(Clone, Debug)]
pub struct FuzzerConfig {
    /// Number of steps to run
    pub operation_count: usize,
    /// Highest frame index an edit may target
    pub max_frame: FrameIndex,
    /// Probability that a step is an undo or redo instead of an edit
    pub history_prob: f64,
    /// Probability that a new keyframe is a polygon instead of a rectangle
    pub polygon_prob: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        FuzzerConfig {
            operation_count: 500,
            max_frame: 60,
            history_prob: 0.15,
            polygon_prob: 0.2,
            seed: 42,
        }
    }
}

impl FuzzerConfig {
    /// Light fuzzing for quick tests
    pub fn light() -> Self {
        FuzzerConfig {
            operation_count: 150,
            max_frame: 24,
            history_prob: 0.1,
            polygon_prob: 0.1,
            seed: 42,
        }
    }

    /// Heavy fuzzing for thorough testing
    pub fn heavy() -> Self {
        FuzzerConfig {
            operation_count: 3000,
            max_frame: 200,
            history_prob: 0.25,
            polygon_prob: 0.3,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Kinds of step the fuzzer takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    CreateInstance,
    AddItem,
    SetKeyframe,
    Interpolate,
    RemoveFrames,
    RemoveCamera,
    RemoveItem,
    RemoveInstance,
    SetDynamicAttributes,
    SetFrameAttributes,
    SetInstanceAttributes,
    Undo,
    Redo,
}

impl Operation {
    const EDITS: [(Operation, u32); 11] = [
        (Operation::CreateInstance, 10),
        (Operation::AddItem, 6),
        (Operation::SetKeyframe, 28),
        (Operation::Interpolate, 10),
        (Operation::RemoveFrames, 10),
        (Operation::RemoveCamera, 3),
        (Operation::RemoveItem, 3),
        (Operation::RemoveInstance, 3),
        (Operation::SetDynamicAttributes, 12),
        (Operation::SetFrameAttributes, 8),
        (Operation::SetInstanceAttributes, 7),
    ];

    fn pick_edit(rng: &mut StdRng) -> Operation {
        let total: u32 = Self::EDITS.iter().map(|(_, weight)| weight).sum();
        let mut roll = rng.gen_range(0..total);
        for (operation, weight) in Self::EDITS {
            if roll < weight {
                return operation;
            }
            roll -= weight;
        }
        Operation::SetKeyframe
    }
}

/// Fuzzing result
#[derive(Debug, Clone, Default)]
pub struct FuzzResult {
    /// Steps attempted, by kind
    pub operations: BTreeMap<Operation, usize>,
    /// Edits that produced a history entry
    pub recorded: usize,
    /// Edits that succeeded without changing anything
    pub no_ops: usize,
    /// Edits the registry refused with an error
    pub rejected: usize,
    /// Steps that found nothing to act on
    pub skipped: usize,
    pub undos: usize,
    pub redos: usize,
    pub structure_violations: Vec<String>,
    pub replay_mismatches: Vec<String>,
}

impl FuzzResult {
    pub fn is_valid(&self) -> bool {
        self.structure_violations.is_empty() && self.replay_mismatches.is_empty()
    }

    pub fn total_operations(&self) -> usize {
        self.operations.values().sum()
    }
}

/// Random editing session over the sample catalog
pub struct ScenarioFuzzer {
    config: FuzzerConfig,
    session: Session,
    rng: StdRng,
    /// Registry state at every history position reached so far
    timeline: Vec<Vec<InstanceRecord>>,
    cursor: usize,
    result: FuzzResult,
}

impl ScenarioFuzzer {
    pub fn new(config: FuzzerConfig) -> Self {
        let session = Session::new(sample_catalog(), SessionConfig::unbounded());
        let rng = StdRng::seed_from_u64(config.seed);
        ScenarioFuzzer {
            timeline: vec![session.to_records()],
            config,
            session,
            rng,
            cursor: 0,
            result: FuzzResult::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run every step, then undo to the start and redo to the end
    pub fn run(&mut self) -> FuzzResult {
        for step in 0..self.config.operation_count {
            self.step();
            self.check_structure(step);
        }
        self.round_trip();

        debug!(
            steps = self.result.total_operations(),
            recorded = self.result.recorded,
            rejected = self.result.rejected,
            valid = self.result.is_valid(),
            "fuzz run finished"
        );
        self.result.clone()
    }

    fn step(&mut self) {
        let operation = if self.session.registry().is_empty() {
            Operation::CreateInstance
        } else if self.rng.gen::<f64>() < self.config.history_prob {
            if self.rng.gen_bool(0.5) {
                Operation::Undo
            } else {
                Operation::Redo
            }
        } else {
            Operation::pick_edit(&mut self.rng)
        };
        *self.result.operations.entry(operation).or_default() += 1;
        trace!(?operation, cursor = self.cursor, "fuzz step");

        match operation {
            Operation::Undo => {
                if self.session.undo() {
                    self.result.undos += 1;
                    self.cursor -= 1;
                    self.verify("undo");
                }
            }
            Operation::Redo => {
                if self.session.redo() {
                    self.result.redos += 1;
                    self.cursor += 1;
                    self.verify("redo");
                }
            }
            edit => {
                let outcome = self.edit(edit);
                self.settle(edit, outcome);
            }
        }
    }

    /// Run one edit; `None` when there was nothing to act on
    fn edit(&mut self, operation: Operation) -> Option<KeytrackResult<bool>> {
        match operation {
            Operation::CreateInstance => {
                let category = if self.rng.gen_bool(0.6) { "car" } else { "person" };
                let name = self.item_name(category);
                let camera = self.camera();
                let frame = self.frame();
                let geometry = self.geometry();
                let created = self.session.create_instance(
                    CategoryId::from(category),
                    name,
                    &camera,
                    frame,
                    geometry,
                    Attributes::new(),
                );
                Some(created.map(|_| true))
            }
            Operation::AddItem => {
                let id = self.pick_instance()?;
                let category = self.session.registry().instance(&id)?.category().clone();
                let name = self.item_name(category.as_str());
                let camera = self.camera();
                let frame = self.frame();
                let geometry = self.geometry();
                let created = self.session.add_item(&id, name, &camera, frame, geometry);
                Some(created.map(|_| true))
            }
            Operation::SetKeyframe => {
                let (id, item) = self.pick_item()?;
                let camera = self.camera();
                let frame = self.frame();
                let geometry = self.geometry();
                let options = KeyframeOptions {
                    interpolate: self.rng.gen_bool(0.7),
                    insert_missing: self.rng.gen_bool(0.5),
                    ..Default::default()
                };
                Some(self.session.set_keyframe(&id, &item, &camera, frame, geometry, options))
            }
            Operation::Interpolate => {
                let (id, item, camera, frame) = self.pick_frame(true)?;
                let insert_missing = self.rng.gen_bool(0.5);
                Some(self.session.interpolate(&id, &item, &camera, frame, insert_missing))
            }
            Operation::RemoveFrames => {
                let (id, item, camera, frame) = self.pick_frame(false)?;
                let frames = if self.rng.gen_bool(0.3) {
                    vec![frame, frame + 1]
                } else {
                    vec![frame]
                };
                Some(self.session.remove_frames(&id, &item, &camera, &frames))
            }
            Operation::RemoveCamera => {
                let (id, item, camera, _) = self.pick_frame(false)?;
                Some(self.session.remove_camera(&id, &item, &camera))
            }
            Operation::RemoveItem => {
                let (id, item) = self.pick_item()?;
                Some(self.session.remove_item(&id, &item))
            }
            Operation::RemoveInstance => {
                let id = self.pick_instance()?;
                Some(self.session.remove_instance(&id))
            }
            Operation::SetDynamicAttributes => {
                let (id, _, camera, frame) = self.pick_frame(false)?;
                let attributes = if self.rng.gen_bool(0.2) {
                    Attributes::new()
                } else {
                    Attributes::from([("moving".to_string(), json!(self.rng.gen_bool(0.5)))])
                };
                Some(self.session.set_dynamic_attributes(&id, &camera, frame, attributes))
            }
            Operation::SetFrameAttributes => {
                let (id, item, camera, frame) = self.pick_frame(false)?;
                let attributes = Attributes::from([("occluded".to_string(), json!(self.rng.gen_bool(0.5)))]);
                Some(self.session.set_frame_attributes(&id, &item, &camera, frame, attributes))
            }
            Operation::SetInstanceAttributes => {
                let id = self.pick_instance()?;
                let color = ["red", "blue", "white"][self.rng.gen_range(0..3)];
                let attributes = Attributes::from([("color".to_string(), json!(color))]);
                Some(self.session.set_instance_attributes(&id, attributes))
            }
            Operation::Undo | Operation::Redo => None,
        }
    }

    fn settle(&mut self, operation: Operation, outcome: Option<KeytrackResult<bool>>) {
        match outcome {
            None => self.result.skipped += 1,
            Some(Ok(true)) => {
                self.result.recorded += 1;
                self.timeline.truncate(self.cursor + 1);
                self.timeline.push(self.session.to_records());
                self.cursor += 1;
            }
            Some(Ok(false)) => {
                self.result.no_ops += 1;
                self.verify("no-op edit");
            }
            Some(Err(error)) => {
                trace!(?operation, %error, "edit rejected");
                self.result.rejected += 1;
                self.verify("rejected edit");
            }
        }
    }

    /// Undo everything, then redo everything
    fn round_trip(&mut self) {
        while self.session.undo() {
            self.result.undos += 1;
            self.cursor -= 1;
            self.verify("undo-all");
        }
        if self.cursor != 0 || !self.session.registry().is_empty() {
            self.result
                .replay_mismatches
                .push(format!("undo-all stopped at position {}", self.cursor));
        }

        while self.session.redo() {
            self.result.redos += 1;
            self.cursor += 1;
            self.verify("redo-all");
        }
        if self.cursor + 1 != self.timeline.len() {
            self.result.replay_mismatches.push(format!(
                "redo-all stopped at position {} of {}",
                self.cursor,
                self.timeline.len() - 1
            ));
        }
    }

    fn verify(&mut self, context: &str) {
        if self.session.to_records() != self.timeline[self.cursor] {
            self.result
                .replay_mismatches
                .push(format!("{context}: state differs at history position {}", self.cursor));
        }
    }

    fn check_structure(&mut self, step: usize) {
        for violation in structure_violations(self.session.registry()) {
            self.result.structure_violations.push(format!("step {step}: {violation}"));
        }
    }

    fn pick_instance(&mut self) -> Option<InstanceId> {
        let ids: Vec<InstanceId> = self.session.registry().instances().map(|i| i.id().clone()).collect();
        self.choose(ids)
    }

    fn pick_item(&mut self) -> Option<(InstanceId, ItemId)> {
        let items: Vec<(InstanceId, ItemId)> = self
            .session
            .registry()
            .instances()
            .flat_map(|instance| instance.items().map(|item| (instance.id().clone(), item.id().clone())))
            .collect();
        self.choose(items)
    }

    fn pick_frame(&mut self, key_only: bool) -> Option<(InstanceId, ItemId, CameraId, FrameIndex)> {
        let mut frames = Vec::new();
        for instance in self.session.registry().instances() {
            for item in instance.items() {
                for track in item.tracks() {
                    for frame in track.frames().filter(|f| !key_only || f.is_key_frame) {
                        frames.push((
                            instance.id().clone(),
                            item.id().clone(),
                            track.camera().clone(),
                            frame.frame_index,
                        ));
                    }
                }
            }
        }
        self.choose(frames)
    }

    fn choose<T>(&mut self, mut options: Vec<T>) -> Option<T> {
        if options.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..options.len());
        Some(options.swap_remove(index))
    }

    fn item_name(&mut self, category: &str) -> &'static str {
        let names: &[&'static str] = match category {
            "car" => &["body", "wheel", "plate"],
            _ => &["body", "head"],
        };
        names[self.rng.gen_range(0..names.len())]
    }

    fn camera(&mut self) -> CameraId {
        CameraId::from(CAMERAS[self.rng.gen_range(0..CAMERAS.len())])
    }

    fn frame(&mut self) -> FrameIndex {
        self.rng.gen_range(0..=self.config.max_frame)
    }

    fn geometry(&mut self) -> ShapeGeometry {
        let x = self.rng.gen_range(0.0..500.0);
        if self.rng.gen::<f64>() >= self.config.polygon_prob {
            return rect(x);
        }
        let vertices = self.rng.gen_range(3..=4);
        let points = (0..vertices)
            .map(|i| Vertex::new(x + 10.0 * i as f64, self.rng.gen_range(0.0..300.0)))
            .collect();
        ShapeGeometry::Polygon(points)
    }
}

/// Structural invariants every registry state must satisfy
///
/// - no empty instance, item or camera track survives
/// - dynamic attributes only sit on frames some item covers, and are never empty
/// - instance numbers are unique within a category
/// - the selection names existing entities
pub fn structure_violations(registry: &InstanceRegistry) -> Vec<String> {
    let mut violations = Vec::new();
    let mut numbers: BTreeMap<(CategoryId, u32), InstanceId> = BTreeMap::new();

    for instance in registry.instances() {
        let id = instance.id();
        if instance.item_count() == 0 {
            violations.push(format!("instance {id} has no items"));
        }
        for item in instance.items() {
            if item.is_empty() {
                violations.push(format!("item {} of {id} has no frames", item.id()));
            }
            for track in item.tracks() {
                if track.is_empty() {
                    violations.push(format!("item {} of {id} keeps an empty {} track", item.id(), track.camera()));
                }
            }
        }
        for (camera, frames) in instance.dynamic_attributes() {
            for (frame, attributes) in frames {
                if !instance.has_frame_at(camera, *frame) {
                    violations.push(format!("{id} has dynamic attributes at uncovered {camera}:{frame}"));
                }
                if attributes.is_empty() {
                    violations.push(format!("{id} keeps empty dynamic attributes at {camera}:{frame}"));
                }
            }
        }
        if let Some(other) = numbers.insert((instance.category().clone(), instance.number()), id.clone()) {
            violations.push(format!("{id} and {other} share number {}", instance.number()));
        }
    }

    let selection = registry.selection();
    match (&selection.instance, &selection.item) {
        (None, Some(item)) => violations.push(format!("selection names item {item} without an instance")),
        (Some(id), item) => match registry.instance(id) {
            None => violations.push(format!("selection names missing instance {id}")),
            Some(instance) => {
                if let Some(item) = item.as_ref().filter(|item| instance.item(item).is_none()) {
                    violations.push(format!("selection names missing item {item}"));
                }
            }
        },
        (None, None) => {}
    }

    violations
}
