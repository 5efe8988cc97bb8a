#![no_main]

use arbitrary::Arbitrary;
use keytrack_core::{Attributes, CameraId, Rect, ShapeGeometry, Vertex};
use keytrack_runtime::{Session, SessionConfig};
use keytrack_state::{Catalog, KeyframeOptions};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Step {
    Create { frame: u8, x: i16, polygon: bool },
    Keyframe { target: u8, frame: u8, x: i16, interpolate: bool, insert_missing: bool },
    Interpolate { target: u8, frame: u8 },
    Remove { target: u8, frame: u8 },
    RemoveInstance { target: u8 },
    Undo,
    Redo,
}

fn geometry(x: i16, polygon: bool) -> ShapeGeometry {
    let x = f64::from(x);
    if polygon {
        ShapeGeometry::Polygon(vec![Vertex::new(x, 0.0), Vertex::new(x + 5.0, 0.0), Vertex::new(x, 5.0)])
    } else {
        ShapeGeometry::Rectangle(Rect::new(x, 0.0, 10.0, 10.0))
    }
}

fuzz_target!(|steps: Vec<Step>| {
    let mut session = Session::new(Catalog::new(), SessionConfig::unbounded());
    let camera = CameraId::from("front");
    let start = session.to_records();

    for step in steps.into_iter().take(64) {
        let targets: Vec<_> = session
            .registry()
            .instances()
            .flat_map(|i| i.items().map(|it| (i.id().clone(), it.id().clone())))
            .collect();
        let pick = |n: u8| targets.get(n as usize % targets.len().max(1)).cloned();

        match step {
            Step::Create { frame, x, polygon } => {
                let _ = session.create_instance(
                    "car".into(),
                    "body",
                    &camera,
                    frame.into(),
                    geometry(x, polygon),
                    Attributes::new(),
                );
            }
            Step::Keyframe { target, frame, x, interpolate, insert_missing } => {
                if let Some((id, item)) = pick(target) {
                    let options = KeyframeOptions { interpolate, insert_missing, ..Default::default() };
                    let _ = session.set_keyframe(&id, &item, &camera, frame.into(), geometry(x, false), options);
                }
            }
            Step::Interpolate { target, frame } => {
                if let Some((id, item)) = pick(target) {
                    let _ = session.interpolate(&id, &item, &camera, frame.into(), true);
                }
            }
            Step::Remove { target, frame } => {
                if let Some((id, item)) = pick(target) {
                    let _ = session.remove_frames(&id, &item, &camera, &[frame.into()]);
                }
            }
            Step::RemoveInstance { target } => {
                if let Some((id, _)) = pick(target) {
                    let _ = session.remove_instance(&id);
                }
            }
            Step::Undo => {
                session.undo();
            }
            Step::Redo => {
                session.redo();
            }
        }
    }

    while session.redo() {}
    let end = session.to_records();
    while session.undo() {}
    assert_eq!(session.to_records(), start);
    while session.redo() {}
    assert_eq!(session.to_records(), end);
});
