use super::*;
use crate::events::XrEvent;
use crate::host::InputSourceKind;
use crate::math::approx_eq;
use crate::scene::SceneCollaborator;
use crate::sim::{MemoryScene, SimFrame, REFERENCE_SPACE};
use parking_lot::Mutex;
use std::sync::Arc;

const LEFT: InputSourceId = InputSourceId(20);
const RIGHT: InputSourceId = InputSourceId(21);
const BALL: ObjectId = ObjectId(3);

fn hand(id: InputSourceId, handedness: Handedness) -> InputSourceInfo {
    InputSourceInfo {
        id,
        handedness,
        kind: InputSourceKind::Hand,
    }
}

/// Joints with the given thumb-index and wrist-middle spans, index finger
/// pointing down -Z.
fn joints(pinch_span: f32, middle_span: f32) -> HandJoints {
    let wrist = Vec3::new(0.0, 1.0, -0.3);
    let index_tip = wrist + Vec3::new(0.0, 0.0, -0.12);
    HandJoints {
        wrist,
        thumb_tip: index_tip + Vec3::new(pinch_span, 0.0, 0.0),
        index_proximal: wrist + Vec3::new(0.0, 0.0, -0.06),
        index_tip,
        middle_tip: wrist + Vec3::new(0.0, -middle_span, 0.0),
    }
}

fn setup() -> (Arc<Mutex<MemoryScene>>, HandGestureRecognizer, Arc<Mutex<Vec<GestureEvent>>>) {
    let scene = Arc::new(Mutex::new(MemoryScene::new()));
    let mut recognizer = HandGestureRecognizer::new(GestureConfig::default(), scene.clone());
    recognizer.bind(hand(LEFT, Handedness::Left));
    recognizer.bind(hand(RIGHT, Handedness::Right));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    recognizer.events().subscribe(move |e| sink.lock().push(e.clone()));
    (scene, recognizer, events)
}

fn names(events: &Mutex<Vec<GestureEvent>>) -> Vec<&'static str> {
    events.lock().iter().map(|e| e.name()).collect()
}

#[test]
fn test_evaluate_thresholds() {
    let config = GestureConfig::default();

    let flags = evaluate(&joints(0.015, 0.04), &config);
    assert_eq!(flags, GestureFlags { pinch: true, grab: true, point: false });

    let flags = evaluate(&joints(0.05, 0.09), &config);
    assert_eq!(flags, GestureFlags { pinch: false, grab: false, point: true });

    // Between the grab and point thresholds: neither
    let flags = evaluate(&joints(0.05, 0.06), &config);
    assert_eq!(flags, GestureFlags::default());
}

#[test]
fn test_pinch_is_edge_triggered() {
    let (_, mut recognizer, events) = setup();
    for span in [0.03, 0.015, 0.015, 0.03] {
        recognizer.process_joints(0, &joints(span, 0.06), Mat4::IDENTITY);
    }

    assert_eq!(names(&events), vec!["pinchstart", "pinchend"]);
}

#[test]
fn test_hands_are_tracked_independently() {
    let (_, mut recognizer, events) = setup();
    recognizer.process_joints(0, &joints(0.015, 0.06), Mat4::IDENTITY);
    recognizer.process_joints(1, &joints(0.015, 0.06), Mat4::IDENTITY);
    recognizer.process_joints(0, &joints(0.015, 0.06), Mat4::IDENTITY);

    assert_eq!(
        events.lock().clone(),
        vec![
            GestureEvent::PinchStart { hand: 0, object: None },
            GestureEvent::PinchStart { hand: 1, object: None },
        ]
    );
}

#[test]
fn test_pinch_and_grab_together() {
    let (_, mut recognizer, events) = setup();
    recognizer.process_joints(1, &joints(0.01, 0.03), Mat4::IDENTITY);
    assert_eq!(names(&events), vec!["pinchstart", "grabstart"]);

    recognizer.process_joints(1, &joints(0.05, 0.06), Mat4::IDENTITY);
    assert_eq!(names(&events), vec!["pinchstart", "grabstart", "pinchend", "grabend"]);
}

#[test]
fn test_point_reports_index_direction() {
    let (_, mut recognizer, events) = setup();
    recognizer.process_joints(0, &joints(0.05, 0.10), Mat4::IDENTITY);
    recognizer.process_joints(0, &joints(0.05, 0.10), Mat4::IDENTITY);
    recognizer.process_joints(0, &joints(0.05, 0.06), Mat4::IDENTITY);

    let events = events.lock().clone();
    assert_eq!(events.len(), 2);
    match events[0] {
        GestureEvent::PointStart { hand, direction } => {
            assert_eq!(hand, 0);
            assert!(direction.abs_diff_eq(Vec3::NEG_Z, 1e-5));
        }
        ref other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(events[1], GestureEvent::PointEnd { hand: 0 });
}

#[test]
fn test_pinch_picks_nearest_object_and_releases_in_place() {
    let (scene, mut recognizer, events) = setup();
    let index_tip = joints(0.0, 0.06).index_tip;
    scene.lock().add_object(BALL, index_tip + Vec3::new(0.05, 0.0, 0.0), 0.02);
    scene.lock().add_object(ObjectId(4), index_tip + Vec3::new(0.5, 0.0, 0.0), 0.02);
    let before = scene.lock().world_transform(BALL).unwrap();

    let wrist = Mat4::from_translation(Vec3::new(0.0, 1.0, -0.3));
    recognizer.process_joints(0, &joints(0.01, 0.06), wrist);
    assert_eq!(recognizer.held(0), Some(BALL));
    assert_eq!(scene.lock().object(BALL).unwrap().parent, ObjectParent::Hand(0));

    let moved = Mat4::from_translation(Vec3::new(0.2, 1.0, -0.3));
    recognizer.process_joints(0, &joints(0.01, 0.06), moved);
    let position = scene.lock().position(BALL).unwrap();
    let expected = before.transform_point3(Vec3::ZERO) + Vec3::new(0.2, 0.0, 0.0);
    assert!(position.abs_diff_eq(expected, 1e-5));

    recognizer.process_joints(0, &joints(0.05, 0.06), wrist);
    assert!(approx_eq(&scene.lock().world_transform(BALL).unwrap(), &before, 1e-5));
    assert_eq!(scene.lock().object(BALL).unwrap().parent, ObjectParent::Root);
    assert_eq!(
        events.lock().last(),
        Some(&GestureEvent::PinchEnd { hand: 0, object: Some(BALL) })
    );
}

#[test]
fn test_pinch_ignores_objects_out_of_reach() {
    let (scene, mut recognizer, _) = setup();
    let index_tip = joints(0.0, 0.06).index_tip;
    scene.lock().add_object(BALL, index_tip + Vec3::new(0.2, 0.0, 0.0), 0.02);

    recognizer.process_joints(0, &joints(0.01, 0.06), Mat4::IDENTITY);
    assert_eq!(recognizer.held(0), None);
}

#[test]
fn test_update_reads_joints_from_frame() {
    let (_, mut recognizer, events) = setup();
    let wrist = Vec3::new(0.0, 1.0, -0.3);
    let reference = SpaceId(REFERENCE_SPACE);

    recognizer.update(&SimFrame::new(0.0).with_hand(RIGHT, wrist, 0.03, 0.06), reference);
    recognizer.update(&SimFrame::new(16.0).with_hand(RIGHT, wrist, 0.015, 0.06), reference);
    // Untracked frame changes nothing
    recognizer.update(&SimFrame::new(32.0), reference);
    recognizer.update(&SimFrame::new(48.0).with_hand(RIGHT, wrist, 0.03, 0.06), reference);

    assert_eq!(
        events.lock().clone(),
        vec![
            GestureEvent::PinchStart { hand: 1, object: None },
            GestureEvent::PinchEnd { hand: 1, object: None },
        ]
    );
    assert_eq!(recognizer.flags(1), Some(GestureFlags::default()));
}

#[test]
fn test_bind_by_handedness() {
    let scene = Arc::new(Mutex::new(MemoryScene::new()));
    let mut recognizer = HandGestureRecognizer::new(GestureConfig::default(), scene);

    assert_eq!(recognizer.bind(hand(RIGHT, Handedness::Right)), Some(1));
    assert_eq!(recognizer.bind(hand(InputSourceId(30), Handedness::Right)), None);
    assert_eq!(recognizer.bind(hand(InputSourceId(31), Handedness::None)), Some(0));
    assert_eq!(recognizer.unbind(RIGHT), Some(1));
    assert_eq!(recognizer.source(1), None);
}
