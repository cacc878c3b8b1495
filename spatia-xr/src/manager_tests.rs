use super::*;
use crate::capabilities::SpatialEnvironmentDetector;
use crate::config::SessionConfig;
use crate::host::{Feature, Handedness, PlaneHandle, PlaneOrientation, SessionMode};
use crate::scene::SceneCollaborator;
use crate::session::{FeatureOverrides, SessionCoordinator};
use crate::sim::{MemoryScene, SimFrame, SimSettings, SimulatedHost};
use glam::{Quat, Vec3};
use parking_lot::Mutex;
use std::sync::Arc;

const CONTROLLER: InputSourceId = InputSourceId(40);
const HAND: InputSourceId = InputSourceId(41);
const CUBE: ObjectId = ObjectId(1);

struct Fixture {
    host: Arc<SimulatedHost>,
    scene: Arc<Mutex<MemoryScene>>,
    coordinator: SessionCoordinator,
    session: XrSession,
    manager: InteractionManager,
}

async fn fixture(settings: SimSettings, mode: SessionMode) -> Fixture {
    let host = SimulatedHost::new(settings);
    let coordinator = SessionCoordinator::new(
        host.clone(),
        SpatialEnvironmentDetector::new(host.clone()),
        SessionConfig::default(),
    );
    let session = coordinator
        .request_session(mode, FeatureOverrides::default())
        .await
        .unwrap();

    let scene = Arc::new(Mutex::new(MemoryScene::new()));
    scene.lock().add_object(CUBE, Vec3::new(0.0, 1.0, -2.0), 0.25);

    let mut manager = InteractionManager::new(XrConfig::default(), scene.clone());
    manager.attach_session(&session).await;
    Fixture {
        host,
        scene,
        coordinator,
        session,
        manager,
    }
}

fn controller() -> InputSourceInfo {
    InputSourceInfo {
        id: CONTROLLER,
        handedness: Handedness::Right,
        kind: InputSourceKind::Controller,
    }
}

fn hand() -> InputSourceInfo {
    InputSourceInfo {
        id: HAND,
        handedness: Handedness::Left,
        kind: InputSourceKind::Hand,
    }
}

fn run_frame(f: &mut Fixture, frame: SimFrame) {
    let request = f.host.take_frame_request().unwrap();
    assert_eq!(f.manager.pending_frame(), Some(request));
    assert!(f.manager.on_frame(request, &frame));
}

#[tokio::test]
async fn test_ar_attach_enables_placement() {
    let f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;

    assert!(f.manager.hit_test().is_active());
    assert_eq!(f.scene.lock().anchor_support, Some(true));
    assert_eq!(f.host.pending_frame_requests().len(), 1);
}

#[tokio::test]
async fn test_ar_without_hit_testing_reports_no_anchor_support() {
    let settings = SimSettings {
        fail_hit_test_source: true,
        ..SimSettings::default()
    };
    let f = fixture(settings, SessionMode::ImmersiveAr).await;

    assert!(!f.manager.hit_test().is_active());
    assert_eq!(f.scene.lock().anchor_support, Some(false));
    assert!(f.manager.is_attached());
}

#[tokio::test]
async fn test_vr_attach_skips_hit_testing() {
    let f = fixture(SimSettings::default(), SessionMode::ImmersiveVr).await;

    assert!(!f.manager.hit_test().is_active());
    assert_eq!(f.scene.lock().anchor_support, None);
    assert_eq!(f.host.active_hit_test_sources(), 0);
}

#[tokio::test]
async fn test_frame_loop_reschedules_once_per_frame() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let first = f.manager.pending_frame().unwrap();

    assert!(f.manager.on_frame(first, &SimFrame::new(0.0)));
    let second = f.manager.pending_frame().unwrap();
    assert_ne!(first, second);

    // The consumed request is stale now
    assert!(!f.manager.on_frame(first, &SimFrame::new(16.0)));
    assert_eq!(f.manager.frames(), 1);
}

#[tokio::test]
async fn test_frame_updates_planes_and_reticle() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let polygon = vec![
        Vec3::new(-1.0, 0.0, -1.0),
        Vec3::new(1.0, 0.0, -1.0),
        Vec3::new(1.0, 0.0, 1.0),
    ];
    let frame = SimFrame::new(0.0)
        .with_plane(PlaneHandle(5), PlaneOrientation::Horizontal, polygon, Pose::IDENTITY, 1.0)
        .with_hit(Pose::from_position(Vec3::new(0.0, 0.0, -1.5)));
    run_frame(&mut f, frame);

    assert!(f.manager.planes().get(PlaneHandle(5)).is_some());
    assert!(f.manager.hit_test().reticle().unwrap().visible);
}

#[tokio::test]
async fn test_ar_select_places_anchor_at_hit() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let pose = Pose::from_position(Vec3::new(0.2, 0.0, -1.0));
    run_frame(&mut f, SimFrame::new(0.0).with_hit(pose));

    f.manager
        .handle_input(InputEvent::new(CONTROLLER, InputEventKind::Select))
        .await
        .unwrap();

    let placements = f.scene.lock().placements.clone();
    assert_eq!(placements.len(), 1);
    assert_eq!(placements[0].0, pose);
    let anchor = placements[0].1.unwrap();
    assert!(f.manager.anchors().get(anchor).is_some());
}

#[tokio::test]
async fn test_ar_select_after_cursor_loss_uses_last_pose() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let pose = Pose::from_position(Vec3::new(0.0, 0.0, -2.0));
    run_frame(&mut f, SimFrame::new(0.0).with_hit(pose));
    run_frame(&mut f, SimFrame::new(16.0));

    let placement = f.manager.place_at_hit().await.unwrap();
    assert_eq!(placement.pose, pose);
    assert!(placement.anchor.is_some());
}

#[tokio::test]
async fn test_ar_select_without_anchor_feature_still_places() {
    let settings = SimSettings {
        device_features: vec![Feature::Local, Feature::HitTest],
        ..SimSettings::default()
    };
    let mut f = fixture(settings, SessionMode::ImmersiveAr).await;
    assert_eq!(f.scene.lock().anchor_support, Some(false));

    run_frame(&mut f, SimFrame::new(0.0).with_hit(Pose::IDENTITY));
    let placement = f.manager.place_at_hit().await.unwrap();
    assert_eq!(placement.anchor, None);
    assert_eq!(f.scene.lock().placements, vec![(Pose::IDENTITY, None)]);
}

#[tokio::test]
async fn test_ar_select_without_any_hit_places_nothing() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    f.manager
        .handle_input(InputEvent::new(CONTROLLER, InputEventKind::Select))
        .await
        .unwrap();
    assert!(f.scene.lock().placements.is_empty());
}

#[tokio::test]
async fn test_vr_select_picks_for_selection_from_any_source() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveVr).await;
    f.manager.input_sources_changed(&[controller(), hand()], &[]);

    let aim = Pose::new(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY);
    run_frame(
        &mut f,
        SimFrame::new(0.0).with_input(HAND, InputSpace::TargetRay, aim),
    );
    f.manager
        .handle_input(InputEvent::new(HAND, InputEventKind::Select))
        .await
        .unwrap();
    assert_eq!(f.scene.lock().selected(), Some(CUBE));

    // A miss keeps the selection
    let away = Pose::new(Vec3::new(4.0, 1.0, 0.0), Quat::IDENTITY);
    run_frame(&mut f, SimFrame::new(16.0).with_controller(CONTROLLER, away));
    f.manager
        .handle_input(InputEvent::new(CONTROLLER, InputEventKind::Select))
        .await
        .unwrap();
    assert_eq!(f.scene.lock().selected(), Some(CUBE));
}

#[tokio::test]
async fn test_controller_grab_through_manager() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveVr).await;
    f.manager.input_sources_changed(&[controller()], &[]);
    run_frame(
        &mut f,
        SimFrame::new(0.0)
            .with_controller(CONTROLLER, Pose::from_position(Vec3::new(0.0, 1.0, 0.0))),
    );

    f.manager
        .handle_input(InputEvent::new(CONTROLLER, InputEventKind::SelectStart))
        .await
        .unwrap();
    assert_eq!(f.manager.controllers().held(0), Some(CUBE));

    f.manager
        .handle_input(InputEvent::new(CONTROLLER, InputEventKind::SelectEnd))
        .await
        .unwrap();
    assert_eq!(f.manager.controllers().held(0), None);
}

#[tokio::test]
async fn test_input_sources_bind_and_unbind() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveVr).await;
    f.manager.input_sources_changed(&[controller(), hand()], &[]);
    assert_eq!(f.manager.controllers().index_of(CONTROLLER), Some(0));
    assert_eq!(f.manager.hands().index_of(HAND), Some(0));

    f.manager.input_sources_changed(&[], &[CONTROLLER]);
    assert_eq!(f.manager.controllers().bound_count(), 0);
    assert_eq!(f.manager.input_sources().count(), 1);
}

#[tokio::test]
async fn test_detach_tears_everything_down() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    f.manager.input_sources_changed(&[controller()], &[]);
    run_frame(&mut f, SimFrame::new(0.0).with_hit(Pose::IDENTITY));
    f.manager.place_at_hit().await.unwrap();

    f.manager.detach_session();

    assert!(!f.manager.is_attached());
    assert!(f.manager.pending_frame().is_none());
    assert!(f.host.pending_frame_requests().is_empty());
    assert_eq!(f.host.active_hit_test_sources(), 0);
    assert!(f.manager.hit_test().reticle().is_none());
    assert!(f.manager.anchors().is_empty());
    assert_eq!(f.manager.controllers().bound_count(), 0);

    let err = f
        .manager
        .handle_input(InputEvent::new(CONTROLLER, InputEventKind::Select))
        .await
        .unwrap_err();
    assert_eq!(err, XrError::NoActiveSession);

    // Detaching twice is harmless
    f.manager.detach_session();
}

#[tokio::test]
async fn test_host_ended_session_detaches_on_next_frame() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    f.manager.input_sources_changed(&[controller()], &[]);
    run_frame(&mut f, SimFrame::new(0.0).with_hit(Pose::IDENTITY));
    f.manager.place_at_hit().await.unwrap();
    assert_eq!(f.host.active_hit_test_sources(), 1);

    f.coordinator.notify_host_ended();
    assert!(f.session.is_ended());

    let request = f.host.take_frame_request().unwrap();
    assert!(!f.manager.on_frame(request, &SimFrame::new(16.0)));
    assert!(!f.manager.is_attached());
    assert_eq!(f.manager.frames(), 0);
    assert!(f.manager.pending_frame().is_none());
    assert!(f.host.pending_frame_requests().is_empty());
    assert_eq!(f.host.active_hit_test_sources(), 0);
    assert_eq!(f.host.cancelled_hit_test_sources().len(), 1);
    assert!(f.manager.anchors().is_empty());
    assert_eq!(f.manager.controllers().bound_count(), 0);
}

#[tokio::test]
async fn test_input_after_coordinator_end_is_refused() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    f.coordinator.end_session().await;

    let err = f
        .manager
        .handle_input(InputEvent::new(CONTROLLER, InputEventKind::Select))
        .await
        .unwrap_err();
    assert_eq!(err, XrError::NoActiveSession);
    assert!(!f.manager.is_attached());
    assert_eq!(f.host.active_hit_test_sources(), 0);
    assert!(f.manager.place_at_hit().await.is_none());
    assert!(f.scene.lock().placements.is_empty());
}

#[tokio::test]
async fn test_reattach_replaces_previous_binding() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let session = f.session.clone();
    f.manager.attach_session(&session).await;

    assert_eq!(f.host.cancelled_hit_test_sources().len(), 1);
    assert_eq!(f.host.active_hit_test_sources(), 1);
    assert_eq!(f.host.pending_frame_requests().len(), 1);
}
