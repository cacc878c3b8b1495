use super::*;
use crate::capabilities::SpatialEnvironmentDetector;
use crate::config::SessionConfig;
use crate::host::{HitResultHandle, SessionMode};
use crate::scene::SceneCollaborator;
use crate::session::{FeatureOverrides, SessionCoordinator};
use crate::sim::{MemoryScene, SimFrame, SimSettings, SimulatedHost};
use glam::Quat;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

const CUBE: ObjectId = ObjectId(7);

struct Fixture {
    host: Arc<SimulatedHost>,
    scene: Arc<Mutex<MemoryScene>>,
    registry: AnchorRegistry,
    events: Arc<Mutex<Vec<AnchorEvent>>>,
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
    scene.lock().add_object(CUBE, Vec3::new(0.0, 1.0, -1.0), 0.1);

    let mut registry = AnchorRegistry::new(VisualConfig::default(), scene.clone());
    registry.attach_session(&session);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    registry.events().subscribe(move |e| sink.lock().push(e.clone()));

    Fixture {
        host,
        scene,
        registry,
        events,
    }
}

#[tokio::test]
async fn test_anchor_pose_sync_moves_attached_object() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let options = AnchorOptions {
        object: Some(CUBE),
        metadata: json!({ "label": "lamp" }),
    };
    let anchor = f.registry.create_anchor(Pose::IDENTITY, options).await.unwrap();

    let pose = Pose::from_position(Vec3::new(1.0, 2.0, 3.0));
    f.registry.update(&SimFrame::new(0.0).with_anchor(anchor, pose));

    assert_eq!(f.scene.lock().position(CUBE), Some(Vec3::new(1.0, 2.0, 3.0)));
    assert_eq!(f.registry.get(anchor).unwrap().marker.position(), Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(
        f.scene.lock().object(CUBE).unwrap().parent,
        ObjectParent::Anchor(anchor)
    );
}

#[tokio::test]
async fn test_added_event_carries_metadata() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let options = AnchorOptions {
        object: None,
        metadata: json!({ "kind": "note" }),
    };
    let pose = Pose::from_position(Vec3::new(0.0, 0.0, -2.0));
    let anchor = f.registry.create_anchor(pose, options).await.unwrap();

    assert_eq!(
        f.events.lock().clone(),
        vec![AnchorEvent::AnchorAdded {
            anchor,
            pose,
            metadata: json!({ "kind": "note" }),
        }]
    );
}

#[tokio::test]
async fn test_anchor_from_hit() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let hit = HitTestResult {
        handle: HitResultHandle(1),
    };
    let pose = Pose::new(Vec3::new(0.3, 0.0, -1.0), Quat::from_rotation_y(0.5));

    let anchor = f
        .registry
        .create_anchor_from_hit(hit, pose, AnchorOptions::default())
        .await
        .unwrap();
    assert_eq!(f.registry.get(anchor).unwrap().pose, pose);
    assert_eq!(f.host.live_anchors(), 1);
}

#[tokio::test]
async fn test_unresolved_anchor_is_removed() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let options = AnchorOptions {
        object: Some(CUBE),
        ..AnchorOptions::default()
    };
    let anchor = f.registry.create_anchor(Pose::IDENTITY, options).await.unwrap();

    f.registry.update(&SimFrame::new(0.0));

    assert!(f.registry.is_empty());
    assert_eq!(
        f.events.lock().last(),
        Some(&AnchorEvent::AnchorRemoved {
            anchor,
            reason: AnchorRemoval::TrackingLost
        })
    );
    assert_eq!(f.scene.lock().object(CUBE).unwrap().parent, ObjectParent::Root);
}

#[tokio::test]
async fn test_unchanged_pose_emits_no_update() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let anchor = f
        .registry
        .create_anchor(Pose::IDENTITY, AnchorOptions::default())
        .await
        .unwrap();

    f.registry.update(&SimFrame::new(0.0).with_anchor(anchor, Pose::IDENTITY));
    let moved = Pose::from_position(Vec3::X);
    f.registry.update(&SimFrame::new(16.0).with_anchor(anchor, moved));
    f.registry.update(&SimFrame::new(32.0).with_anchor(anchor, moved));

    let updates = f
        .events
        .lock()
        .iter()
        .filter(|e| matches!(e, AnchorEvent::AnchorUpdated { .. }))
        .count();
    assert_eq!(updates, 1);
}

#[tokio::test]
async fn test_remove_tolerates_host_failure() {
    let settings = SimSettings {
        fail_anchor_deletion: true,
        ..SimSettings::default()
    };
    let mut f = fixture(settings, SessionMode::ImmersiveAr).await;
    let anchor = f
        .registry
        .create_anchor(Pose::IDENTITY, AnchorOptions::default())
        .await
        .unwrap();

    assert!(f.registry.remove_anchor(anchor));
    assert!(f.registry.get(anchor).is_none());
    assert!(!f.registry.remove_anchor(anchor));
}

#[tokio::test]
async fn test_attach_and_detach_object() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    let anchor = f
        .registry
        .create_anchor(Pose::from_position(Vec3::new(0.0, 0.0, -3.0)), AnchorOptions::default())
        .await
        .unwrap();

    assert!(f.registry.attach_object_to_anchor(anchor, CUBE));
    assert_eq!(f.scene.lock().position(CUBE), Some(Vec3::new(0.0, 0.0, -3.0)));
    assert!(!f.registry.attach_object_to_anchor(AnchorHandle(999), CUBE));

    assert_eq!(f.registry.detach_object_from_anchor(anchor), Some(CUBE));
    assert_eq!(f.scene.lock().object(CUBE).unwrap().parent, ObjectParent::Root);

    f.registry.update(&SimFrame::new(0.0).with_anchor(anchor, Pose::IDENTITY));
    assert_eq!(f.scene.lock().position(CUBE), Some(Vec3::new(0.0, 0.0, -3.0)));
}

#[tokio::test]
async fn test_anchored_object_keeps_its_scale() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    f.scene
        .lock()
        .set_world_transform(CUBE, Mat4::from_scale(Vec3::splat(2.0)));
    let options = AnchorOptions {
        object: Some(CUBE),
        ..AnchorOptions::default()
    };
    let anchor = f.registry.create_anchor(Pose::IDENTITY, options).await.unwrap();
    f.registry
        .update(&SimFrame::new(0.0).with_anchor(anchor, Pose::from_position(Vec3::Y)));

    let transform = f.scene.lock().object(CUBE).unwrap().transform;
    assert!((uniform_scale(&transform) - 2.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_requires_active_session() {
    let scene = Arc::new(Mutex::new(MemoryScene::new()));
    let mut registry = AnchorRegistry::new(VisualConfig::default(), scene);

    let err = registry
        .create_anchor(Pose::IDENTITY, AnchorOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, XrError::NoActiveSession);
}

#[tokio::test]
async fn test_vr_session_has_no_anchors() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveVr).await;
    let err = f
        .registry
        .create_anchor(Pose::IDENTITY, AnchorOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, XrError::FeatureUnavailable(Feature::Anchors));
}

#[tokio::test]
async fn test_host_creation_failure_surfaces() {
    let settings = SimSettings {
        fail_anchor_creation: true,
        ..SimSettings::default()
    };
    let mut f = fixture(settings, SessionMode::ImmersiveAr).await;
    let err = f
        .registry
        .create_anchor(Pose::IDENTITY, AnchorOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, XrError::Host(_)));
    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn test_detach_session_drops_anchors_without_host_calls() {
    let mut f = fixture(SimSettings::default(), SessionMode::ImmersiveAr).await;
    f.registry
        .create_anchor(Pose::IDENTITY, AnchorOptions::default())
        .await
        .unwrap();

    f.registry.detach_session();
    assert!(f.registry.is_empty());
    assert!(f.host.deleted_anchors().is_empty());
    assert!(matches!(
        f.events.lock().last(),
        Some(AnchorEvent::AnchorRemoved {
            reason: AnchorRemoval::SessionEnded,
            ..
        })
    ));
}
