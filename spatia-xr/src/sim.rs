//! In-process simulated host, frames and scene
//!
//! Used by the test suites and the `spatia simulate` command to drive the
//! full coordinator chain without a headset.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use glam::{Mat4, Quat, Vec3};
use parking_lot::Mutex;

use crate::error::HostError;
use crate::host::{
    AnchorHandle, BlendMode, Feature, FrameRequestId, HandJoint, HitResultHandle, HitTestResult,
    HitTestSourceId, HostPlane, HostSession, InputSourceId, InputSpace, ObjectId, PlaneHandle,
    PlaneOrientation, ReferenceSpaceKind, SessionInit, SessionMode, SpaceId, SpatialEnvironment,
    XrFrame, XrHost,
};
use crate::math::{uniform_scale, Pose};
use crate::scene::{Interactable, ModificationReason, ObjectParent, SceneCollaborator};

/// Behaviour switches for a [`SimulatedHost`].
#[derive(Debug, Clone)]
pub struct SimSettings {
    pub api_available: bool,
    pub supported_modes: Vec<SessionMode>,
    /// Features the device can grant; anything else is dropped or, if
    /// required, rejects the session
    pub device_features: Vec<Feature>,
    pub reject_sessions: bool,
    pub fail_end: bool,
    pub fail_hit_test_source: bool,
    pub fail_anchor_creation: bool,
    pub fail_anchor_deletion: bool,
    pub refuse_local_floor: bool,
    /// Scheduler yields before a negotiation resolves
    pub negotiation_yields: usize,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            api_available: true,
            supported_modes: vec![SessionMode::ImmersiveVr, SessionMode::ImmersiveAr],
            device_features: vec![
                Feature::Local,
                Feature::LocalFloor,
                Feature::BoundedFloor,
                Feature::HitTest,
                Feature::PlaneDetection,
                Feature::Anchors,
                Feature::HandTracking,
                Feature::DomOverlay,
            ],
            reject_sessions: false,
            fail_end: false,
            fail_hit_test_source: false,
            fail_anchor_creation: false,
            fail_anchor_deletion: false,
            refuse_local_floor: false,
            negotiation_yields: 1,
        }
    }
}

#[derive(Default)]
struct SimState {
    session_requests: AtomicUsize,
    end_calls: AtomicUsize,
    next_id: AtomicU64,
    last_init: Mutex<Option<SessionInit>>,
    hit_test_sources: Mutex<HashSet<HitTestSourceId>>,
    cancelled_sources: Mutex<Vec<HitTestSourceId>>,
    anchors: Mutex<HashSet<AnchorHandle>>,
    deleted_anchors: Mutex<Vec<AnchorHandle>>,
    frame_requests: Mutex<HashSet<FrameRequestId>>,
}

impl SimState {
    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// A scripted host runtime.
pub struct SimulatedHost {
    settings: Mutex<SimSettings>,
    state: Arc<SimState>,
}

impl SimulatedHost {
    pub fn new(settings: SimSettings) -> Arc<Self> {
        Arc::new(Self {
            settings: Mutex::new(settings),
            state: Arc::new(SimState::default()),
        })
    }

    pub fn update_settings(&self, f: impl FnOnce(&mut SimSettings)) {
        f(&mut self.settings.lock());
    }

    pub fn session_requests(&self) -> usize {
        self.state.session_requests.load(Ordering::SeqCst)
    }

    pub fn end_calls(&self) -> usize {
        self.state.end_calls.load(Ordering::SeqCst)
    }

    pub fn last_init(&self) -> Option<SessionInit> {
        self.state.last_init.lock().clone()
    }

    pub fn active_hit_test_sources(&self) -> usize {
        self.state.hit_test_sources.lock().len()
    }

    pub fn cancelled_hit_test_sources(&self) -> Vec<HitTestSourceId> {
        self.state.cancelled_sources.lock().clone()
    }

    pub fn live_anchors(&self) -> usize {
        self.state.anchors.lock().len()
    }

    pub fn deleted_anchors(&self) -> Vec<AnchorHandle> {
        self.state.deleted_anchors.lock().clone()
    }

    /// Frame requests that have been issued and not cancelled
    pub fn pending_frame_requests(&self) -> Vec<FrameRequestId> {
        let mut requests: Vec<_> = self.state.frame_requests.lock().iter().copied().collect();
        requests.sort();
        requests
    }

    /// Take the most recent frame request, as the host would when it
    /// delivers the next frame.
    pub fn take_frame_request(&self) -> Option<FrameRequestId> {
        let mut requests = self.state.frame_requests.lock();
        let latest = requests.iter().max().copied()?;
        requests.remove(&latest);
        Some(latest)
    }
}

#[async_trait]
impl SpatialEnvironment for SimulatedHost {
    fn api_available(&self) -> bool {
        self.settings.lock().api_available
    }

    async fn is_session_supported(&self, mode: SessionMode) -> Result<bool, HostError> {
        Ok(self.settings.lock().supported_modes.contains(&mode))
    }
}

#[async_trait]
impl XrHost for SimulatedHost {
    async fn request_session(
        &self,
        mode: SessionMode,
        init: &SessionInit,
    ) -> Result<Arc<dyn HostSession>, HostError> {
        self.state.session_requests.fetch_add(1, Ordering::SeqCst);
        *self.state.last_init.lock() = Some(init.clone());

        let settings = self.settings.lock().clone();

        // Negotiation is never instantaneous on a real device.
        for _ in 0..settings.negotiation_yields {
            tokio::task::yield_now().await;
        }

        if settings.reject_sessions {
            return Err(HostError::Rejected("user declined the session".to_string()));
        }
        if !settings.supported_modes.contains(&mode) {
            return Err(HostError::NotSupported(mode.to_string()));
        }
        if let Some(missing) = init
            .required_features
            .iter()
            .find(|f| !settings.device_features.contains(f))
        {
            return Err(HostError::NotSupported(missing.to_string()));
        }

        let granted = init
            .required_features
            .iter()
            .chain(init.optional_features.iter())
            .filter(|f| settings.device_features.contains(f))
            .copied()
            .collect();

        Ok(Arc::new(SimulatedSession {
            mode,
            granted,
            settings,
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimulatedSession {
    mode: SessionMode,
    granted: Vec<Feature>,
    settings: SimSettings,
    state: Arc<SimState>,
}

#[async_trait]
impl HostSession for SimulatedSession {
    fn enabled_features(&self) -> Vec<Feature> {
        self.granted.clone()
    }

    fn environment_blend_mode(&self) -> BlendMode {
        match self.mode {
            SessionMode::ImmersiveAr => BlendMode::AlphaBlend,
            SessionMode::ImmersiveVr => BlendMode::Opaque,
        }
    }

    async fn request_reference_space(
        &self,
        kind: ReferenceSpaceKind,
    ) -> Result<SpaceId, HostError> {
        match kind {
            ReferenceSpaceKind::LocalFloor if self.settings.refuse_local_floor => {
                Err(HostError::NotSupported("local-floor".to_string()))
            }
            ReferenceSpaceKind::Viewer => Ok(SpaceId(VIEWER_SPACE)),
            _ => Ok(SpaceId(REFERENCE_SPACE)),
        }
    }

    async fn request_hit_test_source(&self, _space: SpaceId) -> Result<HitTestSourceId, HostError> {
        if self.settings.fail_hit_test_source || !self.granted.contains(&Feature::HitTest) {
            return Err(HostError::NotSupported("hit-test".to_string()));
        }
        let source = HitTestSourceId(self.state.next());
        self.state.hit_test_sources.lock().insert(source);
        Ok(source)
    }

    fn cancel_hit_test_source(&self, source: HitTestSourceId) {
        self.state.hit_test_sources.lock().remove(&source);
        self.state.cancelled_sources.lock().push(source);
    }

    async fn create_anchor(&self, _pose: Pose, _space: SpaceId) -> Result<AnchorHandle, HostError> {
        if self.settings.fail_anchor_creation {
            return Err(HostError::Api("anchor creation failed".to_string()));
        }
        let anchor = AnchorHandle(self.state.next());
        self.state.anchors.lock().insert(anchor);
        Ok(anchor)
    }

    async fn create_anchor_from_hit(&self, _hit: HitTestResult) -> Result<AnchorHandle, HostError> {
        self.create_anchor(Pose::IDENTITY, SpaceId(REFERENCE_SPACE)).await
    }

    fn delete_anchor(&self, anchor: AnchorHandle) -> Result<(), HostError> {
        self.state.anchors.lock().remove(&anchor);
        if self.settings.fail_anchor_deletion {
            return Err(HostError::Api("anchor deletion failed".to_string()));
        }
        self.state.deleted_anchors.lock().push(anchor);
        Ok(())
    }

    fn request_animation_frame(&self) -> FrameRequestId {
        let request = FrameRequestId(self.state.next());
        self.state.frame_requests.lock().insert(request);
        request
    }

    fn cancel_animation_frame(&self, request: FrameRequestId) {
        self.state.frame_requests.lock().remove(&request);
    }

    async fn end(&self) -> Result<(), HostError> {
        self.state.end_calls.fetch_add(1, Ordering::SeqCst);
        self.state.hit_test_sources.lock().clear();
        self.state.frame_requests.lock().clear();
        if self.settings.fail_end {
            return Err(HostError::Api("device refused to end session".to_string()));
        }
        Ok(())
    }
}

/// Space id every simulated session uses for its reference space
pub const REFERENCE_SPACE: u64 = 1;
/// Space id every simulated session uses for its viewer space
pub const VIEWER_SPACE: u64 = 2;

fn plane_space(handle: PlaneHandle) -> SpaceId {
    SpaceId(1_000_000 + handle.0)
}

/// One scripted frame of tracking data. All poses are expressed directly in
/// the reference space.
#[derive(Debug, Clone, Default)]
pub struct SimFrame {
    time: f64,
    hits: Vec<(HitResultHandle, Pose)>,
    planes: Option<Vec<HostPlane>>,
    space_poses: HashMap<SpaceId, Pose>,
    anchors: HashMap<AnchorHandle, Pose>,
    inputs: HashMap<(InputSourceId, InputSpace), Pose>,
    joints: HashMap<(InputSourceId, HandJoint), Pose>,
}

impl SimFrame {
    pub fn new(time: f64) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }

    pub fn with_hit(mut self, pose: Pose) -> Self {
        let handle = HitResultHandle(self.hits.len() as u64 + 1);
        self.hits.push((handle, pose));
        self
    }

    /// Report the plane set for this frame, even if empty
    pub fn with_planes_detected(mut self) -> Self {
        self.planes.get_or_insert_with(Vec::new);
        self
    }

    pub fn with_plane(
        mut self,
        handle: PlaneHandle,
        orientation: PlaneOrientation,
        polygon: Vec<Vec3>,
        pose: Pose,
        last_changed_time: f64,
    ) -> Self {
        let space = plane_space(handle);
        self.space_poses.insert(space, pose);
        self.planes.get_or_insert_with(Vec::new).push(HostPlane {
            handle,
            space,
            polygon,
            orientation,
            last_changed_time,
        });
        self
    }

    /// Plane reported by the host whose pose cannot be resolved
    pub fn with_unresolved_plane(
        mut self,
        handle: PlaneHandle,
        polygon: Vec<Vec3>,
        last_changed_time: f64,
    ) -> Self {
        self.planes.get_or_insert_with(Vec::new).push(HostPlane {
            handle,
            space: plane_space(handle),
            polygon,
            orientation: PlaneOrientation::Horizontal,
            last_changed_time,
        });
        self
    }

    pub fn with_anchor(mut self, anchor: AnchorHandle, pose: Pose) -> Self {
        self.anchors.insert(anchor, pose);
        self
    }

    pub fn with_input(mut self, source: InputSourceId, space: InputSpace, pose: Pose) -> Self {
        self.inputs.insert((source, space), pose);
        self
    }

    /// Target ray and grip share one pose
    pub fn with_controller(self, source: InputSourceId, pose: Pose) -> Self {
        self.with_input(source, InputSpace::TargetRay, pose)
            .with_input(source, InputSpace::Grip, pose)
    }

    pub fn with_joint(mut self, source: InputSourceId, joint: HandJoint, position: Vec3) -> Self {
        self.joints.insert((source, joint), Pose::from_position(position));
        self
    }

    /// A hand at `wrist` with the given thumb-index and wrist-middle spans.
    /// Index finger points down -Z.
    pub fn with_hand(
        self,
        source: InputSourceId,
        wrist: Vec3,
        pinch_span: f32,
        middle_span: f32,
    ) -> Self {
        let index_tip = wrist + Vec3::new(0.0, 0.0, -0.12);
        let proximal = wrist + Vec3::new(0.0, 0.0, -0.06);
        let thumb_tip = index_tip + Vec3::new(pinch_span, 0.0, 0.0);
        let middle_tip = wrist + Vec3::new(0.0, -middle_span, 0.0);
        self.with_joint(source, HandJoint::Wrist, wrist)
            .with_joint(source, HandJoint::IndexFingerPhalanxProximal, proximal)
            .with_joint(source, HandJoint::IndexFingerTip, index_tip)
            .with_joint(source, HandJoint::ThumbTip, thumb_tip)
            .with_joint(source, HandJoint::MiddleFingerTip, middle_tip)
    }
}

impl XrFrame for SimFrame {
    fn time(&self) -> f64 {
        self.time
    }

    fn pose(&self, space: SpaceId, _base: SpaceId) -> Option<Pose> {
        match space.0 {
            REFERENCE_SPACE => Some(Pose::IDENTITY),
            _ => self.space_poses.get(&space).copied(),
        }
    }

    fn hit_test_results(&self, _source: HitTestSourceId) -> Vec<HitTestResult> {
        self.hits.iter().map(|(handle, _)| HitTestResult { handle: *handle }).collect()
    }

    fn hit_pose(&self, hit: HitTestResult, _base: SpaceId) -> Option<Pose> {
        self.hits
            .iter()
            .find(|(handle, _)| *handle == hit.handle)
            .map(|(_, pose)| *pose)
    }

    fn detected_planes(&self) -> Option<Vec<HostPlane>> {
        self.planes.clone()
    }

    fn anchor_pose(&self, anchor: AnchorHandle, _base: SpaceId) -> Option<Pose> {
        self.anchors.get(&anchor).copied()
    }

    fn input_pose(&self, source: InputSourceId, space: InputSpace, _base: SpaceId) -> Option<Pose> {
        self.inputs.get(&(source, space)).copied()
    }

    fn joint_pose(&self, source: InputSourceId, joint: HandJoint, _base: SpaceId) -> Option<Pose> {
        self.joints.get(&(source, joint)).copied()
    }
}

/// A scene object held by [`MemoryScene`]
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub transform: Mat4,
    /// Bounding radius at unit scale
    pub radius: f32,
    pub parent: ObjectParent,
}

/// Plain in-memory scene collaborator.
#[derive(Debug, Default)]
pub struct MemoryScene {
    objects: BTreeMap<ObjectId, SceneObject>,
    pub modifications: Vec<(ObjectId, ModificationReason)>,
    pub anchor_support: Option<bool>,
    pub placements: Vec<(Pose, Option<AnchorHandle>)>,
    selected: Option<ObjectId>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, id: ObjectId, position: Vec3, radius: f32) {
        self.add_object_with_transform(id, Mat4::from_translation(position), radius);
    }

    pub fn add_object_with_transform(&mut self, id: ObjectId, transform: Mat4, radius: f32) {
        self.objects.insert(
            id,
            SceneObject {
                transform,
                radius,
                parent: ObjectParent::Root,
            },
        );
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn position(&self, id: ObjectId) -> Option<Vec3> {
        self.objects.get(&id).map(|o| o.transform.transform_point3(Vec3::ZERO))
    }

    pub fn rotation(&self, id: ObjectId) -> Option<Quat> {
        self.objects.get(&id).map(|o| o.transform.to_scale_rotation_translation().1)
    }
}

impl SceneCollaborator for MemoryScene {
    fn interactables(&self) -> Vec<Interactable> {
        self.objects
            .iter()
            .map(|(id, object)| Interactable {
                id: *id,
                center: object.transform.transform_point3(Vec3::ZERO),
                radius: object.radius * uniform_scale(&object.transform),
            })
            .collect()
    }

    fn world_transform(&self, id: ObjectId) -> Option<Mat4> {
        self.objects.get(&id).map(|o| o.transform)
    }

    fn set_world_transform(&mut self, id: ObjectId, transform: Mat4) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.transform = transform;
        }
    }

    fn set_parent(&mut self, id: ObjectId, parent: ObjectParent) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.parent = parent;
        }
    }

    fn mark_modified(&mut self, id: ObjectId, reason: ModificationReason) {
        self.modifications.push((id, reason));
    }

    fn set_anchor_support(&mut self, available: bool) {
        self.anchor_support = Some(available);
    }

    fn register_placement(&mut self, pose: Pose, anchor: Option<AnchorHandle>) {
        self.placements.push((pose, anchor));
    }

    fn selected(&self) -> Option<ObjectId> {
        self.selected
    }

    fn set_selected(&mut self, id: Option<ObjectId>) {
        self.selected = id;
    }
}
