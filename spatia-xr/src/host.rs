//! Host spatial-computing API
//!
//! The coordinator never talks to a concrete runtime. Everything it needs
//! from the platform goes through the traits in this module, which keeps
//! browser, native and simulated hosts interchangeable.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::math::Pose;

macro_rules! host_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

host_id!(
    /// Opaque coordinate frame handle
    SpaceId
);
host_id!(
    /// Host hit-test source handle
    HitTestSourceId
);
host_id!(
    /// Single hit-test result within one frame
    HitResultHandle
);
host_id!(
    /// Host-assigned detected plane identity
    PlaneHandle
);
host_id!(
    /// Host-assigned anchor identity
    AnchorHandle
);
host_id!(
    /// Tracked input source (controller or hand)
    InputSourceId
);
host_id!(
    /// Pending frame callback registration
    FrameRequestId
);
host_id!(
    /// Object owned by the scene collaborator
    ObjectId
);

/// Immersive session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionMode {
    #[serde(rename = "immersive-vr")]
    ImmersiveVr,
    #[serde(rename = "immersive-ar")]
    ImmersiveAr,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::ImmersiveVr => "immersive-vr",
            SessionMode::ImmersiveAr => "immersive-ar",
        }
    }

    pub fn is_ar(&self) -> bool {
        matches!(self, SessionMode::ImmersiveAr)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional or required session features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    Local,
    LocalFloor,
    BoundedFloor,
    HitTest,
    PlaneDetection,
    Anchors,
    HandTracking,
    DomOverlay,
    LightEstimation,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Local => "local",
            Feature::LocalFloor => "local-floor",
            Feature::BoundedFloor => "bounded-floor",
            Feature::HitTest => "hit-test",
            Feature::PlaneDetection => "plane-detection",
            Feature::Anchors => "anchors",
            Feature::HandTracking => "hand-tracking",
            Feature::DomOverlay => "dom-overlay",
            Feature::LightEstimation => "light-estimation",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How rendered content is composited with the real world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    Opaque,
    AlphaBlend,
    Additive,
}

/// Reference space kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceSpaceKind {
    Viewer,
    Local,
    LocalFloor,
    BoundedFloor,
}

/// Host visibility of the running session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    Visible,
    VisibleBlurred,
    Hidden,
}

/// Feature lists handed to the host when negotiating a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionInit {
    pub required_features: Vec<Feature>,
    pub optional_features: Vec<Feature>,
    /// Document surface the UI overlay binds to (AR only)
    pub overlay_root: Option<String>,
}

impl SessionInit {
    pub fn requests(&self, feature: Feature) -> bool {
        self.required_features.contains(&feature) || self.optional_features.contains(&feature)
    }
}

/// Surface orientation reported for a detected plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaneOrientation {
    Horizontal,
    Vertical,
}

/// A detected surface as reported by the host for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HostPlane {
    pub handle: PlaneHandle,
    /// Space the plane's polygon is expressed in
    pub space: SpaceId,
    /// Boundary in plane space, ordered, on the plane's XZ axes
    pub polygon: Vec<Vec3>,
    pub orientation: PlaneOrientation,
    pub last_changed_time: f64,
}

/// A hit-test candidate for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitTestResult {
    pub handle: HitResultHandle,
}

/// Handedness of a tracked input source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    None,
    Left,
    Right,
}

/// Kind of tracked input source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSourceKind {
    Controller,
    Hand,
}

/// Description of a connected input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSourceInfo {
    pub id: InputSourceId,
    pub handedness: Handedness,
    pub kind: InputSourceKind,
}

/// Which pose of an input source to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSpace {
    TargetRay,
    Grip,
}

/// Tracked hand joints used by gesture recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandJoint {
    Wrist,
    ThumbTip,
    IndexFingerPhalanxProximal,
    IndexFingerTip,
    MiddleFingerTip,
}

impl HandJoint {
    pub const ALL: [HandJoint; 5] = [
        HandJoint::Wrist,
        HandJoint::ThumbTip,
        HandJoint::IndexFingerPhalanxProximal,
        HandJoint::IndexFingerTip,
        HandJoint::MiddleFingerTip,
    ];
}

/// Detects whether the host exposes a spatial API at all.
#[async_trait]
pub trait SpatialEnvironment: Send + Sync {
    /// Whether a spatial-session API exists in this environment
    fn api_available(&self) -> bool;

    /// Whether the given mode can be started
    async fn is_session_supported(&self, mode: SessionMode) -> Result<bool, HostError>;
}

/// Entry point into the host runtime.
#[async_trait]
pub trait XrHost: Send + Sync {
    async fn request_session(
        &self,
        mode: SessionMode,
        init: &SessionInit,
    ) -> Result<Arc<dyn HostSession>, HostError>;
}

/// A negotiated host session.
#[async_trait]
pub trait HostSession: Send + Sync {
    /// Features the host actually granted
    fn enabled_features(&self) -> Vec<Feature>;

    fn environment_blend_mode(&self) -> BlendMode;

    async fn request_reference_space(&self, kind: ReferenceSpaceKind) -> Result<SpaceId, HostError>;

    async fn request_hit_test_source(&self, space: SpaceId) -> Result<HitTestSourceId, HostError>;

    fn cancel_hit_test_source(&self, source: HitTestSourceId);

    async fn create_anchor(&self, pose: Pose, space: SpaceId) -> Result<AnchorHandle, HostError>;

    async fn create_anchor_from_hit(&self, hit: HitTestResult) -> Result<AnchorHandle, HostError>;

    fn delete_anchor(&self, anchor: AnchorHandle) -> Result<(), HostError>;

    /// Register interest in the next frame of this session
    fn request_animation_frame(&self) -> FrameRequestId;

    fn cancel_animation_frame(&self, request: FrameRequestId);

    async fn end(&self) -> Result<(), HostError>;
}

/// Per-frame view of the host's tracking state.
pub trait XrFrame {
    /// Frame timestamp in milliseconds
    fn time(&self) -> f64;

    /// Pose of `space` relative to `base`
    fn pose(&self, space: SpaceId, base: SpaceId) -> Option<Pose>;

    fn hit_test_results(&self, source: HitTestSourceId) -> Vec<HitTestResult>;

    fn hit_pose(&self, hit: HitTestResult, base: SpaceId) -> Option<Pose>;

    /// Current detected-surface set, `None` when the host reports none
    fn detected_planes(&self) -> Option<Vec<HostPlane>>;

    fn anchor_pose(&self, anchor: AnchorHandle, base: SpaceId) -> Option<Pose>;

    fn input_pose(&self, source: InputSourceId, space: InputSpace, base: SpaceId) -> Option<Pose>;

    fn joint_pose(&self, source: InputSourceId, joint: HandJoint, base: SpaceId) -> Option<Pose>;
}
