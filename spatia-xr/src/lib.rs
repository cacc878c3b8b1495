//! Spatia XR - spatial session and interaction coordinator
//!
//! Negotiates immersive VR/AR sessions with a host spatial-computing API and
//! drives the per-frame interaction layer on top of them:
//!
//! - [`SessionCoordinator`] owns the session lifecycle (single-flight
//!   negotiation, idempotent teardown).
//! - [`InteractionManager`] binds hit-test placement, plane mirroring,
//!   anchors, controller input and hand gestures to a session and runs them
//!   from the session's own frame callback.
//!
//! The host API and the scene that owns interactable objects are both
//! abstracted behind traits ([`host`] and [`scene`]). The [`sim`] module
//! provides in-process implementations of both.

pub mod anchors;
pub mod capabilities;
pub mod config;
pub mod controllers;
pub mod error;
pub mod events;
pub mod grab;
pub mod hands;
pub mod host;
pub mod manager;
pub mod math;
pub mod mesh;
pub mod planes;
pub mod scene;
pub mod session;
pub mod sim;

pub use anchors::{AnchorOptions, AnchorRegistry, TrackedAnchor};
pub use capabilities::{Capabilities, SessionCapabilities, SpatialEnvironmentDetector};
pub use config::XrConfig;
pub use controllers::ControllerInputRouter;
pub use error::{HostError, Result, XrError};
pub use events::{
    AnchorEvent, AnchorRemoval, ControllerEvent, GestureEvent, PlaneEvent, SessionEvent, Subject,
    Subscription, XrEvent,
};
pub use hands::{GestureFlags, HandGestureRecognizer};
pub use hit_test::HitTestPlacementEngine;
pub use host::{SessionMode, XrFrame, XrHost};
pub use manager::{InputEvent, InputEventKind, InteractionManager, Placement};
pub use math::{Pose, Ray};
pub use planes::{PlaneDetectionTracker, TrackedPlane};
pub use scene::{SceneCollaborator, SharedScene};
pub use session::{FeatureOverrides, SessionCoordinator, SessionState, XrSession};
