//! Composition root wiring the per-session components together
//!
//! The manager owns one instance of every frame-driven component. Attaching
//! a session binds them and registers a frame callback with the session;
//! detaching tears them down in reverse: frame callback, hit testing, input,
//! then visuals.

use std::collections::{BTreeMap, HashMap};

use glam::Mat4;
use tracing::{debug, info, trace, warn};

use crate::anchors::{AnchorOptions, AnchorRegistry};
use crate::config::XrConfig;
use crate::controllers::ControllerInputRouter;
use crate::error::{Result, XrError};
use crate::hands::HandGestureRecognizer;
use crate::hit_test::HitTestPlacementEngine;
use crate::host::{
    AnchorHandle, FrameRequestId, InputSourceId, InputSourceInfo, InputSourceKind, InputSpace,
    ObjectId, XrFrame,
};
use crate::math::{Pose, Ray};
use crate::planes::PlaneDetectionTracker;
use crate::scene::{pick_along_ray, SharedScene};
use crate::session::XrSession;

/// Input action reported by the host for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEventKind {
    Select,
    SelectStart,
    SelectEnd,
    Squeeze,
    SqueezeStart,
    SqueezeEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub source: InputSourceId,
    pub kind: InputEventKind,
}

impl InputEvent {
    pub fn new(source: InputSourceId, kind: InputEventKind) -> Self {
        Self { source, kind }
    }
}

/// Where a select in AR mode put things
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub pose: Pose,
    pub anchor: Option<AnchorHandle>,
}

pub struct InteractionManager {
    config: XrConfig,
    scene: SharedScene,
    session: Option<XrSession>,
    frame_request: Option<FrameRequestId>,
    hit_test: HitTestPlacementEngine,
    planes: PlaneDetectionTracker,
    anchors: AnchorRegistry,
    controllers: ControllerInputRouter,
    hands: HandGestureRecognizer,
    input_sources: BTreeMap<InputSourceId, InputSourceInfo>,
    /// Latest target-ray transform per input source
    target_rays: HashMap<InputSourceId, Mat4>,
    frames: u64,
}

impl InteractionManager {
    pub fn new(config: XrConfig, scene: SharedScene) -> Self {
        Self {
            hit_test: HitTestPlacementEngine::new(config.visuals.clone()),
            planes: PlaneDetectionTracker::new(&config.visuals),
            anchors: AnchorRegistry::new(config.visuals.clone(), scene.clone()),
            controllers: ControllerInputRouter::new(config.controllers.clone(), scene.clone()),
            hands: HandGestureRecognizer::new(config.gestures.clone(), scene.clone()),
            config,
            scene,
            session: None,
            frame_request: None,
            input_sources: BTreeMap::new(),
            target_rays: HashMap::new(),
            frames: 0,
        }
    }

    /// Bind every component to `session` and start its frame callback.
    ///
    /// Hit testing is only set up for AR sessions. If it cannot be set up the
    /// session carries on without placement anchors, and the scene is told
    /// so.
    pub async fn attach_session(&mut self, session: &XrSession) {
        if self.session.is_some() {
            self.detach_session();
        }

        info!(session = session.id(), mode = %session.mode(), "attaching interaction to session");
        self.session = Some(session.clone());
        self.anchors.attach_session(session);

        if session.mode().is_ar() {
            let hit_test_ok = match self.hit_test.attach(session).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "placement disabled");
                    false
                }
            };
            let anchors = hit_test_ok && session.capabilities().anchors;
            self.scene.lock().set_anchor_support(anchors);
            debug!(anchors, "anchor-backed placement availability");
        }

        self.frame_request = Some(session.host().request_animation_frame());
    }

    /// Undo [`attach_session`](Self::attach_session). Safe to call when
    /// nothing is attached.
    pub fn detach_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Some(request) = self.frame_request.take() {
            session.host().cancel_animation_frame(request);
        }
        self.hit_test.detach();
        self.controllers.clear();
        self.hands.clear();
        self.input_sources.clear();
        self.target_rays.clear();
        self.planes.clear();
        self.anchors.detach_session();
        info!(session = session.id(), frames = self.frames, "interaction detached from session");
        self.frames = 0;
    }

    /// The attached session, detaching first if the coordinator has ended
    /// it since (including an end initiated by the host).
    fn live_session(&mut self) -> Option<XrSession> {
        let session = self.session.clone()?;
        if session.is_ended() {
            debug!(session = session.id(), "attached session has ended");
            self.detach_session();
            return None;
        }
        Some(session)
    }

    /// Run one frame callback. Returns false, doing nothing, for a request
    /// that is not the one currently scheduled. A session that has ended is
    /// detached instead.
    pub fn on_frame(&mut self, request: FrameRequestId, frame: &dyn XrFrame) -> bool {
        let Some(session) = self.live_session() else {
            return false;
        };
        if self.frame_request != Some(request) {
            trace!(%request, "ignoring stale frame callback");
            return false;
        }
        self.frame_request = None;

        let reference_space = session.reference_space();
        let capabilities = session.capabilities();

        if capabilities.plane_detection {
            self.planes.update(frame, reference_space);
        }
        if self.hit_test.is_active() {
            self.hit_test.update(frame);
        }
        self.anchors.update(frame);
        self.controllers.update(frame, reference_space);
        self.hands.update(frame, reference_space);

        for id in self.input_sources.keys() {
            match frame.input_pose(*id, InputSpace::TargetRay, reference_space) {
                Some(pose) => {
                    self.target_rays.insert(*id, pose.to_matrix());
                }
                None => {
                    self.target_rays.remove(id);
                }
            }
        }

        self.frames += 1;
        self.frame_request = Some(session.host().request_animation_frame());
        true
    }

    /// Apply a change in connected input sources.
    pub fn input_sources_changed(&mut self, added: &[InputSourceInfo], removed: &[InputSourceId]) {
        for id in removed {
            if self.input_sources.remove(id).is_some() {
                self.controllers.unbind(*id);
                self.hands.unbind(*id);
                self.target_rays.remove(id);
            }
        }

        for info in added {
            let slot = match info.kind {
                InputSourceKind::Controller => self.controllers.bind(*info),
                InputSourceKind::Hand => self.hands.bind(*info),
            };
            if slot.is_none() {
                debug!(source = %info.id, kind = ?info.kind, "no free slot for input source");
            }
            self.input_sources.insert(info.id, *info);
        }
    }

    /// Dispatch a host input event.
    ///
    /// A select places content at the hit cursor in AR mode and picks an
    /// object for selection otherwise.
    pub async fn handle_input(&mut self, event: InputEvent) -> Result<()> {
        let session = self.live_session().ok_or(XrError::NoActiveSession)?;
        let source = event.source;

        match event.kind {
            InputEventKind::Select => {
                self.controllers.select(source);
                if session.mode().is_ar() {
                    self.place_at_hit().await;
                } else {
                    self.pick_for_selection(source);
                }
            }
            InputEventKind::SelectStart => {
                self.controllers.select_start(source);
            }
            InputEventKind::SelectEnd => {
                self.controllers.select_end(source);
            }
            InputEventKind::Squeeze => {
                self.controllers.squeeze(source);
            }
            InputEventKind::SqueezeStart => {
                self.controllers.squeeze_start(source);
            }
            InputEventKind::SqueezeEnd => {
                self.controllers.squeeze_end(source);
            }
        }
        Ok(())
    }

    /// Place at the current hit, or the last known one, anchoring it when
    /// the session supports anchors.
    pub async fn place_at_hit(&mut self) -> Option<Placement> {
        let session = self.live_session()?;
        let Some(pose) = self.hit_test.last_hit_pose() else {
            debug!("select without a placement pose");
            return None;
        };
        let anchors_supported = session.capabilities().anchors;

        let anchor = if anchors_supported {
            let created = match self.hit_test.current_hit() {
                Some(hit) => {
                    self.anchors
                        .create_anchor_from_hit(hit, pose, AnchorOptions::default())
                        .await
                }
                None => self.anchors.create_anchor(pose, AnchorOptions::default()).await,
            };
            match created {
                Ok(anchor) => Some(anchor),
                Err(e) => {
                    warn!(error = %e, "placing without an anchor");
                    None
                }
            }
        } else {
            None
        };

        self.scene.lock().register_placement(pose, anchor);
        Some(Placement { pose, anchor })
    }

    /// Ray-pick from the source's target ray and make the hit the scene's
    /// selection. A miss leaves the selection as it was.
    pub fn pick_for_selection(&mut self, source: InputSourceId) -> Option<ObjectId> {
        let Some(world) = self.target_rays.get(&source) else {
            debug!(%source, "no tracked target ray for select");
            return None;
        };
        let ray = Ray::from_transform(world);

        let mut scene = self.scene.lock();
        let (object, distance) = pick_along_ray(
            &ray,
            &scene.interactables(),
            self.config.controllers.ray_length,
        )?;
        scene.set_selected(Some(object));
        debug!(%source, %object, distance, "object selected");
        Some(object)
    }

    pub fn session(&self) -> Option<&XrSession> {
        self.session.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Frame request currently scheduled with the host
    pub fn pending_frame(&self) -> Option<FrameRequestId> {
        self.frame_request
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn config(&self) -> &XrConfig {
        &self.config
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }

    pub fn hit_test(&self) -> &HitTestPlacementEngine {
        &self.hit_test
    }

    pub fn planes(&self) -> &PlaneDetectionTracker {
        &self.planes
    }

    pub fn anchors(&self) -> &AnchorRegistry {
        &self.anchors
    }

    pub fn anchors_mut(&mut self) -> &mut AnchorRegistry {
        &mut self.anchors
    }

    pub fn controllers(&self) -> &ControllerInputRouter {
        &self.controllers
    }

    pub fn hands(&self) -> &HandGestureRecognizer {
        &self.hands
    }

    pub fn input_sources(&self) -> impl Iterator<Item = &InputSourceInfo> {
        self.input_sources.values()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
