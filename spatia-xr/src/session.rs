//! Session lifecycle: negotiation, single-flight guarding and teardown
//!
//! The coordinator owns the only mutable view of the session state machine:
//!
//! ```text
//! Idle ──request──▶ Initializing ──granted──▶ Active ──end──▶ Ending ──▶ Idle
//!                        │  └──rejected──▶ Idle
//!                        └──end──▶ Ending ──▶ Idle
//! ```
//!
//! Concurrent requests for a mode that is already being negotiated share the
//! same in-flight future instead of starting a second negotiation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::capabilities::{Capabilities, SessionCapabilities, SpatialEnvironmentDetector};
use crate::config::SessionConfig;
use crate::error::{Result, XrError};
use crate::events::{SessionEvent, Subject};
use crate::host::{
    BlendMode, Feature, HostSession, ReferenceSpaceKind, SessionInit, SessionMode, SpaceId,
    Visibility, XrHost,
};

/// Lifecycle state of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Active,
    Ending,
}

/// Extra features a caller wants on top of the per-mode defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureOverrides {
    pub required: Vec<Feature>,
    pub optional: Vec<Feature>,
}

/// Hooks the renderer into an active session.
pub trait RendererBinding: Send + Sync {
    fn bind_session(&self, session: &XrSession);
    fn unbind_session(&self);
}

struct SessionInner {
    id: u64,
    mode: SessionMode,
    features: Vec<Feature>,
    blend_mode: BlendMode,
    host: Arc<dyn HostSession>,
    reference_space: SpaceId,
    viewer_space: SpaceId,
    ended: AtomicBool,
}

/// Handle to an active session. Cheap to clone; read-only to everyone but
/// the coordinator.
#[derive(Clone)]
pub struct XrSession {
    inner: Arc<SessionInner>,
}

impl XrSession {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn mode(&self) -> SessionMode {
        self.inner.mode
    }

    pub fn features(&self) -> &[Feature] {
        &self.inner.features
    }

    pub fn capabilities(&self) -> SessionCapabilities {
        SessionCapabilities::from_features(&self.inner.features)
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.inner.blend_mode
    }

    pub fn reference_space(&self) -> SpaceId {
        self.inner.reference_space
    }

    pub fn viewer_space(&self) -> SpaceId {
        self.inner.viewer_space
    }

    pub fn host(&self) -> &Arc<dyn HostSession> {
        &self.inner.host
    }

    /// Whether the coordinator has torn this session down. Set before
    /// `sessionend` is emitted; never cleared.
    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    pub fn same_as(&self, other: &XrSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for XrSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrSession")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("features", &self.inner.features)
            .field("blend_mode", &self.inner.blend_mode)
            .finish()
    }
}

type PendingSession = Shared<BoxFuture<'static, Result<XrSession>>>;
type PendingEnd = Shared<BoxFuture<'static, ()>>;

enum Phase {
    Idle,
    Initializing { mode: SessionMode, pending: PendingSession },
    Active(XrSession),
    Ending(PendingEnd),
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Initializing { .. } => SessionState::Initializing,
            Phase::Active(_) => SessionState::Active,
            Phase::Ending(_) => SessionState::Ending,
        }
    }
}

struct CoordinatorState {
    phase: Phase,
    /// Bumped whenever an in-flight negotiation is abandoned
    generation: u64,
    next_session_id: u64,
}

enum Settled {
    Activated(XrSession),
    Failed(XrError),
    Abandoned(Result<Established>),
}

struct CoordinatorCore {
    state: Mutex<CoordinatorState>,
    events: Subject<SessionEvent>,
    renderer: Option<Arc<dyn RendererBinding>>,
}

impl CoordinatorCore {
    fn transition(&self, from: SessionState, to: SessionState) {
        debug!(?from, ?to, "session state change");
        self.events.emit(&SessionEvent::StatusChange { from, to });
    }

    fn settle(&self, generation: u64, mode: SessionMode, outcome: Result<Established>) -> Settled {
        let mut st = self.state.lock();
        if st.generation != generation {
            return Settled::Abandoned(outcome);
        }

        match outcome {
            Ok(established) => {
                let session = XrSession {
                    inner: Arc::new(SessionInner {
                        id: st.next_session_id,
                        mode,
                        features: established.host.enabled_features(),
                        blend_mode: established.host.environment_blend_mode(),
                        host: established.host,
                        reference_space: established.reference_space,
                        viewer_space: established.viewer_space,
                        ended: AtomicBool::new(false),
                    }),
                };
                st.next_session_id += 1;
                st.phase = Phase::Active(session.clone());
                Settled::Activated(session)
            }
            Err(e) => {
                st.phase = Phase::Idle;
                Settled::Failed(e)
            }
        }
    }

    async fn finish_negotiation(
        &self,
        generation: u64,
        mode: SessionMode,
        outcome: Result<Established>,
    ) -> Result<XrSession> {
        match self.settle(generation, mode, outcome) {
            Settled::Activated(session) => {
                info!(%mode, id = session.id(), features = ?session.features(), "session active");
                if let Some(renderer) = &self.renderer {
                    renderer.bind_session(&session);
                }
                self.transition(SessionState::Initializing, SessionState::Active);
                self.events.emit(&SessionEvent::SessionStart { mode });
                Ok(session)
            }
            Settled::Failed(e) => {
                warn!(%mode, error = %e, "session negotiation failed");
                self.transition(SessionState::Initializing, SessionState::Idle);
                Err(e)
            }
            Settled::Abandoned(outcome) => {
                if let Ok(established) = outcome {
                    if let Err(e) = established.host.end().await {
                        warn!(%mode, error = %e, "failed to end abandoned host session");
                    }
                }
                Err(XrError::SessionCancelled)
            }
        }
    }

    fn finish_end(&self, session: &XrSession) {
        let mode = session.mode();
        session.inner.ended.store(true, Ordering::Release);
        self.state.lock().phase = Phase::Idle;
        if let Some(renderer) = &self.renderer {
            renderer.unbind_session();
        }
        info!(%mode, "session ended");
        self.transition(SessionState::Ending, SessionState::Idle);
        self.events.emit(&SessionEvent::SessionEnd { mode });
    }
}

struct Established {
    host: Arc<dyn HostSession>,
    reference_space: SpaceId,
    viewer_space: SpaceId,
}

/// Owns the session lifecycle against a host runtime.
pub struct SessionCoordinator {
    host: Arc<dyn XrHost>,
    detector: SpatialEnvironmentDetector,
    config: SessionConfig,
    core: Arc<CoordinatorCore>,
}

enum Step {
    Done(XrSession),
    Await(SessionMode, PendingSession),
    AwaitEnd(PendingEnd),
    EndFirst,
}

impl SessionCoordinator {
    pub fn new(
        host: Arc<dyn XrHost>,
        detector: SpatialEnvironmentDetector,
        config: SessionConfig,
    ) -> Self {
        Self {
            host,
            detector,
            config,
            core: Arc::new(CoordinatorCore {
                state: Mutex::new(CoordinatorState {
                    phase: Phase::Idle,
                    generation: 0,
                    next_session_id: 1,
                }),
                events: Subject::new(),
                renderer: None,
            }),
        }
    }

    /// Attach a renderer that is bound on activation and unbound on teardown.
    ///
    /// Must be called before the first session request.
    pub fn with_renderer(mut self, renderer: Arc<dyn RendererBinding>) -> Self {
        if let Some(core) = Arc::get_mut(&mut self.core) {
            core.renderer = Some(renderer);
        } else {
            warn!("renderer binding ignored: coordinator already shared");
        }
        self
    }

    pub fn state(&self) -> SessionState {
        self.core.state.lock().phase.state()
    }

    pub fn active_session(&self) -> Option<XrSession> {
        match &self.core.state.lock().phase {
            Phase::Active(session) => Some(session.clone()),
            _ => None,
        }
    }

    pub fn events(&self) -> &Subject<SessionEvent> {
        &self.core.events
    }

    /// Per-mode support of the environment. Never fails.
    pub async fn detect_capabilities(&self) -> Capabilities {
        self.detector.detect().await
    }

    /// Start (or join) a session in `mode`.
    ///
    /// An active session of the same mode is returned unchanged. An active
    /// session of another mode is ended first.
    pub async fn request_session(
        &self,
        mode: SessionMode,
        overrides: FeatureOverrides,
    ) -> Result<XrSession> {
        let capabilities = self.detector.detect().await;
        if !capabilities.api_available {
            return Err(XrError::Capability(
                "no spatial session API in this environment".to_string(),
            ));
        }
        if !capabilities.supports(mode) {
            return Err(XrError::UnsupportedMode(mode));
        }

        loop {
            let (step, started) = self.next_step(mode, &overrides);
            if started {
                self.core.transition(SessionState::Idle, SessionState::Initializing);
            }

            match step {
                Step::Done(session) => return Ok(session),
                Step::Await(pending_mode, pending) => {
                    let result = pending.await;
                    if pending_mode == mode {
                        return result;
                    }
                }
                Step::AwaitEnd(ending) => ending.await,
                Step::EndFirst => self.end_session().await,
            }
        }
    }

    fn next_step(&self, mode: SessionMode, overrides: &FeatureOverrides) -> (Step, bool) {
        let mut st = self.core.state.lock();
        match &st.phase {
            Phase::Active(active) if active.mode() == mode => {
                debug!(%mode, "session already active");
                (Step::Done(active.clone()), false)
            }
            Phase::Active(_) => (Step::EndFirst, false),
            Phase::Initializing { mode: pending_mode, pending } => {
                (Step::Await(*pending_mode, pending.clone()), false)
            }
            Phase::Ending(ending) => (Step::AwaitEnd(ending.clone()), false),
            Phase::Idle => {
                let init = build_session_init(mode, overrides, &self.config);
                info!(
                    %mode,
                    required = ?init.required_features,
                    optional = ?init.optional_features,
                    "requesting session"
                );

                let generation = st.generation;
                let core = Arc::clone(&self.core);
                let host = Arc::clone(&self.host);
                let fallback = self.config.reference_space_fallback;
                let pending = async move {
                    let outcome = establish(host, mode, init, fallback).await;
                    core.finish_negotiation(generation, mode, outcome).await
                }
                .boxed()
                .shared();

                st.phase = Phase::Initializing { mode, pending: pending.clone() };
                (Step::Await(mode, pending), true)
            }
        }
    }

    /// End the current session. Idempotent; host failures are logged and
    /// local state is reset regardless.
    pub async fn end_session(&self) {
        let ending = {
            let mut st = self.core.state.lock();
            match std::mem::replace(&mut st.phase, Phase::Idle) {
                Phase::Idle => None,
                Phase::Ending(ending) => {
                    st.phase = Phase::Ending(ending.clone());
                    Some(ending)
                }
                Phase::Initializing { mode, .. } => {
                    st.generation += 1;
                    drop(st);
                    info!(%mode, "session request abandoned while negotiating");
                    self.core.transition(SessionState::Initializing, SessionState::Ending);
                    self.core.transition(SessionState::Ending, SessionState::Idle);
                    return;
                }
                Phase::Active(session) => {
                    let core = Arc::clone(&self.core);
                    let ending = async move {
                        if let Err(e) = session.host().end().await {
                            warn!(error = %e, "host failed to end session; resetting local state");
                        }
                        core.finish_end(&session);
                    }
                    .boxed()
                    .shared();
                    st.phase = Phase::Ending(ending.clone());
                    drop(st);
                    self.core.transition(SessionState::Active, SessionState::Ending);
                    Some(ending)
                }
            }
        };

        if let Some(ending) = ending {
            ending.await;
        }
    }

    /// The host ended the session on its own (e.g. the user left immersive
    /// mode). Resets local state without calling back into the host.
    pub fn notify_host_ended(&self) {
        let session = {
            let mut st = self.core.state.lock();
            match std::mem::replace(&mut st.phase, Phase::Idle) {
                Phase::Active(session) => session,
                other => {
                    st.phase = other;
                    return;
                }
            }
        };

        info!(id = session.id(), "host ended session");
        self.core.transition(SessionState::Active, SessionState::Ending);
        self.core.finish_end(&session);
    }

    /// Forward a host visibility change as a `hoststatus` event.
    pub fn notify_visibility(&self, visibility: Visibility) {
        if self.state() == SessionState::Active {
            debug!(?visibility, "host visibility changed");
            self.core.events.emit(&SessionEvent::HostStatus { visibility });
        }
    }
}

async fn establish(
    host: Arc<dyn XrHost>,
    mode: SessionMode,
    init: SessionInit,
    fallback: bool,
) -> Result<Established> {
    let session = host
        .request_session(mode, &init)
        .await
        .map_err(|e| XrError::SessionRequest(e.to_string()))?;

    match request_spaces(session.as_ref(), mode, fallback).await {
        Ok((reference_space, viewer_space)) => Ok(Established {
            host: session,
            reference_space,
            viewer_space,
        }),
        Err(e) => {
            if let Err(end_err) = session.end().await {
                warn!(error = %end_err, "failed to end partially negotiated session");
            }
            Err(e)
        }
    }
}

async fn request_spaces(
    session: &dyn HostSession,
    mode: SessionMode,
    fallback: bool,
) -> Result<(SpaceId, SpaceId)> {
    let reference_space = match mode {
        SessionMode::ImmersiveAr => {
            session
                .request_reference_space(ReferenceSpaceKind::Local)
                .await
        }
        SessionMode::ImmersiveVr => {
            match session
                .request_reference_space(ReferenceSpaceKind::LocalFloor)
                .await
            {
                Err(e) if fallback => {
                    debug!(error = %e, "local-floor refused, falling back to local");
                    session
                        .request_reference_space(ReferenceSpaceKind::Local)
                        .await
                }
                other => other,
            }
        }
    }
    .map_err(|e| XrError::SessionRequest(format!("reference space: {e}")))?;

    let viewer_space = session
        .request_reference_space(ReferenceSpaceKind::Viewer)
        .await
        .map_err(|e| XrError::SessionRequest(format!("viewer space: {e}")))?;

    Ok((reference_space, viewer_space))
}

/// Required and optional features for a mode, with caller overrides unioned
/// in and duplicates removed.
pub fn build_session_init(
    mode: SessionMode,
    overrides: &FeatureOverrides,
    config: &SessionConfig,
) -> SessionInit {
    let (mut required, mut optional) = match mode {
        SessionMode::ImmersiveVr => (
            vec![Feature::Local],
            vec![Feature::LocalFloor, Feature::BoundedFloor, Feature::HandTracking],
        ),
        SessionMode::ImmersiveAr => (
            vec![Feature::Local],
            vec![
                Feature::HitTest,
                Feature::PlaneDetection,
                Feature::Anchors,
                Feature::HandTracking,
                Feature::DomOverlay,
            ],
        ),
    };

    required.extend(overrides.required.iter().copied());
    optional.extend(overrides.optional.iter().copied());

    dedup_in_order(&mut required);
    dedup_in_order(&mut optional);
    optional.retain(|f| !required.contains(f));

    SessionInit {
        required_features: required,
        optional_features: optional,
        overlay_root: mode.is_ar().then(|| config.overlay_root.clone()),
    }
}

fn dedup_in_order(features: &mut Vec<Feature>) {
    let mut seen = Vec::with_capacity(features.len());
    features.retain(|f| {
        if seen.contains(f) {
            false
        } else {
            seen.push(*f);
            true
        }
    });
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
