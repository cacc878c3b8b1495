//! Typed observer registries and the events each component emits
//!
//! Every component owns a [`Subject`] for its own event type. Listeners are
//! invoked outside the registry lock, and a panicking listener is caught and
//! logged at the emission boundary so it cannot break the frame loop or the
//! listeners after it.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use glam::Vec3;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::error;

use crate::host::{
    AnchorHandle, InputSourceId, ObjectId, PlaneHandle, PlaneOrientation, SessionMode, Visibility,
};
use crate::math::Pose;
use crate::session::SessionState;

/// Event types carry a stable wire name used for logging.
pub trait XrEvent: fmt::Debug {
    fn name(&self) -> &'static str;
}

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;
type ListenerList<E> = Mutex<Vec<(u64, Listener<E>)>>;

/// Observer registry for one event type.
pub struct Subject<E> {
    listeners: Arc<ListenerList<E>>,
    next_id: AtomicU64,
}

impl<E: XrEvent + 'static> Subject<E> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener. The returned handle removes it again.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));

        let registry: Weak<ListenerList<E>> = Arc::downgrade(&self.listeners);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(listeners) = registry.upgrade() {
                    listeners.lock().retain(|(existing, _)| *existing != id);
                }
            })),
        }
    }

    /// Deliver an event to every listener registered at call time.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            if outcome.is_err() {
                error!(event = event.name(), "event listener panicked; continuing");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl<E: XrEvent + 'static> Default for Subject<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`Subject::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Session lifecycle events
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SessionStart { mode: SessionMode },
    SessionEnd { mode: SessionMode },
    StatusChange { from: SessionState, to: SessionState },
    HostStatus { visibility: Visibility },
}

impl XrEvent for SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStart { .. } => "sessionstart",
            SessionEvent::SessionEnd { .. } => "sessionend",
            SessionEvent::StatusChange { .. } => "statuschange",
            SessionEvent::HostStatus { .. } => "hoststatus",
        }
    }
}

/// Detected-surface events
#[derive(Debug, Clone, PartialEq)]
pub enum PlaneEvent {
    PlaneAdded { plane: PlaneHandle, orientation: PlaneOrientation },
    PlaneChanged { plane: PlaneHandle },
    PlaneRemoved { plane: PlaneHandle },
}

impl XrEvent for PlaneEvent {
    fn name(&self) -> &'static str {
        match self {
            PlaneEvent::PlaneAdded { .. } => "planeadded",
            PlaneEvent::PlaneChanged { .. } => "planechanged",
            PlaneEvent::PlaneRemoved { .. } => "planeremoved",
        }
    }
}

/// Why an anchor left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorRemoval {
    Explicit,
    TrackingLost,
    SessionEnded,
}

/// Anchor registry events
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorEvent {
    AnchorAdded { anchor: AnchorHandle, pose: Pose, metadata: Value },
    AnchorUpdated { anchor: AnchorHandle, pose: Pose },
    AnchorRemoved { anchor: AnchorHandle, reason: AnchorRemoval },
}

impl XrEvent for AnchorEvent {
    fn name(&self) -> &'static str {
        match self {
            AnchorEvent::AnchorAdded { .. } => "anchoradded",
            AnchorEvent::AnchorUpdated { .. } => "anchorupdated",
            AnchorEvent::AnchorRemoved { .. } => "anchorremoved",
        }
    }
}

/// Hand gesture transitions, edge-triggered per hand index
#[derive(Debug, Clone, PartialEq)]
pub enum GestureEvent {
    PinchStart { hand: usize, object: Option<ObjectId> },
    PinchEnd { hand: usize, object: Option<ObjectId> },
    GrabStart { hand: usize },
    GrabEnd { hand: usize },
    PointStart { hand: usize, direction: Vec3 },
    PointEnd { hand: usize },
}

impl XrEvent for GestureEvent {
    fn name(&self) -> &'static str {
        match self {
            GestureEvent::PinchStart { .. } => "pinchstart",
            GestureEvent::PinchEnd { .. } => "pinchend",
            GestureEvent::GrabStart { .. } => "grabstart",
            GestureEvent::GrabEnd { .. } => "grabend",
            GestureEvent::PointStart { .. } => "pointstart",
            GestureEvent::PointEnd { .. } => "pointend",
        }
    }
}

/// Controller button events, keyed by controller index
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    Select { controller: usize, source: InputSourceId },
    SelectStart { controller: usize, object: Option<ObjectId> },
    SelectEnd { controller: usize, object: Option<ObjectId> },
    Squeeze { controller: usize },
    SqueezeStart { controller: usize, object: Option<ObjectId>, scale: Option<f32> },
    SqueezeEnd { controller: usize },
}

impl XrEvent for ControllerEvent {
    fn name(&self) -> &'static str {
        match self {
            ControllerEvent::Select { .. } => "select",
            ControllerEvent::SelectStart { .. } => "selectstart",
            ControllerEvent::SelectEnd { .. } => "selectend",
            ControllerEvent::Squeeze { .. } => "squeeze",
            ControllerEvent::SqueezeStart { .. } => "squeezestart",
            ControllerEvent::SqueezeEnd { .. } => "squeezeend",
        }
    }
}
