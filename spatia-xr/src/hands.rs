//! Distance-based hand gesture recognition
//!
//! Gestures are evaluated independently, so a hand may pinch and grab at
//! the same time. Events fire on transitions only.

use glam::{Mat4, Vec3};
use tracing::{debug, trace};

use crate::config::GestureConfig;
use crate::events::{GestureEvent, Subject};
use crate::grab::{self, Attachment};
use crate::host::{
    HandJoint, Handedness, InputSourceId, InputSourceInfo, ObjectId, SpaceId, XrFrame,
};
use crate::scene::{pick_nearest, ObjectParent, SharedScene};

pub const MAX_HANDS: usize = 2;

/// Joint positions needed to classify a hand pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandJoints {
    pub wrist: Vec3,
    pub thumb_tip: Vec3,
    pub index_proximal: Vec3,
    pub index_tip: Vec3,
    pub middle_tip: Vec3,
}

impl HandJoints {
    /// Resolve every joint for `source`, or nothing if any is untracked.
    pub fn from_frame(frame: &dyn XrFrame, source: InputSourceId, base: SpaceId) -> Option<Self> {
        let joint = |joint| frame.joint_pose(source, joint, base).map(|pose| pose.position);
        Some(Self {
            wrist: joint(HandJoint::Wrist)?,
            thumb_tip: joint(HandJoint::ThumbTip)?,
            index_proximal: joint(HandJoint::IndexFingerPhalanxProximal)?,
            index_tip: joint(HandJoint::IndexFingerTip)?,
            middle_tip: joint(HandJoint::MiddleFingerTip)?,
        })
    }

    /// Normalized direction the index finger points along
    pub fn index_direction(&self) -> Vec3 {
        (self.index_tip - self.index_proximal).normalize_or_zero()
    }
}

/// Which gestures a hand is currently making
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GestureFlags {
    pub pinch: bool,
    pub grab: bool,
    pub point: bool,
}

/// Classify one hand pose against the configured thresholds.
pub fn evaluate(joints: &HandJoints, config: &GestureConfig) -> GestureFlags {
    let curl = joints.wrist.distance(joints.middle_tip);
    GestureFlags {
        pinch: joints.thumb_tip.distance(joints.index_tip) < config.pinch_threshold,
        grab: curl < config.grab_threshold,
        point: curl >= config.point_threshold && joints.index_direction() != Vec3::ZERO,
    }
}

#[derive(Debug)]
struct Hand {
    source: InputSourceId,
    flags: GestureFlags,
    /// Wrist transform, the frame held objects hang from
    world: Mat4,
    held: Option<Attachment>,
}

pub struct HandGestureRecognizer {
    config: GestureConfig,
    scene: SharedScene,
    hands: [Option<Hand>; MAX_HANDS],
    events: Subject<GestureEvent>,
}

impl HandGestureRecognizer {
    pub fn new(config: GestureConfig, scene: SharedScene) -> Self {
        Self {
            config,
            scene,
            hands: [None, None],
            events: Subject::new(),
        }
    }

    pub fn events(&self) -> &Subject<GestureEvent> {
        &self.events
    }

    /// Bind a tracked hand: left is index 0, right is index 1. A hand without
    /// handedness takes the lowest free index.
    pub fn bind(&mut self, info: InputSourceInfo) -> Option<usize> {
        if let Some(index) = self.index_of(info.id) {
            return Some(index);
        }
        let index = match info.handedness {
            Handedness::Left => 0,
            Handedness::Right => 1,
            Handedness::None => self.hands.iter().position(Option::is_none)?,
        };
        if self.hands[index].is_some() {
            debug!(hand = index, source = %info.id, "hand slot already bound");
            return None;
        }

        self.hands[index] = Some(Hand {
            source: info.id,
            flags: GestureFlags::default(),
            world: Mat4::IDENTITY,
            held: None,
        });
        debug!(hand = index, source = %info.id, "hand bound");
        Some(index)
    }

    /// Unbind a hand, releasing whatever it holds. Gestures in progress end
    /// silently.
    pub fn unbind(&mut self, source: InputSourceId) -> Option<usize> {
        let index = self.index_of(source)?;
        self.release(index);
        self.hands[index] = None;
        debug!(hand = index, %source, "hand unbound");
        Some(index)
    }

    pub fn index_of(&self, source: InputSourceId) -> Option<usize> {
        self.hands
            .iter()
            .position(|h| h.as_ref().is_some_and(|h| h.source == source))
    }

    /// Read joints for every bound hand and process them.
    pub fn update(&mut self, frame: &dyn XrFrame, reference_space: SpaceId) {
        for index in 0..MAX_HANDS {
            let Some(source) = self.source(index) else {
                continue;
            };
            let Some(joints) = HandJoints::from_frame(frame, source, reference_space) else {
                trace!(hand = index, "hand joints not tracked this frame");
                continue;
            };
            let wrist = frame
                .joint_pose(source, HandJoint::Wrist, reference_space)
                .map(|pose| pose.to_matrix())
                .unwrap_or_else(|| Mat4::from_translation(joints.wrist));
            self.process_joints(index, &joints, wrist);
        }
    }

    /// Evaluate one hand's joints and emit gesture transitions.
    pub fn process_joints(&mut self, index: usize, joints: &HandJoints, wrist: Mat4) {
        let flags = evaluate(joints, &self.config);
        let pick_radius = self.config.pinch_pick_radius;
        let mut pending = Vec::new();

        {
            let Some(hand) = self.hands.get_mut(index).and_then(Option::as_mut) else {
                return;
            };
            let mut scene = self.scene.lock();
            let previous = hand.flags;
            hand.world = wrist;

            if flags.pinch && !previous.pinch {
                let object = pick_nearest(joints.index_tip, &scene.interactables(), pick_radius)
                    .map(|(object, _)| object);
                hand.held = object.and_then(|object| {
                    grab::attach(&mut *scene, object, &wrist, ObjectParent::Hand(index))
                });
                pending.push(GestureEvent::PinchStart {
                    hand: index,
                    object: hand.held.map(|h| h.object),
                });
            } else if !flags.pinch && previous.pinch {
                let object = hand.held.take().map(|held| {
                    grab::release(&mut *scene, &held, &wrist);
                    held.object
                });
                pending.push(GestureEvent::PinchEnd { hand: index, object });
            } else if let Some(held) = &hand.held {
                grab::follow(&mut *scene, held, &wrist);
            }

            if flags.grab != previous.grab {
                pending.push(if flags.grab {
                    GestureEvent::GrabStart { hand: index }
                } else {
                    GestureEvent::GrabEnd { hand: index }
                });
            }

            if flags.point != previous.point {
                pending.push(if flags.point {
                    GestureEvent::PointStart { hand: index, direction: joints.index_direction() }
                } else {
                    GestureEvent::PointEnd { hand: index }
                });
            }

            hand.flags = flags;
        }

        for event in &pending {
            debug!(event = ?event, "gesture");
            self.events.emit(event);
        }
    }

    fn release(&mut self, index: usize) -> Option<ObjectId> {
        let hand = self.hands.get_mut(index)?.as_mut()?;
        let held = hand.held.take()?;
        grab::release(&mut *self.scene.lock(), &held, &hand.world);
        Some(held.object)
    }

    /// Release held objects and unbind both hands.
    pub fn clear(&mut self) {
        for index in 0..MAX_HANDS {
            self.release(index);
        }
        self.hands = [None, None];
    }

    pub fn flags(&self, index: usize) -> Option<GestureFlags> {
        self.slot(index).map(|h| h.flags)
    }

    pub fn held(&self, index: usize) -> Option<ObjectId> {
        self.slot(index)?.held.map(|h| h.object)
    }

    pub fn source(&self, index: usize) -> Option<InputSourceId> {
        self.slot(index).map(|h| h.source)
    }

    pub fn wrist_transform(&self, index: usize) -> Option<Mat4> {
        self.slot(index).map(|h| h.world)
    }

    fn slot(&self, index: usize) -> Option<&Hand> {
        self.hands.get(index)?.as_ref()
    }
}

#[cfg(test)]
#[path = "hands_tests.rs"]
mod tests;
