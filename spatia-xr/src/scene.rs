//! The scene collaborator: owner of every interactable object

use std::sync::Arc;

use glam::{Mat4, Vec3};
use parking_lot::Mutex;

use crate::host::{AnchorHandle, ObjectId};
use crate::math::{Pose, Ray};

/// Candidate object for ray and proximity picking, with a world-space
/// bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interactable {
    pub id: ObjectId,
    pub center: Vec3,
    pub radius: f32,
}

/// Where an object currently hangs in the scene graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectParent {
    Root,
    Controller(usize),
    Hand(usize),
    Anchor(AnchorHandle),
}

/// Reason tag passed along with a modification notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationReason {
    Moved,
    Scaled,
    Anchored,
}

impl ModificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModificationReason::Moved => "moved",
            ModificationReason::Scaled => "scaled",
            ModificationReason::Anchored => "anchored",
        }
    }
}

/// Interface the surrounding application implements for the core.
///
/// The core only ever holds [`ObjectId`]s into this collaborator; it never
/// owns scene objects.
pub trait SceneCollaborator: Send {
    /// Current candidate set for picking
    fn interactables(&self) -> Vec<Interactable>;

    fn world_transform(&self, id: ObjectId) -> Option<Mat4>;

    fn set_world_transform(&mut self, id: ObjectId, transform: Mat4);

    fn set_parent(&mut self, id: ObjectId, parent: ObjectParent);

    fn mark_modified(&mut self, id: ObjectId, reason: ModificationReason);

    fn set_anchor_support(&mut self, available: bool);

    /// A placement was resolved, optionally backed by a host anchor
    fn register_placement(&mut self, pose: Pose, anchor: Option<AnchorHandle>);

    /// Object currently selected through the wider interaction surface
    fn selected(&self) -> Option<ObjectId>;

    fn set_selected(&mut self, id: Option<ObjectId>);
}

pub type SharedScene = Arc<Mutex<dyn SceneCollaborator>>;

/// Nearest candidate hit by `ray` within `max_distance`.
pub fn pick_along_ray(
    ray: &Ray,
    candidates: &[Interactable],
    max_distance: f32,
) -> Option<(ObjectId, f32)> {
    candidates
        .iter()
        .filter_map(|c| ray.intersect_sphere(c.center, c.radius).map(|t| (c.id, t)))
        .filter(|(_, t)| *t <= max_distance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Nearest candidate whose center lies within `radius` of `point`.
pub fn pick_nearest(
    point: Vec3,
    candidates: &[Interactable],
    radius: f32,
) -> Option<(ObjectId, f32)> {
    candidates
        .iter()
        .map(|c| (c.id, c.center.distance(point)))
        .filter(|(_, d)| *d <= radius)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
