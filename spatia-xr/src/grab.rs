//! World-pose-preserving attachment of scene objects to a moving holder

use glam::Mat4;

use crate::host::ObjectId;
use crate::scene::{ObjectParent, SceneCollaborator};

/// An object held in a holder's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    pub object: ObjectId,
    /// Object transform relative to the holder at the moment of attach
    pub local: Mat4,
}

impl Attachment {
    /// Capture `object_world` in the frame of `holder_world`.
    pub fn capture(object: ObjectId, holder_world: &Mat4, object_world: &Mat4) -> Self {
        Self {
            object,
            local: holder_world.inverse() * *object_world,
        }
    }

    /// World transform of the object for the holder's current transform.
    pub fn world(&self, holder_world: &Mat4) -> Mat4 {
        *holder_world * self.local
    }
}

/// Reparent `object` under a holder, keeping its world transform.
pub fn attach(
    scene: &mut dyn SceneCollaborator,
    object: ObjectId,
    holder_world: &Mat4,
    parent: ObjectParent,
) -> Option<Attachment> {
    let object_world = scene.world_transform(object)?;
    let attachment = Attachment::capture(object, holder_world, &object_world);
    scene.set_parent(object, parent);
    scene.set_world_transform(object, attachment.world(holder_world));
    Some(attachment)
}

/// Move a held object along with its holder.
pub fn follow(scene: &mut dyn SceneCollaborator, attachment: &Attachment, holder_world: &Mat4) {
    scene.set_world_transform(attachment.object, attachment.world(holder_world));
}

/// Put a held object back under the scene root at its current world pose.
pub fn release(
    scene: &mut dyn SceneCollaborator,
    attachment: &Attachment,
    holder_world: &Mat4,
) -> Mat4 {
    let world = attachment.world(holder_world);
    scene.set_parent(attachment.object, ObjectParent::Root);
    scene.set_world_transform(attachment.object, world);
    world
}
