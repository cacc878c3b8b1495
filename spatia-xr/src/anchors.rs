//! Host-tracked anchors with markers and attached objects
//!
//! The registry owns every anchor marker. Each frame the anchor pose is
//! re-resolved and copied onto the attached object, if any. Anchors the host
//! stops tracking are dropped rather than left stale.

use std::collections::BTreeMap;

use glam::{Mat4, Vec3};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::VisualConfig;
use crate::error::{Result, XrError};
use crate::events::{AnchorEvent, AnchorRemoval, Subject};
use crate::host::{AnchorHandle, Feature, HitTestResult, ObjectId, XrFrame};
use crate::math::{uniform_scale, with_scale, Pose};
use crate::mesh::{Mesh3D, Visual};
use crate::scene::{ModificationReason, ObjectParent, SharedScene};
use crate::session::XrSession;

/// Extra data attached to a new anchor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorOptions {
    /// Scene object that should follow the anchor
    pub object: Option<ObjectId>,
    /// Caller metadata, carried on the `anchoradded` event
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedAnchor {
    pub handle: AnchorHandle,
    pub pose: Pose,
    pub object: Option<ObjectId>,
    pub metadata: Value,
    pub marker: Visual,
}

pub struct AnchorRegistry {
    visuals: VisualConfig,
    scene: SharedScene,
    session: Option<XrSession>,
    anchors: BTreeMap<AnchorHandle, TrackedAnchor>,
    events: Subject<AnchorEvent>,
}

impl AnchorRegistry {
    pub fn new(visuals: VisualConfig, scene: SharedScene) -> Self {
        Self {
            visuals,
            scene,
            session: None,
            anchors: BTreeMap::new(),
            events: Subject::new(),
        }
    }

    pub fn events(&self) -> &Subject<AnchorEvent> {
        &self.events
    }

    pub fn attach_session(&mut self, session: &XrSession) {
        self.session = Some(session.clone());
    }

    /// Forget the session and every anchor created in it. The host drops its
    /// anchors with the session, so no deletion requests are sent.
    pub fn detach_session(&mut self) {
        let removed = std::mem::take(&mut self.anchors);
        for anchor in removed.into_values() {
            self.dispose(&anchor, AnchorRemoval::SessionEnded);
        }
        self.session = None;
    }

    /// Anchor a free pose in the reference space.
    pub async fn create_anchor(
        &mut self,
        pose: Pose,
        options: AnchorOptions,
    ) -> Result<AnchorHandle> {
        let session = self.anchor_session()?;
        let handle = session
            .host()
            .create_anchor(pose, session.reference_space())
            .await?;
        Ok(self.track(handle, pose, options))
    }

    /// Anchor the surface behind a hit-test result. `pose` is the hit's
    /// resolved pose, used until the host reports the anchor's own.
    pub async fn create_anchor_from_hit(
        &mut self,
        hit: HitTestResult,
        pose: Pose,
        options: AnchorOptions,
    ) -> Result<AnchorHandle> {
        let session = self.anchor_session()?;
        let handle = session.host().create_anchor_from_hit(hit).await?;
        Ok(self.track(handle, pose, options))
    }

    fn anchor_session(&self) -> Result<XrSession> {
        let session = self.session.clone().ok_or(XrError::NoActiveSession)?;
        if !session.capabilities().anchors {
            return Err(XrError::FeatureUnavailable(Feature::Anchors));
        }
        Ok(session)
    }

    fn track(&mut self, handle: AnchorHandle, pose: Pose, options: AnchorOptions) -> AnchorHandle {
        let mut marker = Visual::new(
            Mesh3D::create_sphere(self.visuals.anchor_marker_radius, 16, 8),
            self.visuals.anchor_marker_color,
        );
        marker.transform = pose.to_matrix();

        if let Some(object) = options.object {
            self.place_object(object, handle, &pose);
        }

        self.anchors.insert(
            handle,
            TrackedAnchor {
                handle,
                pose,
                object: options.object,
                metadata: options.metadata.clone(),
                marker,
            },
        );
        info!(anchor = %handle, "anchor created");
        self.events.emit(&AnchorEvent::AnchorAdded {
            anchor: handle,
            pose,
            metadata: options.metadata,
        });
        handle
    }

    fn place_object(&self, object: ObjectId, handle: AnchorHandle, pose: &Pose) {
        let mut scene = self.scene.lock();
        scene.set_parent(object, ObjectParent::Anchor(handle));
        if let Some(current) = scene.world_transform(object) {
            scene.set_world_transform(object, anchored_transform(&current, pose));
        }
        scene.mark_modified(object, ModificationReason::Anchored);
    }

    /// Re-resolve every anchor for this frame.
    pub fn update(&mut self, frame: &dyn XrFrame) {
        let Some(reference_space) = self.session.as_ref().map(|s| s.reference_space()) else {
            return;
        };

        let mut updated = Vec::new();
        let mut lost = Vec::new();
        {
            let mut scene = self.scene.lock();
            for anchor in self.anchors.values_mut() {
                let Some(pose) = frame.anchor_pose(anchor.handle, reference_space) else {
                    lost.push(anchor.handle);
                    continue;
                };

                anchor.marker.transform = pose.to_matrix();
                if let Some(object) = anchor.object {
                    if let Some(current) = scene.world_transform(object) {
                        scene.set_world_transform(object, anchored_transform(&current, &pose));
                    }
                }
                if pose != anchor.pose {
                    anchor.pose = pose;
                    updated.push(AnchorEvent::AnchorUpdated {
                        anchor: anchor.handle,
                        pose,
                    });
                }
            }
        }

        for event in &updated {
            self.events.emit(event);
        }
        for handle in lost {
            if let Some(anchor) = self.anchors.remove(&handle) {
                warn!(anchor = %handle, "anchor pose unresolved, dropping anchor");
                self.dispose(&anchor, AnchorRemoval::TrackingLost);
            }
        }
    }

    /// Make `object` follow an existing anchor. Returns false for unknown
    /// anchors.
    pub fn attach_object_to_anchor(&mut self, handle: AnchorHandle, object: ObjectId) -> bool {
        let Some(pose) = self.anchors.get(&handle).map(|a| a.pose) else {
            return false;
        };
        self.detach_object_from_anchor(handle);
        self.place_object(object, handle, &pose);
        if let Some(anchor) = self.anchors.get_mut(&handle) {
            anchor.object = Some(object);
        }
        true
    }

    /// Let go of the anchor's object, leaving it at its current world pose.
    pub fn detach_object_from_anchor(&mut self, handle: AnchorHandle) -> Option<ObjectId> {
        let object = self.anchors.get_mut(&handle)?.object.take()?;
        self.scene.lock().set_parent(object, ObjectParent::Root);
        Some(object)
    }

    /// Remove an anchor locally and ask the host to delete it. Local state is
    /// removed even if the host refuses.
    pub fn remove_anchor(&mut self, handle: AnchorHandle) -> bool {
        let Some(anchor) = self.anchors.remove(&handle) else {
            return false;
        };
        if let Some(session) = &self.session {
            if let Err(e) = session.host().delete_anchor(handle) {
                warn!(anchor = %handle, error = %e, "host failed to delete anchor");
            }
        }
        self.dispose(&anchor, AnchorRemoval::Explicit);
        true
    }

    fn dispose(&self, anchor: &TrackedAnchor, reason: AnchorRemoval) {
        if let Some(object) = anchor.object {
            self.scene.lock().set_parent(object, ObjectParent::Root);
        }
        debug!(anchor = %anchor.handle, ?reason, "anchor removed");
        self.events.emit(&AnchorEvent::AnchorRemoved {
            anchor: anchor.handle,
            reason,
        });
    }

    pub fn anchors(&self) -> impl Iterator<Item = &TrackedAnchor> {
        self.anchors.values()
    }

    pub fn get(&self, handle: AnchorHandle) -> Option<&TrackedAnchor> {
        self.anchors.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Remove every anchor explicitly.
    pub fn clear(&mut self) {
        let handles: Vec<AnchorHandle> = self.anchors.keys().copied().collect();
        for handle in handles {
            self.remove_anchor(handle);
        }
    }
}

/// Anchor pose applied to an object, keeping the object's own scale
fn anchored_transform(current: &Mat4, pose: &Pose) -> Mat4 {
    with_scale(&pose.to_matrix(), Vec3::splat(uniform_scale(current)))
}

#[cfg(test)]
#[path = "anchors_tests.rs"]
mod tests;
