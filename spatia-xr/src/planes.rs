//! Mirrors the host's detected surfaces as meshes

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, trace};

use crate::config::VisualConfig;
use crate::events::{PlaneEvent, Subject};
use crate::host::{HostPlane, PlaneHandle, PlaneOrientation, SpaceId, XrFrame};
use crate::mesh::{Mesh3D, Visual};

/// A plane currently mirrored from the host.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPlane {
    pub handle: PlaneHandle,
    pub polygon: Vec<glam::Vec3>,
    pub orientation: PlaneOrientation,
    /// Host stamp of the last geometry change we rebuilt from
    pub last_changed_time: f64,
    pub visual: Visual,
}

/// Diffs the host's plane set every frame.
pub struct PlaneDetectionTracker {
    color: [f32; 4],
    planes: BTreeMap<PlaneHandle, TrackedPlane>,
    events: Subject<PlaneEvent>,
}

impl PlaneDetectionTracker {
    pub fn new(visuals: &VisualConfig) -> Self {
        Self {
            color: visuals.plane_color,
            planes: BTreeMap::new(),
            events: Subject::new(),
        }
    }

    pub fn events(&self) -> &Subject<PlaneEvent> {
        &self.events
    }

    /// Reconcile tracked planes with this frame's detected set.
    ///
    /// Frames that carry no plane information at all leave the tracked set
    /// untouched. Planes whose pose cannot be resolved are skipped for the
    /// frame.
    pub fn update(&mut self, frame: &dyn XrFrame, reference_space: SpaceId) {
        let Some(detected) = frame.detected_planes() else {
            return;
        };

        let mut pending = Vec::new();
        let present: HashSet<PlaneHandle> = detected.iter().map(|p| p.handle).collect();

        let gone: Vec<PlaneHandle> = self
            .planes
            .keys()
            .filter(|handle| !present.contains(handle))
            .copied()
            .collect();
        for handle in gone {
            self.planes.remove(&handle);
            debug!(plane = %handle, "plane removed");
            pending.push(PlaneEvent::PlaneRemoved { plane: handle });
        }

        for plane in &detected {
            let Some(pose) = frame.pose(plane.space, reference_space) else {
                trace!(plane = %plane.handle, "plane pose unresolved, skipping");
                continue;
            };

            match self.planes.get_mut(&plane.handle) {
                None => {
                    let mut visual = Visual::new(plane_mesh(plane), self.color);
                    visual.transform = pose.to_matrix();
                    self.planes.insert(
                        plane.handle,
                        TrackedPlane {
                            handle: plane.handle,
                            polygon: plane.polygon.clone(),
                            orientation: plane.orientation,
                            last_changed_time: plane.last_changed_time,
                            visual,
                        },
                    );
                    debug!(plane = %plane.handle, orientation = ?plane.orientation, "plane added");
                    pending.push(PlaneEvent::PlaneAdded {
                        plane: plane.handle,
                        orientation: plane.orientation,
                    });
                }
                Some(tracked) if plane.last_changed_time > tracked.last_changed_time => {
                    tracked.visual.mesh = plane_mesh(plane);
                    tracked.visual.transform = pose.to_matrix();
                    tracked.polygon = plane.polygon.clone();
                    tracked.orientation = plane.orientation;
                    tracked.last_changed_time = plane.last_changed_time;
                    pending.push(PlaneEvent::PlaneChanged { plane: plane.handle });
                }
                Some(_) => {}
            }
        }

        for event in &pending {
            self.events.emit(event);
        }
    }

    pub fn planes(&self) -> impl Iterator<Item = &TrackedPlane> {
        self.planes.values()
    }

    pub fn get(&self, handle: PlaneHandle) -> Option<&TrackedPlane> {
        self.planes.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Drop every tracked plane, announcing each removal.
    pub fn clear(&mut self) {
        let removed = std::mem::take(&mut self.planes);
        for handle in removed.into_keys() {
            self.events.emit(&PlaneEvent::PlaneRemoved { plane: handle });
        }
    }
}

fn plane_mesh(plane: &HostPlane) -> Mesh3D {
    Mesh3D::from_polygon_fan(format!("Plane{}", plane.handle), &plane.polygon)
}
