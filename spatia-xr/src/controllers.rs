//! Routes controller button input to grab and scale interactions

use glam::{Mat4, Vec3};
use tracing::{debug, trace};

use crate::config::ControllerConfig;
use crate::events::{ControllerEvent, Subject};
use crate::grab::{self, Attachment};
use crate::host::{
    Handedness, InputSourceId, InputSourceInfo, InputSpace, ObjectId, SpaceId, XrFrame,
};
use crate::math::{uniform_scale, with_scale, Ray};
use crate::mesh::{Mesh3D, Visual};
use crate::scene::{pick_along_ray, ModificationReason, ObjectParent, SharedScene};

/// Number of controller slots the router binds.
pub const MAX_CONTROLLERS: usize = 2;

#[derive(Debug)]
struct Controller {
    source: InputSourceId,
    handedness: Handedness,
    /// Target-ray transform of the latest tracked frame
    world: Mat4,
    held: Option<Attachment>,
    ray: Visual,
}

/// Turns select and squeeze input on up to two controllers into object
/// grabs, releases and scale steps.
pub struct ControllerInputRouter {
    config: ControllerConfig,
    scene: SharedScene,
    controllers: [Option<Controller>; MAX_CONTROLLERS],
    events: Subject<ControllerEvent>,
}

impl ControllerInputRouter {
    pub fn new(config: ControllerConfig, scene: SharedScene) -> Self {
        Self {
            config,
            scene,
            controllers: [None, None],
            events: Subject::new(),
        }
    }

    pub fn events(&self) -> &Subject<ControllerEvent> {
        &self.events
    }

    /// Bind a controller to the lowest free index. Returns `None` when both
    /// slots are taken.
    pub fn bind(&mut self, info: InputSourceInfo) -> Option<usize> {
        if let Some(index) = self.index_of(info.id) {
            return Some(index);
        }
        let index = self.controllers.iter().position(Option::is_none)?;
        let mut ray = Visual::new(
            Mesh3D::create_line(self.config.ray_length),
            self.config.ray_idle_color,
        );
        ray.visible = false;

        self.controllers[index] = Some(Controller {
            source: info.id,
            handedness: info.handedness,
            world: Mat4::IDENTITY,
            held: None,
            ray,
        });
        debug!(
            controller = index,
            source = %info.id,
            handedness = ?info.handedness,
            "controller bound"
        );
        Some(index)
    }

    /// Unbind a controller, releasing whatever it holds.
    pub fn unbind(&mut self, source: InputSourceId) -> Option<usize> {
        let index = self.index_of(source)?;
        self.release(index);
        self.controllers[index] = None;
        debug!(controller = index, %source, "controller unbound");
        Some(index)
    }

    pub fn index_of(&self, source: InputSourceId) -> Option<usize> {
        self.controllers
            .iter()
            .position(|c| c.as_ref().is_some_and(|c| c.source == source))
    }

    /// Track controller poses and carry held objects along.
    pub fn update(&mut self, frame: &dyn XrFrame, reference_space: SpaceId) {
        let mut scene = self.scene.lock();
        for controller in self.controllers.iter_mut().flatten() {
            let pose = frame
                .input_pose(controller.source, InputSpace::TargetRay, reference_space)
                .or_else(|| frame.input_pose(controller.source, InputSpace::Grip, reference_space));
            let Some(pose) = pose else {
                trace!(source = %controller.source, "controller not tracked this frame");
                controller.ray.visible = false;
                continue;
            };

            controller.world = pose.to_matrix();
            controller.ray.transform = controller.world;
            controller.ray.visible = true;
            if let Some(held) = &controller.held {
                grab::follow(&mut *scene, held, &controller.world);
            }
        }
    }

    /// Ray-pick from the controller and grab the nearest hit.
    pub fn select_start(&mut self, source: InputSourceId) -> bool {
        let Some(index) = self.index_of(source) else {
            return false;
        };
        let max_distance = self.config.ray_length;
        let active_color = self.config.ray_active_color;

        let grabbed = {
            let mut scene = self.scene.lock();
            let Some(controller) = self.controllers[index].as_mut() else {
                return false;
            };
            if controller.held.is_some() {
                None
            } else {
                let ray = Ray::from_transform(&controller.world);
                pick_along_ray(&ray, &scene.interactables(), max_distance)
                    .and_then(|(object, _)| {
                        grab::attach(
                            &mut *scene,
                            object,
                            &controller.world,
                            ObjectParent::Controller(index),
                        )
                    })
                    .map(|attachment| {
                        controller.held = Some(attachment);
                        controller.ray.color = active_color;
                        attachment.object
                    })
            }
        };

        if let Some(object) = grabbed {
            debug!(controller = index, %object, "object grabbed");
        }
        self.events.emit(&ControllerEvent::SelectStart {
            controller: index,
            object: grabbed,
        });
        true
    }

    /// Put the held object back under the scene root.
    pub fn select_end(&mut self, source: InputSourceId) -> bool {
        let Some(index) = self.index_of(source) else {
            return false;
        };
        let object = self.release(index);
        self.events.emit(&ControllerEvent::SelectEnd {
            controller: index,
            object,
        });
        true
    }

    pub fn select(&mut self, source: InputSourceId) -> bool {
        let Some(index) = self.index_of(source) else {
            return false;
        };
        self.events.emit(&ControllerEvent::Select {
            controller: index,
            source,
        });
        true
    }

    /// Scale the selected object one step. The selection comes from the
    /// scene, falling back to what this controller holds.
    pub fn squeeze_start(&mut self, source: InputSourceId) -> bool {
        let Some(index) = self.index_of(source) else {
            return false;
        };

        let scaled = {
            let mut scene = self.scene.lock();
            let Some(controller) = self.controllers[index].as_mut() else {
                return false;
            };
            let target = scene
                .selected()
                .or_else(|| controller.held.map(|held| held.object));

            target.and_then(|object| {
                let current = scene.world_transform(object)?;
                let factor = self.config.squeeze_factor(controller.handedness);
                // A NaN bound is ignored
                let scale = (uniform_scale(&current) * factor)
                    .max(self.config.min_scale)
                    .min(self.config.max_scale);
                let transform = with_scale(&current, Vec3::splat(scale));

                scene.set_world_transform(object, transform);
                scene.mark_modified(object, ModificationReason::Scaled);
                if let Some(held) = controller.held.as_mut().filter(|held| held.object == object) {
                    *held = Attachment::capture(object, &controller.world, &transform);
                }
                Some((object, scale))
            })
        };

        if let Some((object, scale)) = scaled {
            debug!(controller = index, %object, scale, "object scaled");
        }
        self.events.emit(&ControllerEvent::SqueezeStart {
            controller: index,
            object: scaled.map(|(object, _)| object),
            scale: scaled.map(|(_, scale)| scale),
        });
        true
    }

    pub fn squeeze(&mut self, source: InputSourceId) -> bool {
        let Some(index) = self.index_of(source) else {
            return false;
        };
        self.events.emit(&ControllerEvent::Squeeze { controller: index });
        true
    }

    pub fn squeeze_end(&mut self, source: InputSourceId) -> bool {
        let Some(index) = self.index_of(source) else {
            return false;
        };
        self.events.emit(&ControllerEvent::SqueezeEnd { controller: index });
        true
    }

    fn release(&mut self, index: usize) -> Option<ObjectId> {
        let controller = self.controllers[index].as_mut()?;
        let held = controller.held.take()?;
        grab::release(&mut *self.scene.lock(), &held, &controller.world);
        controller.ray.color = self.config.ray_idle_color;
        debug!(controller = index, object = %held.object, "object released");
        Some(held.object)
    }

    /// Release every held object without unbinding.
    pub fn release_all(&mut self) {
        for index in 0..MAX_CONTROLLERS {
            self.release(index);
        }
    }

    /// Unbind every controller.
    pub fn clear(&mut self) {
        self.release_all();
        self.controllers = [None, None];
    }

    pub fn held(&self, index: usize) -> Option<ObjectId> {
        self.slot(index)?.held.map(|held| held.object)
    }

    pub fn ray(&self, index: usize) -> Option<&Visual> {
        self.slot(index).map(|c| &c.ray)
    }

    pub fn source(&self, index: usize) -> Option<InputSourceId> {
        self.slot(index).map(|c| c.source)
    }

    /// Latest tracked target-ray transform
    pub fn world_transform(&self, index: usize) -> Option<Mat4> {
        self.slot(index).map(|c| c.world)
    }

    pub fn bound_count(&self) -> usize {
        self.controllers.iter().flatten().count()
    }

    fn slot(&self, index: usize) -> Option<&Controller> {
        self.controllers.get(index)?.as_ref()
    }
}

#[cfg(test)]
#[path = "controllers_tests.rs"]
mod tests;
