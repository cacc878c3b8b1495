//! Poses, rays and transform helpers

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A rigid transform reported by the host: position plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position in the base space
    pub position: Vec3,
    /// Orientation in the base space
    pub orientation: Quat,
}

impl Pose {
    /// Identity pose at the origin
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    /// Create a new pose
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self { position, orientation }
    }

    /// Pose at a position with no rotation
    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Get the transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    /// Extract the rigid part of a matrix, dropping scale
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (_, orientation, position) = matrix.to_scale_rotation_translation();
        Self { position, orientation }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A ray with a normalized direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Ray pointing down the local -Z axis of a world transform.
    pub fn from_transform(world: &Mat4) -> Self {
        let origin = world.transform_point3(Vec3::ZERO);
        let direction = world.transform_vector3(Vec3::NEG_Z);
        Self::new(origin, direction)
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    /// Distance along the ray to the first intersection with a sphere.
    ///
    /// A ray starting inside the sphere hits at distance zero. Spheres
    /// entirely behind the origin are missed.
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let to_center = center - self.origin;
        let c = to_center.length_squared() - radius * radius;
        if c <= 0.0 {
            return Some(0.0);
        }

        let b = to_center.dot(self.direction);
        if b <= 0.0 {
            return None;
        }

        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }

        Some(b - discriminant.sqrt())
    }
}

/// Uniform scale of a transform, taken as the largest axis scale.
pub fn uniform_scale(matrix: &Mat4) -> f32 {
    let (scale, _, _) = matrix.to_scale_rotation_translation();
    scale.max_element()
}

/// Replace the scale of a transform while keeping rotation and translation.
pub fn with_scale(matrix: &Mat4, scale: Vec3) -> Mat4 {
    let (_, rotation, translation) = matrix.to_scale_rotation_translation();
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

/// Approximate matrix equality for transform comparisons.
pub fn approx_eq(a: &Mat4, b: &Mat4, epsilon: f32) -> bool {
    a.abs_diff_eq(*b, epsilon)
}
