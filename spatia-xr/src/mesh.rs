//! Core-owned visuals: reticle ring, anchor markers, plane meshes, rays

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// A 3D vertex with position, normal, and texture coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex3D {
    /// Position in mesh space
    pub position: Vec3,
    /// Surface normal
    pub normal: Vec3,
    /// Texture coordinates
    pub tex_coords: Vec2,
}

impl Vertex3D {
    /// Create a new vertex
    pub fn new(position: Vec3, normal: Vec3, tex_coords: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coords,
        }
    }
}

/// A 3D mesh containing vertices and indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh3D {
    /// Mesh name
    pub name: String,
    /// Vertex data
    pub vertices: Vec<Vertex3D>,
    /// Index data (triangles)
    pub indices: Vec<u32>,
}

impl Mesh3D {
    /// Create a new mesh
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Calculate bounding box
    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        if self.vertices.is_empty() {
            return (Vec3::ZERO, Vec3::ZERO);
        }

        let mut min = self.vertices[0].position;
        let mut max = self.vertices[0].position;

        for vertex in &self.vertices[1..] {
            min = min.min(vertex.position);
            max = max.max(vertex.position);
        }

        (min, max)
    }

    /// Calculate center point
    pub fn center(&self) -> Vec3 {
        let (min, max) = self.bounding_box();
        (min + max) * 0.5
    }

    /// Triangulate a boundary polygon as a fan from vertex 0.
    ///
    /// Only correct for convex boundaries; concave outlines produce
    /// overlapping triangles.
    pub fn from_polygon_fan(name: impl Into<String>, polygon: &[Vec3]) -> Self {
        let mut mesh = Self::new(name);
        mesh.vertices = polygon
            .iter()
            .map(|p| Vertex3D::new(*p, Vec3::Y, Vec2::new(p.x, p.z)))
            .collect();

        if polygon.len() >= 3 {
            for i in 1..(polygon.len() as u32 - 1) {
                mesh.indices.extend_from_slice(&[0, i, i + 1]);
            }
        }
        mesh
    }

    /// Flat ring lying on the XZ plane, used for the placement reticle
    pub fn create_ring(inner_radius: f32, outer_radius: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let mut mesh = Self::new("Reticle");

        for segment in 0..=segments {
            let theta = 2.0 * std::f32::consts::PI * (segment as f32) / (segments as f32);
            let (sin, cos) = theta.sin_cos();
            let u = segment as f32 / segments as f32;

            mesh.vertices.push(Vertex3D::new(
                Vec3::new(cos * inner_radius, 0.0, sin * inner_radius),
                Vec3::Y,
                Vec2::new(u, 0.0),
            ));
            mesh.vertices.push(Vertex3D::new(
                Vec3::new(cos * outer_radius, 0.0, sin * outer_radius),
                Vec3::Y,
                Vec2::new(u, 1.0),
            ));
        }

        for segment in 0..segments {
            let inner = segment * 2;
            let outer = inner + 1;
            let next_inner = inner + 2;
            let next_outer = inner + 3;

            mesh.indices.extend_from_slice(&[inner, outer, next_inner]);
            mesh.indices.extend_from_slice(&[next_inner, outer, next_outer]);
        }
        mesh
    }

    /// Create a sphere mesh
    pub fn create_sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * (ring as f32) / (rings as f32);
            let y = phi.cos();
            let r = phi.sin();

            for segment in 0..=segments {
                let theta = 2.0 * std::f32::consts::PI * (segment as f32) / (segments as f32);
                let x = r * theta.cos();
                let z = r * theta.sin();

                let position = Vec3::new(x, y, z) * radius;
                let normal = Vec3::new(x, y, z).normalize_or_zero();
                let tex_coords = Vec2::new(
                    (segment as f32) / (segments as f32),
                    (ring as f32) / (rings as f32),
                );

                vertices.push(Vertex3D::new(position, normal, tex_coords));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                indices.extend_from_slice(&[current, next, current + 1]);
                indices.extend_from_slice(&[current + 1, next, next + 1]);
            }
        }

        Self {
            name: "AnchorMarker".to_string(),
            vertices,
            indices,
        }
    }

    /// Two-vertex line along -Z, used for controller rays
    pub fn create_line(length: f32) -> Self {
        let mut mesh = Self::new("Ray");
        mesh.vertices = vec![
            Vertex3D::new(Vec3::ZERO, Vec3::Y, Vec2::ZERO),
            Vertex3D::new(Vec3::new(0.0, 0.0, -length), Vec3::Y, Vec2::X),
        ];
        mesh.indices = vec![0, 1];
        mesh
    }
}

/// A mesh placed in the world, owned by the component that created it.
#[derive(Debug, Clone, PartialEq)]
pub struct Visual {
    pub mesh: Mesh3D,
    pub transform: Mat4,
    pub color: [f32; 4],
    pub visible: bool,
}

impl Visual {
    pub fn new(mesh: Mesh3D, color: [f32; 4]) -> Self {
        Self {
            mesh,
            transform: Mat4::IDENTITY,
            color,
            visible: true,
        }
    }

    pub fn hidden(mesh: Mesh3D, color: [f32; 4]) -> Self {
        Self {
            visible: false,
            ..Self::new(mesh, color)
        }
    }

    pub fn position(&self) -> Vec3 {
        self.transform.transform_point3(Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_triangulation_of_quad() {
        let quad = [
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ];
        let mesh = Mesh3D::from_polygon_fan("Plane", &quad);

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.center(), Vec3::ZERO);
    }

    #[test]
    fn test_fan_of_pentagon_has_three_triangles() {
        let pentagon: Vec<Vec3> = (0..5)
            .map(|i| {
                let a = i as f32 * std::f32::consts::TAU / 5.0;
                Vec3::new(a.cos(), 0.0, a.sin())
            })
            .collect();
        let mesh = Mesh3D::from_polygon_fan("Plane", &pentagon);
        assert_eq!(mesh.triangle_count(), 3);
        assert!(mesh.indices.chunks(3).all(|tri| tri[0] == 0));
    }

    #[test]
    fn test_degenerate_polygon_has_no_triangles() {
        let mesh = Mesh3D::from_polygon_fan("Plane", &[Vec3::ZERO, Vec3::X]);
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn test_ring_is_flat() {
        let ring = Mesh3D::create_ring(0.15, 0.2, 32);
        assert_eq!(ring.triangle_count(), 64);
        assert!(ring.vertices.iter().all(|v| v.position.y == 0.0));

        let (min, max) = ring.bounding_box();
        assert!((max.x - 0.2).abs() < 1e-5);
        assert!((min.x + 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_hidden_visual() {
        let visual = Visual::hidden(Mesh3D::create_line(1.0), [1.0; 4]);
        assert!(!visual.visible);
        assert_eq!(visual.position(), Vec3::ZERO);
    }
}
