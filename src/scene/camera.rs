use glam::{Mat4, Vec3, Vec4};

use crate::resources::geometry::BoundingBox;

/// View volume of a camera or light, as six inward-facing planes.
///
/// Planes are stored as `(normal, distance)` with `dot(normal, p) + distance >= 0`
/// for points inside. Clip-space depth follows the wgpu convention `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Default for Frustum {
    /// A frustum that contains everything.
    fn default() -> Self {
        Self {
            planes: [Vec4::new(0.0, 0.0, 0.0, f32::INFINITY); 6],
        }
    }
}

impl Frustum {
    /// Extracts the planes of a view-projection matrix (Gribb-Hartmann).
    ///
    /// `m` maps world space to clip space, i.e. `projection * view` for
    /// column vectors.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0], // Left
            rows[3] - rows[0], // Right
            rows[3] + rows[1], // Bottom
            rows[3] - rows[1], // Top
            rows[2],           // Near (z >= 0)
            rows[3] - rows[2], // Far  (z <= w)
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        Self { planes }
    }

    /// Frustum of a light given its view and projection matrices.
    #[must_use]
    pub fn from_view_projection(view: Mat4, projection: Mat4) -> Self {
        Self::from_matrix(projection * view)
    }

    #[inline]
    fn distance(plane: Vec4, point: Vec3) -> f32 {
        plane.truncate().dot(point) + plane.w
    }

    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| Self::distance(*p, point) >= 0.0)
    }

    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|p| Self::distance(*p, center) >= -radius)
    }

    /// Conservative box test: rejects a box only when it lies fully outside
    /// one plane.
    #[must_use]
    pub fn intersects_box(&self, bounds: &BoundingBox) -> bool {
        self.planes.iter().all(|plane| {
            // Corner furthest along the plane normal.
            let positive = Vec3::new(
                if plane.x >= 0.0 { bounds.max.x } else { bounds.min.x },
                if plane.y >= 0.0 { bounds.max.y } else { bounds.min.y },
                if plane.z >= 0.0 { bounds.max.z } else { bounds.min.z },
            );
            Self::distance(*plane, positive) >= 0.0
        })
    }
}
