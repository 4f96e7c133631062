//! View frustum and clip-plane tests for sector culling.

use glam::{Mat4, Vec3, Vec4};

use super::aabb::Aabb;

/// A plane in Hessian normal form (normal + distance from origin).
///
/// Points with positive signed distance are on the kept side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Build a normalized plane from raw `ax + by + cz + d = 0` coefficients.
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.truncate();
        let len = normal.length();
        Self {
            normal: normal / len,
            distance: coefficients.w / len,
        }
    }

    /// Signed distance from a point to the plane (positive = kept side).
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// How multiple clip planes combine into a kept region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipMode {
    /// A point is kept only when every plane keeps it.
    #[default]
    Intersection,
    /// A point is kept when any plane keeps it.
    Union,
}

/// Check whether a box survives clipping.
///
/// Conservative: the box passes when at least one corner is kept, so
/// partially clipped sectors still load. An empty plane list keeps
/// everything.
pub fn aabb_passes_clip(aabb: &Aabb, planes: &[Plane], mode: ClipMode) -> bool {
    if planes.is_empty() {
        return true;
    }
    aabb.corners().iter().any(|&corner| match mode {
        ClipMode::Intersection => planes.iter().all(|p| p.signed_distance(corner) >= 0.0),
        ClipMode::Union => planes.iter().any(|p| p.signed_distance(corner) >= 0.0),
    })
}

/// View frustum as six inward-facing planes.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract the six frustum planes from a view-projection matrix.
    ///
    /// Standard Gribb/Hartmann extraction; planes are normalized so signed
    /// distances are in world units.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let m = view_projection.to_cols_array_2d();
        let row = |i: usize| Vec4::new(m[0][i], m[1][i], m[2][i], m[3][i]);
        let w = row(3);
        Self {
            planes: [
                Plane::from_coefficients(w + row(0)), // left
                Plane::from_coefficients(w - row(0)), // right
                Plane::from_coefficients(w + row(1)), // bottom
                Plane::from_coefficients(w - row(1)), // top
                Plane::from_coefficients(w + row(2)), // near
                Plane::from_coefficients(w - row(2)), // far
            ],
        }
    }

    /// Check if a point lies inside the frustum.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) >= 0.0)
    }

    /// Conservative frustum/AABB overlap test.
    ///
    /// Tests the corner most aligned with each plane normal (p-vertex); a box
    /// fully behind any plane is rejected.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if plane.signed_distance(p) < 0.0 {
                return false;
            }
        }
        true
    }
}
