//! View frustums extracted from view-projection matrices.
//!
//! Umbra projects with reverse-Z (near maps to depth 1, far to depth 0), so
//! the near and far planes are taken from the depth row differently from the
//! textbook Griggs-Hartmann form. Orthographic light projections built with
//! swapped near/far work the same way.

use glam::{Mat4, Vec3, Vec4};

use crate::{Aabb, BoundingSphere};

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// A plane `normal . p + d = 0` with a unit normal pointing to the inside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Unit normal.
    pub normal: Vec3,
    /// Signed offset from the origin.
    pub d: f32,
}

impl Plane {
    /// Build a plane from a raw `(a, b, c, d)` row, normalizing it.
    pub fn from_vec4(v: Vec4) -> Self {
        let len = v.truncate().length();
        let v = if len > 0.0 { v / len } else { v };
        Self {
            normal: v.truncate(),
            d: v.w,
        }
    }

    /// Plane through `point` facing along `normal`.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            d: -normal.dot(point),
        }
    }

    /// Signed distance from `p`; positive on the inside.
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// A view frustum: six inward-facing planes plus the eight world-space
/// corners of the clip volume.
#[derive(Clone, Debug)]
pub struct Frustum {
    planes: [Plane; 6],
    corners: [Vec3; 8],
}

impl Frustum {
    /// Extract frustum planes from a combined reverse-Z view-projection matrix.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut raw = [Vec4::ZERO; 6];
        raw[LEFT] = rows[3] + rows[0];
        raw[RIGHT] = rows[3] - rows[0];
        raw[BOTTOM] = rows[3] + rows[1];
        raw[TOP] = rows[3] - rows[1];
        // Reverse-Z keeps 0 <= z <= w: z <= w is the near plane, z >= 0 the far one.
        raw[NEAR] = rows[3] - rows[2];
        raw[FAR] = rows[2];

        let inv = vp.inverse();
        let corners = std::array::from_fn(|i| {
            let ndc = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { 1.0 } else { 0.0 },
            );
            inv.project_point3(ndc)
        });

        Self {
            planes: raw.map(Plane::from_vec4),
            corners,
        }
    }

    /// The six planes: left, right, bottom, top, near, far.
    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// World-space corners. Indices 0..4 lie on the near plane, 4..8 on the far plane.
    pub fn corners(&self) -> &[Vec3; 8] {
        &self.corners
    }

    /// The AABB enclosing all eight corners.
    pub fn bounding_box(&self) -> Aabb {
        let mut out = Aabb {
            min: self.corners[0],
            max: self.corners[0],
        };
        for c in &self.corners[1..] {
            out.min = out.min.min(*c);
            out.max = out.max.max(*c);
        }
        out
    }

    /// Test whether an AABB is at least partially inside the frustum.
    ///
    /// Uses the positive-vertex method. Conservative: boxes near frustum
    /// corners may pass while fully outside, visible boxes never fail.
    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let n = plane.normal;
            let p = Vec3::new(
                if n.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if n.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if n.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.signed_distance(p) >= 0.0
        })
    }

    /// Test whether a sphere is at least partially inside the frustum.
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(sphere.center) >= -sphere.radius)
    }

    /// Returns true if the point lies inside all six planes.
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.signed_distance(p) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_camera_vp() -> Mat4 {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(
            std::f32::consts::FRAC_PI_4,
            16.0 / 9.0,
            1000.0, // reverse-Z: far as near param
            0.1,    // reverse-Z: near as far param
        );
        proj * view
    }

    #[test]
    fn test_object_in_front_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -5.0), Vec3::new(1.0, 1.0, -3.0));
        assert!(frustum.is_visible(&aabb));
    }

    #[test]
    fn test_all_six_planes_reject() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());

        let behind = Aabb::new(Vec3::splat(10.0), Vec3::splat(20.0));
        let left = Aabb::new(Vec3::new(-1000.0, 0.0, -5.0), Vec3::new(-999.0, 1.0, -4.0));
        let right = Aabb::new(Vec3::new(999.0, 0.0, -5.0), Vec3::new(1000.0, 1.0, -4.0));
        let above = Aabb::new(Vec3::new(0.0, 999.0, -5.0), Vec3::new(1.0, 1000.0, -4.0));
        let below = Aabb::new(Vec3::new(0.0, -1000.0, -5.0), Vec3::new(1.0, -999.0, -4.0));
        let beyond_far = Aabb::new(Vec3::new(0.0, 0.0, -2000.0), Vec3::new(1.0, 1.0, -1500.0));
        let before_near = Aabb::new(Vec3::new(-0.01, -0.01, -0.05), Vec3::new(0.01, 0.01, -0.01));

        for aabb in [behind, left, right, above, below, beyond_far, before_near] {
            assert!(!frustum.is_visible(&aabb), "{aabb:?} should be culled");
        }
    }

    #[test]
    fn test_planes_are_normalized() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        for plane in frustum.planes() {
            let len = plane.normal.length();
            assert!((len - 1.0).abs() < 1e-4, "plane normal not normalized: {len}");
        }
    }

    #[test]
    fn test_corners_match_clip_distances() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let corners = frustum.corners();
        for near in &corners[0..4] {
            assert!((near.z + 0.1).abs() < 1e-3, "near corner {near}");
        }
        for far in &corners[4..8] {
            assert!((far.z + 1000.0).abs() < 0.5, "far corner {far}");
        }
        let bbox = frustum.bounding_box();
        assert!(bbox.min.z < -999.0 && bbox.max.z > -0.2);
    }

    #[test]
    fn test_sphere_straddling_plane_is_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let straddling = BoundingSphere::new(Vec3::new(0.0, 0.0, 0.5), 1.0);
        let behind = BoundingSphere::new(Vec3::new(0.0, 0.0, 5.0), 1.0);
        assert!(frustum.intersects_sphere(&straddling));
        assert!(!frustum.intersects_sphere(&behind));
    }

    #[test]
    fn test_plane_signed_distance() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 2.0, 0.0), Vec3::Y);
        assert!((plane.signed_distance(Vec3::new(5.0, 3.0, 1.0)) - 1.0).abs() < 1e-6);
        assert!(plane.signed_distance(Vec3::ZERO) < 0.0);
    }
}
