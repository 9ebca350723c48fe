use glam::Vec3;

use crate::Aabb;

/// Relative slack applied when one sphere is grown to enclose others, so
/// that containment still holds after f32 rounding.
const ENCLOSE_SLACK: f32 = 1e-5;

/// A bounding sphere in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    /// Center of the sphere.
    pub center: Vec3,
    /// Radius of the sphere. Never negative.
    pub radius: f32,
}

impl BoundingSphere {
    /// Create a sphere. Negative radii are clamped to zero.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    /// The sphere circumscribing an AABB (centered on the box center).
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self::new(aabb.center(), aabb.extents().length())
    }

    /// Sphere centered on `center` grown to enclose `base` and each of
    /// `children`. The result contains every input sphere.
    pub fn enclosing(center: Vec3, base: f32, children: &[BoundingSphere]) -> Self {
        let mut radius = base.max(0.0);
        for child in children {
            radius = radius.max(center.distance(child.center) + child.radius);
        }
        Self::new(center, radius * (1.0 + ENCLOSE_SLACK))
    }

    /// Returns true if `p` lies inside or on the sphere.
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.center.distance_squared(p) <= self.radius * self.radius
    }

    /// Returns true if `other` lies entirely inside this sphere.
    pub fn contains_sphere(&self, other: &BoundingSphere) -> bool {
        self.center.distance(other.center) + other.radius <= self.radius
    }

    /// Returns true if the two spheres overlap (touching counts).
    pub fn intersects(&self, other: &BoundingSphere) -> bool {
        let r = self.radius + other.radius;
        self.center.distance_squared(other.center) <= r * r
    }
}
