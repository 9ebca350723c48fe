use glam::{Mat4, Vec3};

/// Axis-aligned bounding box in f32 world space.
///
/// Invariant: `min <= max` on every axis. The constructor enforces this by
/// swapping components if needed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Vec3,
    /// Maximum corner of the bounding box.
    pub max: Vec3,
}

impl Aabb {
    /// Create an AABB from two corners, sorting components so that
    /// `min <= max` on every axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Smallest AABB enclosing every point, or `None` for an empty slice.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut min = *first;
        let mut max = *first;
        for p in rest {
            min = min.min(*p);
            max = max.max(*p);
        }
        Some(Self { min, max })
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half-extents (half-size along each axis).
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Returns the full size along each axis.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Returns true if this AABB overlaps `other` (touching counts).
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Returns the smallest AABB enclosing both boxes.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grow the box by `margin` on every side.
    pub fn expand_by(&self, margin: f32) -> Aabb {
        Aabb::new(self.min - Vec3::splat(margin), self.max + Vec3::splat(margin))
    }

    /// The eight corners, ordered by the bit pattern `(x, y, z)` of the index.
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }

    /// Bounding box of this box after an affine transform.
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        let corners = self.corners().map(|c| m.transform_point3(c));
        let mut out = Aabb {
            min: corners[0],
            max: corners[0],
        };
        for c in &corners[1..] {
            out.min = out.min.min(*c);
            out.max = out.max.max(*c);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::ONE)
    }

    #[test]
    fn test_constructor_auto_sorts() {
        let aabb = Aabb::new(Vec3::new(5.0, -1.0, 3.0), Vec3::new(-5.0, 1.0, -3.0));
        assert_eq!(aabb.min, Vec3::new(-5.0, -1.0, -3.0));
        assert_eq!(aabb.max, Vec3::new(5.0, 1.0, 3.0));
    }

    #[test]
    fn test_contains_point_on_edge() {
        assert!(unit().contains_point(Vec3::new(1.0, 0.5, 0.0)));
        assert!(!unit().contains_point(Vec3::new(1.01, 0.5, 0.0)));
    }

    #[test]
    fn test_intersects_touching() {
        let other = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(unit().intersects(&other));
        let far = Aabb::new(Vec3::splat(3.0), Vec3::splat(4.0));
        assert!(!unit().intersects(&far));
    }

    #[test]
    fn test_union_encloses_both() {
        let other = Aabb::new(Vec3::splat(-2.0), Vec3::splat(-1.0));
        let u = unit().union(&other);
        assert_eq!(u.min, Vec3::splat(-2.0));
        assert_eq!(u.max, Vec3::ONE);
    }

    #[test]
    fn test_from_points_empty_is_none() {
        assert!(Aabb::from_points(&[]).is_none());
        let b = Aabb::from_points(&[Vec3::X, Vec3::NEG_Y, Vec3::Z]).unwrap();
        assert_eq!(b.min, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_corners_are_distinct_and_on_box() {
        let corners = unit().corners();
        for (i, a) in corners.iter().enumerate() {
            assert!(unit().contains_point(*a));
            for b in &corners[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_transformed_translation() {
        let moved = unit().transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(moved.max, Vec3::new(11.0, 1.0, 1.0));
    }
}
