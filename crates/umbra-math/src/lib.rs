//! Bounding volumes, planes and view frustums shared by the Umbra renderer and terrain.

mod aabb;
mod frustum;
mod sphere;

pub use aabb::Aabb;
pub use frustum::{Frustum, Plane};
pub use sphere::BoundingSphere;
