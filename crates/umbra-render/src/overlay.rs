//! Debug primitives and the paint brush, tessellated into colored lines.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use rustc_hash::FxHashSet;

use crate::assets::Mesh;
use crate::lights::Light;

const CIRCLE_SEGMENTS: usize = 32;
const BRUSH_COLOR: Vec3 = Vec3::new(1.0, 0.85, 0.1);

/// A line segment in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayLine {
    pub start: Vec3,
    pub end: Vec3,
    pub color: Vec3,
}

/// Line list vertex for the GPU overlay pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct OverlayVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

/// Every overlay line of one frame.
#[derive(Clone, Debug, Default)]
pub struct OverlayBatch {
    pub lines: Vec<OverlayLine>,
}

impl OverlayBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&mut self, start: Vec3, end: Vec3, color: Vec3) {
        self.lines.push(OverlayLine { start, end, color });
    }

    /// Red, green and blue axes of a transform.
    pub fn axis(&mut self, transform: &Mat4, size: f32) {
        let origin = transform.transform_point3(Vec3::ZERO);
        for (dir, color) in [(Vec3::X, Vec3::X), (Vec3::Y, Vec3::Y), (Vec3::Z, Vec3::Z)] {
            self.line(origin, transform.transform_point3(dir * size), color);
        }
    }

    /// A small three-axis cross.
    pub fn point(&mut self, position: Vec3, size: f32, color: Vec3) {
        let h = size * 0.5;
        for dir in [Vec3::X, Vec3::Y, Vec3::Z] {
            self.line(position - dir * h, position + dir * h, color);
        }
    }

    /// Closed polyline through `points`.
    pub fn loop_through(&mut self, points: &[Vec3], color: Vec3) {
        for (i, &p) in points.iter().enumerate() {
            self.line(p, points[(i + 1) % points.len()], color);
        }
    }

    /// Three great circles of an ellipsoid (a unit sphere under `transform`).
    pub fn ellipsoid(&mut self, transform: &Mat4, color: Vec3) {
        for (a, b) in [(Vec3::X, Vec3::Y), (Vec3::Y, Vec3::Z), (Vec3::Z, Vec3::X)] {
            let points: Vec<Vec3> = circle(a, b)
                .map(|p| transform.transform_point3(p))
                .collect();
            self.loop_through(&points, color);
        }
    }

    pub fn sphere(&mut self, center: Vec3, radius: f32, color: Vec3) {
        let transform = Mat4::from_translation(center) * Mat4::from_scale(Vec3::splat(radius));
        self.ellipsoid(&transform, color);
    }

    /// Each unique edge of a triangle mesh.
    pub fn wire_mesh(&mut self, mesh: &Mesh, transform: &Mat4, color: Vec3) {
        let mut edges = FxHashSet::default();
        for tri in mesh.indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                if edges.insert((a.min(b), a.max(b))) {
                    let pa = Vec3::from(mesh.vertices[a as usize].position);
                    let pb = Vec3::from(mesh.vertices[b as usize].position);
                    self.line(
                        transform.transform_point3(pa),
                        transform.transform_point3(pb),
                        color,
                    );
                }
            }
        }
    }

    /// The twelve edges of a reverse-Z view frustum.
    pub fn frustum(&mut self, view_proj: &Mat4, color: Vec3) {
        let inv = view_proj.inverse();
        let corner = |x: f32, y: f32, z: f32| {
            let p = inv * Vec4::new(x, y, z, 1.0);
            p.truncate() / p.w
        };
        let near = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)].map(|(x, y)| corner(x, y, 1.0));
        let far = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)].map(|(x, y)| corner(x, y, 0.0));
        self.loop_through(&near, color);
        self.loop_through(&far, color);
        for (n, f) in near.iter().zip(&far) {
            self.line(*n, *f, color);
        }
    }

    /// A square patch of a plane and its normal.
    pub fn plane(&mut self, position: Vec3, normal: Vec3, size: f32, color: Vec3) {
        let normal = normal.normalize_or(Vec3::Y);
        let (u, v) = normal.any_orthonormal_pair();
        let h = size * 0.5;
        let quad = [
            position + (-u - v) * h,
            position + (u - v) * h,
            position + (u + v) * h,
            position + (-u + v) * h,
        ];
        self.loop_through(&quad, color);
        self.line(position, position + normal * h, color);
    }

    /// A light's position and its radius of effect.
    pub fn light(&mut self, light: &Light) {
        let color = light.color.normalize_or(Vec3::ONE);
        self.point(light.position, (light.radius * 0.1).max(0.1), color);
        self.sphere(light.position, light.radius, color * 0.5);
    }

    /// The paint brush ring, following the surface given by `height`.
    pub fn brush(&mut self, position: Vec3, radius: f32, height: impl Fn(f32, f32) -> f32) {
        let ring: Vec<Vec3> = circle(Vec3::X, Vec3::Z)
            .map(|p| {
                let x = position.x + p.x * radius;
                let z = position.z + p.z * radius;
                Vec3::new(x, height(x, z) + 0.05, z)
            })
            .collect();
        self.loop_through(&ring, BRUSH_COLOR);
        self.point(position, radius * 0.1, BRUSH_COLOR);
    }

    /// GPU vertices, two per line.
    pub fn vertices(&self) -> Vec<OverlayVertex> {
        self.lines
            .iter()
            .flat_map(|l| {
                [l.start, l.end].map(|p| OverlayVertex {
                    position: p.to_array(),
                    color: l.color.to_array(),
                })
            })
            .collect()
    }
}

fn circle(a: Vec3, b: Vec3) -> impl Iterator<Item = Vec3> {
    (0..CIRCLE_SEGMENTS).map(move |i| {
        let angle = i as f32 / CIRCLE_SEGMENTS as f32 * std::f32::consts::TAU;
        a * angle.cos() + b * angle.sin()
    })
}
