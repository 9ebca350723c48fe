//! Render objects submitted by the application each frame.

use glam::{Mat4, Vec3};
use umbra_terrain::LandscapeHandle;

use crate::assets::AssetKey;
use crate::lights::Light;

/// A mesh drawn once with a world transform.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticObject {
    pub mesh: AssetKey,
    /// Albedo texture; the placeholder is used if it does not resolve.
    pub texture: Option<AssetKey>,
    pub transform: Mat4,
    pub casts_shadows: bool,
}

impl StaticObject {
    pub fn new(mesh: impl Into<AssetKey>, transform: Mat4) -> Self {
        Self {
            mesh: mesh.into(),
            texture: None,
            transform,
            casts_shadows: true,
        }
    }

    pub fn with_texture(mut self, texture: impl Into<AssetKey>) -> Self {
        self.texture = Some(texture.into());
        self
    }
}

/// One mesh drawn at many transforms.
#[derive(Clone, Debug, PartialEq)]
pub struct InstancedObject {
    pub mesh: AssetKey,
    pub texture: Option<AssetKey>,
    pub instances: Vec<Mat4>,
}

/// A skinned mesh posed by a joint palette.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimatedObject {
    pub mesh: AssetKey,
    pub texture: Option<AssetKey>,
    pub transform: Mat4,
    /// Model-space skinning matrix per joint (pose times inverse bind).
    pub palette: Vec<Mat4>,
}

/// One additive particle sprite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    /// Linear HDR color added to the scene.
    pub color: Vec3,
    /// World-space sprite radius.
    pub size: f32,
}

/// Everything the renderer can draw.
#[derive(Clone, Debug)]
pub enum RenderObject {
    Static(StaticObject),
    Instanced(InstancedObject),
    Animated(AnimatedObject),
    /// Additive sprites composited in the lighting pass.
    Particles(Vec<Particle>),
    /// Terrain, drawn through its LOD tree.
    Landscape(LandscapeHandle),
    /// Gizmo for a light: its position and radius of effect.
    Light(Light),
    /// Coordinate axes of a transform, red/green/blue for x/y/z.
    Axis { transform: Mat4, size: f32 },
    Sphere { center: Vec3, radius: f32, color: Vec3 },
    /// A unit sphere deformed by `transform`.
    Ellipsoid { transform: Mat4, color: Vec3 },
    /// Wireframe of a mesh, typically a physics collision mesh.
    CollisionMesh {
        mesh: AssetKey,
        transform: Mat4,
        color: Vec3,
    },
    /// The frustum of a view-projection matrix (reverse-Z).
    Frustum { view_proj: Mat4, color: Vec3 },
    /// A square patch of a plane.
    Plane {
        position: Vec3,
        normal: Vec3,
        size: f32,
        color: Vec3,
    },
    Line { start: Vec3, end: Vec3, color: Vec3 },
    Point { position: Vec3, size: f32, color: Vec3 },
    /// The terrain painting brush.
    Paint { position: Vec3, radius: f32 },
}

impl RenderObject {
    /// Short name used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderObject::Static(_) => "static",
            RenderObject::Instanced(_) => "instanced",
            RenderObject::Animated(_) => "animated",
            RenderObject::Particles(_) => "particles",
            RenderObject::Landscape(_) => "landscape",
            RenderObject::Light(_) => "light",
            RenderObject::Axis { .. } => "axis",
            RenderObject::Sphere { .. } => "sphere",
            RenderObject::Ellipsoid { .. } => "ellipsoid",
            RenderObject::CollisionMesh { .. } => "collision mesh",
            RenderObject::Frustum { .. } => "frustum",
            RenderObject::Plane { .. } => "plane",
            RenderObject::Line { .. } => "line",
            RenderObject::Point { .. } => "point",
            RenderObject::Paint { .. } => "paint",
        }
    }

    /// Whether the object is drawn by the overlay pass rather than lit.
    pub fn is_overlay(&self) -> bool {
        !matches!(
            self,
            RenderObject::Static(_)
                | RenderObject::Instanced(_)
                | RenderObject::Animated(_)
                | RenderObject::Particles(_)
                | RenderObject::Landscape(_)
        )
    }
}

impl From<StaticObject> for RenderObject {
    fn from(object: StaticObject) -> Self {
        RenderObject::Static(object)
    }
}

impl From<InstancedObject> for RenderObject {
    fn from(object: InstancedObject) -> Self {
        RenderObject::Instanced(object)
    }
}

impl From<AnimatedObject> for RenderObject {
    fn from(object: AnimatedObject) -> Self {
        RenderObject::Animated(object)
    }
}

impl From<LandscapeHandle> for RenderObject {
    fn from(landscape: LandscapeHandle) -> Self {
        RenderObject::Landscape(landscape)
    }
}
