//! Turns the submitted render objects into draw lists for the passes.
//!
//! Asset keys are resolved here, and a key that fails to resolve is replaced
//! by a placeholder so only that object is affected. Animated meshes are
//! skinned on the CPU, landscapes refresh their dirty chunks and are queried
//! through their LOD tree against the frame's camera snapshot, and debug
//! primitives are tessellated into the overlay batch.

use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashSet;
use umbra_math::Aabb;
use umbra_terrain::{GROUND_TYPES, LandscapeHandle, LodPolicy, TerrainMesh};

use crate::assets::{AssetKey, AssetStore, Mesh, Placeholders, ResourceLoadError, Texture, Vertex};
use crate::camera::FrameCamera;
use crate::error::RenderError;
use crate::objects::{Particle, RenderObject};
use crate::overlay::OverlayBatch;
use crate::sky::SkyState;

/// World units covered by one repeat of a ground texture.
const GROUND_TILE_SIZE: f32 = 16.0;

const LOD_BOUNDS_COLOR: Vec3 = Vec3::new(0.2, 1.0, 0.4);

/// A resolved mesh and the transforms it is drawn at.
#[derive(Clone, Debug)]
pub struct MeshDraw {
    pub mesh: Arc<Mesh>,
    pub albedo: Arc<Texture>,
    /// Model matrix per instance.
    pub instances: Vec<Mat4>,
    pub casts_shadows: bool,
    /// Whether any instance intersects the view frustum. Invisible draws
    /// still cast shadows.
    pub visible: bool,
}

/// One selected terrain node.
#[derive(Clone, Debug)]
pub struct TerrainDraw {
    pub mesh: Arc<TerrainMesh>,
    /// Ground texture per ground type.
    pub ground: [Arc<Texture>; GROUND_TYPES],
    /// Ground texture repeats across the landscape.
    pub tiling: f32,
}

/// The sea, a horizontal quad centered under the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeaPlane {
    pub level: f32,
    pub center: Vec2,
    pub half_extent: f32,
}

impl SeaPlane {
    /// The quad as a two-triangle mesh in world space.
    pub fn mesh(&self) -> Mesh {
        let h = self.half_extent;
        let corners = [(-h, -h), (h, -h), (h, h), (-h, h)];
        let vertices = corners
            .iter()
            .map(|&(x, z)| {
                Vertex::new(
                    Vec3::new(self.center.x + x, self.level, self.center.y + z),
                    Vec3::Y,
                    Vec2::new(x / h * 0.5 + 0.5, z / h * 0.5 + 0.5),
                )
            })
            .collect();
        // Counter-clockwise seen from above.
        Mesh::new(vertices, vec![0, 3, 1, 1, 3, 2])
    }
}

/// Counts gathered while preparing a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub mesh_draws: usize,
    pub instances: usize,
    /// Mesh draws outside the frustum (shadow casters only).
    pub culled: usize,
    pub terrain_nodes: usize,
    pub refreshed_chunks: usize,
    pub particles: usize,
    pub overlay_lines: usize,
    /// Assets replaced by placeholders.
    pub resource_warnings: usize,
}

/// Draw lists for one frame.
#[derive(Clone, Debug, Default)]
pub struct PreparedScene {
    pub meshes: Vec<MeshDraw>,
    pub terrain: Vec<TerrainDraw>,
    pub particles: Vec<Particle>,
    pub overlay: OverlayBatch,
    pub sea: Option<SeaPlane>,
    pub stats: SceneStats,
}

/// Read-only inputs of scene preparation.
pub struct SceneContext<'a> {
    pub assets: &'a dyn AssetStore,
    pub placeholders: &'a Placeholders,
    pub camera: &'a FrameCamera,
    pub lod: &'a dyn LodPolicy,
    pub sky: &'a SkyState,
    pub show_lod_bounds: bool,
}

/// Remembers which failed asset keys were already reported, so a missing
/// asset is logged once rather than every frame.
#[derive(Debug, Default)]
pub struct ResourceLog {
    reported: FxHashSet<String>,
}

impl ResourceLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn report(&mut self, err: &ResourceLoadError) {
        let message = err.to_string();
        if self.reported.insert(message.clone()) {
            log::warn!("{message}; using placeholder");
        }
    }
}

impl PreparedScene {
    /// Build the draw lists for `objects`.
    pub fn build(
        objects: Vec<RenderObject>,
        ctx: &SceneContext<'_>,
        resources: &mut ResourceLog,
    ) -> Result<Self, RenderError> {
        let mut builder = Builder {
            ctx,
            resources,
            scene: PreparedScene::default(),
            landscapes: Vec::new(),
        };
        let mut brushes = Vec::new();
        for object in objects {
            match object {
                RenderObject::Paint { position, radius } => brushes.push((position, radius)),
                other => builder.add(other)?,
            }
        }
        for (position, radius) in brushes {
            builder.brush(position, radius)?;
        }
        if ctx.sky.sea_enabled {
            builder.scene.sea = Some(SeaPlane {
                level: ctx.sky.sea_level,
                center: Vec2::new(ctx.camera.position.x, ctx.camera.position.z),
                half_extent: ctx.camera.far,
            });
        }
        let mut scene = builder.scene;
        scene.stats.particles = scene.particles.len();
        scene.stats.overlay_lines = scene.overlay.len();
        Ok(scene)
    }
}

struct Builder<'a, 'b> {
    ctx: &'a SceneContext<'b>,
    resources: &'a mut ResourceLog,
    scene: PreparedScene,
    landscapes: Vec<LandscapeHandle>,
}

impl Builder<'_, '_> {
    fn add(&mut self, object: RenderObject) -> Result<(), RenderError> {
        match object {
            RenderObject::Static(o) => {
                let mesh = self.mesh(&o.mesh);
                let albedo = self.texture(o.texture.as_ref());
                self.push_mesh(mesh, albedo, vec![o.transform], o.casts_shadows);
            }
            RenderObject::Instanced(o) => {
                if o.instances.is_empty() {
                    return Ok(());
                }
                let mesh = self.mesh(&o.mesh);
                let albedo = self.texture(o.texture.as_ref());
                self.push_mesh(mesh, albedo, o.instances, true);
            }
            RenderObject::Animated(o) => {
                let mesh = self.mesh(&o.mesh);
                let albedo = self.texture(o.texture.as_ref());
                let posed = match &mesh.skin {
                    Some(_) => Arc::new(skin_mesh(&mesh, &o.palette)),
                    None => mesh,
                };
                self.push_mesh(posed, albedo, vec![o.transform], true);
            }
            RenderObject::Particles(particles) => self.scene.particles.extend(particles),
            RenderObject::Landscape(handle) => self.landscape(handle)?,
            RenderObject::Light(light) => self.scene.overlay.light(&light),
            RenderObject::Axis { transform, size } => self.scene.overlay.axis(&transform, size),
            RenderObject::Sphere {
                center,
                radius,
                color,
            } => self.scene.overlay.sphere(center, radius, color),
            RenderObject::Ellipsoid { transform, color } => {
                self.scene.overlay.ellipsoid(&transform, color)
            }
            RenderObject::CollisionMesh {
                mesh,
                transform,
                color,
            } => {
                let mesh = self.mesh(&mesh);
                self.scene.overlay.wire_mesh(&mesh, &transform, color);
            }
            RenderObject::Frustum { view_proj, color } => {
                self.scene.overlay.frustum(&view_proj, color)
            }
            RenderObject::Plane {
                position,
                normal,
                size,
                color,
            } => self.scene.overlay.plane(position, normal, size, color),
            RenderObject::Line { start, end, color } => self.scene.overlay.line(start, end, color),
            RenderObject::Point {
                position,
                size,
                color,
            } => self.scene.overlay.point(position, size, color),
            RenderObject::Paint { position, radius } => self.brush(position, radius)?,
        }
        Ok(())
    }

    fn mesh(&mut self, key: &AssetKey) -> Arc<Mesh> {
        match self.ctx.assets.mesh(key) {
            Ok(mesh) => mesh,
            Err(err) => {
                self.resources.report(&err);
                self.scene.stats.resource_warnings += 1;
                Arc::clone(&self.ctx.placeholders.mesh)
            }
        }
    }

    /// Albedo for a draw: white when none is requested, the magenta
    /// checkerboard when the requested one is missing.
    fn texture(&mut self, key: Option<&AssetKey>) -> Arc<Texture> {
        let Some(key) = key else {
            return Arc::clone(&self.ctx.placeholders.white);
        };
        match self.ctx.assets.texture(key) {
            Ok(texture) => texture,
            Err(err) => {
                self.resources.report(&err);
                self.scene.stats.resource_warnings += 1;
                Arc::clone(&self.ctx.placeholders.missing)
            }
        }
    }

    fn push_mesh(&mut self, mesh: Arc<Mesh>, albedo: Arc<Texture>, instances: Vec<Mat4>, casts_shadows: bool) {
        let frustum = &self.ctx.camera.frustum;
        let visible = instances
            .iter()
            .any(|m| frustum.is_visible(&mesh.bounds.transformed(m)));
        self.scene.stats.mesh_draws += 1;
        self.scene.stats.instances += instances.len();
        if !visible {
            self.scene.stats.culled += 1;
        }
        self.scene.meshes.push(MeshDraw {
            mesh,
            albedo,
            instances,
            casts_shadows,
            visible,
        });
    }

    fn landscape(&mut self, handle: LandscapeHandle) -> Result<(), RenderError> {
        if self.landscapes.iter().any(|seen| Arc::ptr_eq(seen, &handle)) {
            log::debug!("Landscape submitted twice in one frame; drawing it once");
            return Ok(());
        }
        let camera = self.ctx.camera;
        let (selection, meshes, ground_keys, tiling) = {
            let mut landscape = handle.write().map_err(|_| RenderError::LandscapeLock)?;
            let refreshed = landscape.refresh_dirty();
            self.scene.stats.refreshed_chunks += refreshed.chunks;
            let selection = landscape.select_chunks(&camera.frustum, camera.position, self.ctx.lod);
            let meshes: Vec<Arc<TerrainMesh>> = selection
                .iter()
                .map(|s| landscape.node_mesh(s.node))
                .collect();
            let tiling = (landscape.extent() / GROUND_TILE_SIZE).max(1.0);
            (
                selection,
                meshes,
                landscape.desc().ground_textures.clone(),
                tiling,
            )
        };

        let ground: [Arc<Texture>; GROUND_TYPES] = std::array::from_fn(|i| {
            let key = ground_keys[i].as_deref().map(AssetKey::new);
            self.texture(key.as_ref())
        });
        if self.ctx.show_lod_bounds
            && let Ok(landscape) = handle.read()
        {
            for s in &selection {
                let sphere = landscape.tree().node(s.node).sphere;
                self.scene.overlay.sphere(sphere.center, sphere.radius, LOD_BOUNDS_COLOR);
            }
        }
        self.scene.stats.terrain_nodes += meshes.len();
        self.scene
            .terrain
            .extend(meshes.into_iter().map(|mesh| TerrainDraw {
                mesh,
                ground: ground.clone(),
                tiling,
            }));
        self.landscapes.push(handle);
        Ok(())
    }

    /// Brush ring draped over the first landscape under it.
    fn brush(&mut self, position: Vec3, radius: f32) -> Result<(), RenderError> {
        let mut surface = None;
        for handle in &self.landscapes {
            let landscape = handle.read().map_err(|_| RenderError::LandscapeLock)?;
            let o = landscape.origin();
            let extent = landscape.extent();
            let inside = position.x >= o.x
                && position.z >= o.z
                && position.x <= o.x + extent
                && position.z <= o.z + extent;
            if inside {
                surface = Some(Arc::clone(handle));
                break;
            }
        }
        match surface.as_ref().and_then(|h| h.read().ok()) {
            Some(landscape) => self
                .scene
                .overlay
                .brush(position, radius, |x, z| landscape.height(Vec2::new(x, z))),
            None => self.scene.overlay.brush(position, radius, |_, _| position.y),
        }
        Ok(())
    }
}

/// Linear-blend skinning of a mesh by a joint palette. Joints outside the
/// palette are treated as identity.
pub fn skin_mesh(mesh: &Mesh, palette: &[Mat4]) -> Mesh {
    let Some(skin) = &mesh.skin else {
        return mesh.clone();
    };
    let joint = |j: u16| palette.get(j as usize).copied().unwrap_or(Mat4::IDENTITY);
    let vertices: Vec<Vertex> = mesh
        .vertices
        .iter()
        .zip(skin.joints.iter().zip(&skin.weights))
        .map(|(v, (joints, weights))| {
            let mut m = Mat4::ZERO;
            let mut total = 0.0;
            for (j, w) in joints.iter().zip(weights) {
                if *w > 0.0 {
                    m += joint(*j) * *w;
                    total += *w;
                }
            }
            if total <= 0.0 {
                m = Mat4::IDENTITY;
            }
            let position = m * Vec4::from((Vec3::from(v.position), 1.0));
            let normal = (Mat3::from_mat4(m) * Vec3::from(v.normal)).normalize_or(Vec3::Y);
            Vertex {
                position: position.truncate().to_array(),
                normal: normal.to_array(),
                uv: v.uv,
            }
        })
        .collect();
    let points: Vec<Vec3> = vertices.iter().map(|v| Vec3::from(v.position)).collect();
    Mesh {
        bounds: Aabb::from_points(&points).unwrap_or(mesh.bounds),
        vertices,
        indices: mesh.indices.clone(),
        skin: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{MemoryAssetStore, Skin};
    use crate::camera::Camera;
    use crate::objects::StaticObject;
    use umbra_terrain::{FinestPolicy, Heightmap, Landscape, LandscapeDesc};

    struct Fixture {
        assets: MemoryAssetStore,
        placeholders: Placeholders,
        camera: FrameCamera,
        sky: SkyState,
    }

    impl Fixture {
        fn new() -> Self {
            let camera = Camera::looking_at(Vec3::new(0.0, 20.0, 30.0), Vec3::ZERO);
            Self {
                assets: MemoryAssetStore::new(),
                placeholders: Placeholders::default(),
                camera: FrameCamera::snapshot(&camera, 1.0),
                sky: SkyState::default(),
            }
        }

        fn build(&self, objects: Vec<RenderObject>) -> PreparedScene {
            let ctx = SceneContext {
                assets: &self.assets,
                placeholders: &self.placeholders,
                camera: &self.camera,
                lod: &FinestPolicy,
                sky: &self.sky,
                show_lod_bounds: false,
            };
            PreparedScene::build(objects, &ctx, &mut ResourceLog::new()).unwrap()
        }
    }

    fn small_landscape() -> LandscapeHandle {
        let desc = LandscapeDesc {
            chunk_size: 4,
            ..LandscapeDesc::default()
        };
        Landscape::new(desc, Heightmap::flat(9, 9, 0.25))
            .unwrap()
            .into_handle()
    }

    #[test]
    fn test_unknown_mesh_uses_placeholder() {
        let fixture = Fixture::new();
        let scene = fixture.build(vec![StaticObject::new("missing", Mat4::IDENTITY).into()]);
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.stats.resource_warnings, 1);
        assert!(Arc::ptr_eq(&scene.meshes[0].mesh, &fixture.placeholders.mesh));
    }

    #[test]
    fn test_missing_texture_is_magenta_and_absent_texture_is_white() {
        let fixture = Fixture::new();
        fixture.assets.insert_mesh("cube", Mesh::cube());
        let scene = fixture.build(vec![
            StaticObject::new("cube", Mat4::IDENTITY).with_texture("nope.png").into(),
            StaticObject::new("cube", Mat4::IDENTITY).into(),
        ]);
        assert!(Arc::ptr_eq(&scene.meshes[0].albedo, &fixture.placeholders.missing));
        assert!(Arc::ptr_eq(&scene.meshes[1].albedo, &fixture.placeholders.white));
        assert_eq!(scene.stats.resource_warnings, 1);
    }

    #[test]
    fn test_offscreen_mesh_is_culled_but_kept_for_shadows() {
        let fixture = Fixture::new();
        fixture.assets.insert_mesh("cube", Mesh::cube());
        let behind = Mat4::from_translation(Vec3::new(0.0, 20.0, 200.0));
        let scene = fixture.build(vec![StaticObject::new("cube", behind).into()]);
        assert_eq!(scene.meshes.len(), 1);
        assert!(!scene.meshes[0].visible);
        assert_eq!(scene.stats.culled, 1);
    }

    #[test]
    fn test_landscape_selection_covers_every_chunk() {
        let fixture = Fixture::new();
        let scene = fixture.build(vec![small_landscape().into()]);
        assert_eq!(scene.terrain.len(), 4);
        assert_eq!(scene.stats.terrain_nodes, 4);
    }

    #[test]
    fn test_landscape_submitted_twice_is_drawn_once() {
        let fixture = Fixture::new();
        let handle = small_landscape();
        let scene = fixture.build(vec![handle.clone().into(), handle.into()]);
        assert_eq!(scene.terrain.len(), 4);
        assert_eq!(scene.stats.terrain_nodes, 4);
    }

    #[test]
    fn test_dirty_chunks_are_refreshed_before_drawing() {
        let fixture = Fixture::new();
        let handle = small_landscape();
        handle
            .write()
            .unwrap()
            .paint_height(Vec2::ZERO, 2.0, 0.5, 1.0);
        let scene = fixture.build(vec![handle.clone().into()]);
        assert!(scene.stats.refreshed_chunks > 0);
        assert_eq!(handle.read().unwrap().dirty_chunk_count(), 0);
    }

    #[test]
    fn test_poisoned_landscape_is_a_render_error() {
        let fixture = Fixture::new();
        let handle = small_landscape();
        let clone = handle.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.write().unwrap();
            panic!("editor crashed");
        })
        .join();
        let ctx = SceneContext {
            assets: &fixture.assets,
            placeholders: &fixture.placeholders,
            camera: &fixture.camera,
            lod: &FinestPolicy,
            sky: &fixture.sky,
            show_lod_bounds: false,
        };
        let result = PreparedScene::build(vec![handle.into()], &ctx, &mut ResourceLog::new());
        assert!(matches!(result, Err(RenderError::LandscapeLock)));
    }

    #[test]
    fn test_brush_drapes_over_landscape() {
        let fixture = Fixture::new();
        let scene = fixture.build(vec![
            RenderObject::Paint {
                position: Vec3::ZERO,
                radius: 1.0,
            },
            small_landscape().into(),
        ]);
        // Flat at 0.25 * vertical scale 32.
        let ring = &scene.overlay.lines[0];
        assert!((ring.start.y - 8.05).abs() < 1e-3, "{}", ring.start.y);
    }

    #[test]
    fn test_sea_follows_camera_when_enabled() {
        let mut fixture = Fixture::new();
        fixture.sky.sea_enabled = true;
        fixture.sky.sea_level = -2.0;
        let scene = fixture.build(Vec::new());
        let sea = scene.sea.expect("sea enabled");
        assert_eq!(sea.level, -2.0);
        assert_eq!(sea.center, Vec2::new(0.0, 30.0));
        let mesh = sea.mesh();
        let a = Vec3::from(mesh.vertices[0].position);
        let b = Vec3::from(mesh.vertices[3].position);
        let c = Vec3::from(mesh.vertices[1].position);
        assert!((b - a).cross(c - a).y > 0.0);
    }

    #[test]
    fn test_skinning_blends_joint_matrices() {
        let mesh = Mesh::new(
            vec![Vertex::new(Vec3::ZERO, Vec3::Y, Vec2::ZERO)],
            Vec::new(),
        )
        .with_skin(Skin {
            joints: vec![[0, 1, 0, 0]],
            weights: vec![[0.5, 0.5, 0.0, 0.0]],
        })
        .unwrap();
        let palette = [
            Mat4::from_translation(Vec3::X * 2.0),
            Mat4::from_translation(Vec3::Z * 4.0),
        ];
        let posed = skin_mesh(&mesh, &palette);
        assert_eq!(Vec3::from(posed.vertices[0].position), Vec3::new(1.0, 0.0, 2.0));
        assert!(posed.skin.is_none());
    }
}
