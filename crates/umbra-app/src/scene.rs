//! The demo scene rendered by the headless app.

use std::path::Path;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec2, Vec3};
use tracing::{debug, info, warn};
use umbra_config::Config;
use umbra_render::{
    Camera, CapacityError, InstancedObject, Light, MemoryAssetStore, Mesh, Particle, RenderBackend,
    RenderObject, Renderer, StaticObject, Texture,
};
use umbra_terrain::{
    GROUND_TYPES, Heightmap, HeightmapParams, Landscape, LandscapeDesc, LandscapeHandle,
    TerrainError,
};

/// Chunks per landscape edge when the heightmap is generated.
const GENERATED_CHUNKS: u32 = 4;

/// Seconds for one camera orbit.
const ORBIT_PERIOD: f32 = 40.0;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("landscape: {0}")]
    Terrain(#[from] TerrainError),

    #[error("landscape lock poisoned")]
    LandscapeLock,
}

/// Assets, terrain and camera path of the demo.
pub struct DemoScene {
    assets: Arc<MemoryAssetStore>,
    landscape: LandscapeHandle,
    extent: f32,
}

impl DemoScene {
    /// Load the configured assets and build the landscape.
    ///
    /// Ground textures that fail to load are logged and left unresolved so
    /// the renderer falls back to its placeholder.
    pub fn build(config: &Config) -> Result<Self, SceneError> {
        let assets = Arc::new(MemoryAssetStore::new());
        assets.insert_mesh("cube", Mesh::cube());
        assets.insert_mesh("sphere", Mesh::uv_sphere(24, 16));
        assets.insert_texture("checker", Texture::checker(8));

        let root = &config.assets.root;
        let post_textures = config.assets.color_correction.iter().chain(&config.assets.vignetting);
        for key in post_textures.chain(&config.assets.ground_textures) {
            load_texture(&assets, root, key);
        }

        let heightmap = match &config.assets.heightmap {
            Some(path) => Heightmap::load_image(&root.join(path))?,
            None => {
                let samples = GENERATED_CHUNKS * config.terrain.chunk_size + 1;
                let params = HeightmapParams {
                    seed: config.renderer.seed,
                    ..HeightmapParams::default()
                };
                Heightmap::from_fbm(samples, samples, &params)
            }
        };

        let mut ground_textures: [Option<String>; GROUND_TYPES] = Default::default();
        for (slot, key) in ground_textures.iter_mut().zip(&config.assets.ground_textures) {
            *slot = Some(key.clone());
        }
        let desc = LandscapeDesc {
            chunk_size: config.terrain.chunk_size,
            ground_textures,
            ..LandscapeDesc::default()
        };
        let mut landscape = Landscape::new(desc, heightmap)?;
        // A raised ridge through the middle and a patch of the second ground type.
        landscape.paint_height(Vec2::new(0.0, 0.0), 12.0, 0.6, 0.5);
        if let Err(err) = landscape.paint_color(Vec2::new(-10.0, 8.0), 10.0, 1, 1.0) {
            warn!("Skipping ground paint: {err}");
        }
        let extent = landscape.extent();
        info!(
            "Demo landscape: {} chunks per side, extent {extent}",
            landscape.chunks_per_side()
        );

        Ok(Self {
            assets,
            landscape: landscape.into_handle(),
            extent,
        })
    }

    pub fn assets(&self) -> Arc<MemoryAssetStore> {
        Arc::clone(&self.assets)
    }

    pub fn landscape(&self) -> &LandscapeHandle {
        &self.landscape
    }

    /// Camera orbiting the landscape center at time `t` seconds.
    pub fn camera(&self, t: f32) -> Camera {
        let angle = t / ORBIT_PERIOD * std::f32::consts::TAU;
        let radius = self.extent * 0.6;
        let position = Vec3::new(angle.sin() * radius, self.extent * 0.35, angle.cos() * radius);
        Camera {
            far: self.extent * 2.0,
            ..Camera::looking_at(position, Vec3::ZERO)
        }
    }

    /// World height of the terrain under `(x, z)`.
    fn ground(&self, x: f32, z: f32) -> Result<f32, SceneError> {
        let landscape = self.landscape.read().map_err(|_| SceneError::LandscapeLock)?;
        Ok(landscape.height(Vec2::new(x, z)))
    }

    /// Submit the scene for one frame at time `t`.
    pub fn submit<B: RenderBackend>(&self, renderer: &mut Renderer<B>, t: f32) -> Result<(), SceneError> {
        renderer.set_camera(&self.camera(t));

        let cube_y = self.ground(0.0, 0.0)? + 2.0;
        let sphere_y = self.ground(6.0, -4.0)? + 1.5;
        let spin = Quat::from_rotation_y(t * 0.5);
        let objects: Vec<RenderObject> = vec![
            RenderObject::Landscape(Arc::clone(&self.landscape)),
            StaticObject::new(
                "cube",
                Mat4::from_scale_rotation_translation(Vec3::splat(2.0), spin, Vec3::new(0.0, cube_y, 0.0)),
            )
            .with_texture("checker")
            .into(),
            StaticObject::new(
                "sphere",
                Mat4::from_scale_rotation_translation(Vec3::splat(1.5), Quat::IDENTITY, Vec3::new(6.0, sphere_y, -4.0)),
            )
            .into(),
            InstancedObject {
                mesh: "cube".into(),
                texture: None,
                instances: self.pillars()?,
            }
            .into(),
            RenderObject::Particles(self.sparks(t)),
        ];
        for object in objects {
            if let Err(err) = renderer.add(object) {
                log_capacity(&err);
            }
        }

        for (i, color) in [Vec3::new(1.0, 0.6, 0.3), Vec3::new(0.3, 0.6, 1.0)].into_iter().enumerate() {
            let angle = t + i as f32 * std::f32::consts::PI;
            let x = angle.cos() * 8.0;
            let z = angle.sin() * 8.0;
            let mut light = Light::new(Vec3::new(x, self.ground(x, z)? + 3.0, z), 20.0, 12.0);
            light.color = color;
            if let Err(err) = renderer.add_dynamic_light(light) {
                log_capacity(&err);
            }
        }
        Ok(())
    }

    /// A ring of thin boxes standing on the terrain.
    fn pillars(&self) -> Result<Vec<Mat4>, SceneError> {
        (0..8)
            .map(|i| {
                let angle = i as f32 / 8.0 * std::f32::consts::TAU;
                let (x, z) = (angle.cos() * 14.0, angle.sin() * 14.0);
                let y = self.ground(x, z)? + 2.0;
                Ok(Mat4::from_scale_rotation_translation(
                    Vec3::new(0.5, 4.0, 0.5),
                    Quat::IDENTITY,
                    Vec3::new(x, y, z),
                ))
            })
            .collect()
    }

    fn sparks(&self, t: f32) -> Vec<Particle> {
        (0..16)
            .map(|i| {
                let phase = i as f32 * 0.39 + t;
                Particle {
                    position: Vec3::new(phase.cos() * 3.0, 6.0 + (phase * 2.0).sin(), phase.sin() * 3.0),
                    color: Vec3::new(2.0, 1.2, 0.4),
                    size: 0.25,
                }
            })
            .collect()
    }
}

fn load_texture(assets: &MemoryAssetStore, root: &Path, key: &str) {
    match assets.load_texture_file(key, &root.join(key)) {
        Ok(texture) => debug!("Loaded {key} ({}x{})", texture.width(), texture.height()),
        Err(err) => warn!("Texture {key} unavailable: {err}"),
    }
}

fn log_capacity(err: &CapacityError) {
    warn!("Dropped submission: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.terrain.chunk_size = 8;
        config
    }

    #[test]
    fn test_generated_landscape_has_four_chunks_per_side() {
        let scene = DemoScene::build(&small_config()).unwrap();
        let landscape = scene.landscape().read().unwrap();
        assert_eq!(landscape.chunks_per_side(), GENERATED_CHUNKS);
    }

    #[test]
    fn test_missing_ground_texture_is_not_fatal() {
        let mut config = small_config();
        config.assets.root = "/nonexistent".into();
        config.assets.ground_textures = vec!["grass.png".into()];
        let scene = DemoScene::build(&config).unwrap();
        let landscape = scene.landscape().read().unwrap();
        assert_eq!(landscape.desc().ground_textures[0].as_deref(), Some("grass.png"));
    }

    #[test]
    fn test_missing_heightmap_fails_build() {
        let mut config = small_config();
        config.assets.heightmap = Some("/nonexistent/height.png".into());
        assert!(matches!(DemoScene::build(&config), Err(SceneError::Terrain(_))));
    }

    #[test]
    fn test_camera_orbits_at_constant_distance() {
        let scene = DemoScene::build(&small_config()).unwrap();
        let a = scene.camera(0.0).position;
        let b = scene.camera(ORBIT_PERIOD / 4.0).position;
        assert!((a.length() - b.length()).abs() < 1e-3);
        assert!((a - b).length() > 1.0);
        let back = scene.camera(ORBIT_PERIOD).position;
        assert!((a - back).length() < 1e-2);
    }
}
