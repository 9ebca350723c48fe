//! The frame orchestrator.

use std::sync::Arc;

use glam::Vec3;
use umbra_config::Config;
use umbra_terrain::DistanceRatioPolicy;

use crate::assets::{AssetKey, AssetStore, Placeholders, ResourceLoadError};
use crate::backend::{FrameData, RenderBackend};
use crate::camera::{Camera, FrameCamera};
use crate::error::{CapacityError, RenderError};
use crate::exposure::Exposure;
use crate::graph::{FrameLedger, PassKind};
use crate::lights::{Light, LightSet};
use crate::objects::RenderObject;
use crate::post::{ColorLut, PostSettings};
use crate::prepare::{PreparedScene, ResourceLog, SceneContext};
use crate::queue::RenderQueue;
use crate::shadow::{CASCADE_COUNT, CascadeSet, SplitScheme};
use crate::sky::SkyState;
use crate::ssao::SsaoKernel;
use crate::targets::{TargetId, TargetLayout};

/// What one call to [`Renderer::render`] did.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    /// Frame counter, starting at 0.
    pub frame: u64,
    /// Passes executed, in order.
    pub passes: Vec<PassKind>,
    pub mesh_draws: usize,
    pub instances: usize,
    /// Mesh draws outside the view frustum.
    pub culled: usize,
    /// Terrain LOD nodes drawn.
    pub terrain_nodes: usize,
    pub particles: usize,
    pub overlay_lines: usize,
    /// Dynamic lights that contributed.
    pub lights: usize,
    pub dropped_objects: usize,
    pub dropped_lights: usize,
    /// Assets replaced by placeholders.
    pub resource_warnings: usize,
    /// Exposure the tone mapper used.
    pub exposure: f32,
    /// Target holding the final image.
    pub final_target: TargetId,
}

/// Owns the frame state and drives a [`RenderBackend`] through the passes.
pub struct Renderer<B: RenderBackend> {
    backend: B,
    assets: Arc<dyn AssetStore>,
    placeholders: Placeholders,
    resources: ResourceLog,
    camera: Camera,
    queue: RenderQueue,
    lights: LightSet,
    sky: SkyState,
    post: PostSettings,
    exposure: Exposure,
    ssao: SsaoKernel,
    split: SplitScheme,
    shadow_resolutions: [u32; CASCADE_COUNT],
    depth_bias: f32,
    lod: DistanceRatioPolicy,
    show_lod_bounds: bool,
    layout: TargetLayout,
    targets_valid: bool,
    frame: u64,
    time: f32,
}

impl<B: RenderBackend> Renderer<B> {
    /// Build a renderer and create its targets at the configured size.
    ///
    /// Post-effect textures named by the asset section are resolved now; a
    /// missing one is logged and its effect stays off.
    pub fn new(config: &Config, backend: B, assets: Arc<dyn AssetStore>) -> Result<Self, RenderError> {
        let r = &config.renderer;
        let mut sky = SkyState::new(r.time_of_day, r.seed);
        sky.sky_enabled = r.sky_enabled;
        sky.sea_enabled = r.sea_enabled;
        sky.sea_level = r.sea_level;

        let layout = TargetLayout::new(
            config.output.width,
            config.output.height,
            config.shadows.resolutions,
        );
        let mut renderer = Self {
            backend,
            assets,
            placeholders: Placeholders::default(),
            resources: ResourceLog::new(),
            camera: Camera::default(),
            queue: RenderQueue::new(r.max_render_objects),
            lights: LightSet::new(),
            sky,
            post: PostSettings {
                glitch: r.glitch.max(0.0),
                seed: r.seed,
                ..PostSettings::default()
            },
            exposure: Exposure::from_config(r),
            ssao: SsaoKernel::from_config(r),
            split: SplitScheme::from_config(&config.shadows),
            shadow_resolutions: layout.shadow_resolutions,
            depth_bias: config.shadows.depth_bias,
            lod: DistanceRatioPolicy {
                ratio: config.terrain.lod_ratio,
                max_coarse_depth: config.terrain.max_coarse_depth,
            },
            show_lod_bounds: config.debug.show_lod_bounds,
            layout,
            targets_valid: false,
            frame: 0,
            time: 0.0,
        };

        if let Some(key) = &config.assets.color_correction
            && let Err(err) = renderer.set_color_correction(Some(AssetKey::new(key)))
        {
            log::warn!("Color correction disabled: {err}");
        }
        if let Some(key) = &config.assets.vignetting
            && let Err(err) = renderer.set_vignetting(Some(AssetKey::new(key)))
        {
            log::warn!("Vignetting disabled: {err}");
        }

        renderer.backend.create_targets(layout)?;
        renderer.targets_valid = true;
        log::info!(
            "Renderer ready: {} backend, {}x{}, shadow maps {:?}",
            renderer.backend.name(),
            layout.width,
            layout.height,
            layout.shadow_resolutions
        );
        Ok(renderer)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Copy the camera used by the next frames.
    pub fn set_camera(&mut self, camera: &Camera) {
        self.camera = camera.clone();
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Use a color LUT (an N²×N strip) for color correction, or none.
    pub fn set_color_correction(&mut self, key: Option<AssetKey>) -> Result<(), ResourceLoadError> {
        self.post.color_correction = None;
        if let Some(key) = key {
            let texture = self.assets.texture(&key)?;
            self.post.color_correction = Some(ColorLut::new(&key, texture)?);
        }
        Ok(())
    }

    /// Multiply the final image by a texture, or stop doing so.
    pub fn set_vignetting(&mut self, key: Option<AssetKey>) -> Result<(), ResourceLoadError> {
        self.post.vignetting = match key {
            Some(key) => Some(self.assets.texture(&key)?),
            None => None,
        };
        Ok(())
    }

    /// Glitch strength; 0 disables the effect.
    pub fn set_glitch(&mut self, intensity: f32) {
        self.post.glitch = intensity.max(0.0);
    }

    pub fn set_sky_enabled(&mut self, enabled: bool) {
        self.sky.sky_enabled = enabled;
    }

    pub fn set_sea_enabled(&mut self, enabled: bool) {
        self.sky.sea_enabled = enabled;
    }

    /// Ambient color at full daylight.
    pub fn set_ambient(&mut self, ambient: Vec3) {
        self.sky.ambient = ambient;
    }

    /// Move the sun; the seed also drives the glitch pattern.
    pub fn set_time_of_day(&mut self, time_of_day: f32, seed: u64) {
        self.sky.set_time_of_day(time_of_day, seed);
        self.post.seed = seed;
    }

    pub fn sky(&self) -> &SkyState {
        &self.sky
    }

    pub fn exposure(&self) -> &Exposure {
        &self.exposure
    }

    /// Queue an object for the next frame.
    pub fn add(&mut self, object: impl Into<RenderObject>) -> Result<(), CapacityError> {
        self.queue.add(object.into())
    }

    /// Add a light to the next frame. Lights past the capacity are dropped.
    pub fn add_dynamic_light(&mut self, light: Light) -> Result<(), CapacityError> {
        self.lights.add(light)
    }

    /// Discard every object and light submitted for the next frame.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.lights.clear();
    }

    /// Objects waiting for the next frame.
    pub fn queued_objects(&self) -> usize {
        self.queue.len()
    }

    /// Lights waiting for the next frame.
    pub fn queued_lights(&self) -> usize {
        self.lights.len()
    }

    /// Change the output size. Targets are destroyed now and re-created at
    /// the new size before the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        let layout = TargetLayout::new(width, height, self.shadow_resolutions);
        if layout == self.layout && self.targets_valid {
            return;
        }
        log::info!("Resizing render targets to {}x{}", layout.width, layout.height);
        self.backend.destroy_targets();
        self.layout = layout;
        self.targets_valid = false;
    }

    /// Output size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.layout.width, self.layout.height)
    }

    /// Render one frame.
    ///
    /// The queue and the light set are drained whether or not the frame
    /// succeeds. Any error aborts the frame and is fatal.
    pub fn render(&mut self, dt: f32) -> Result<FrameReport, RenderError> {
        let (objects, dropped_objects) = self.queue.drain();
        let lights = std::mem::take(&mut self.lights);

        if !self.targets_valid || self.backend.layout() != Some(self.layout) {
            self.backend.create_targets(self.layout)?;
            self.targets_valid = true;
        }

        if let Some(luminance) = self.backend.average_luminance() {
            self.exposure.observe_luminance(luminance);
        }
        let exposure = self.exposure.adapt(dt);
        self.time += dt.max(0.0);
        self.post.time = self.time;

        let camera = FrameCamera::snapshot(&self.camera, self.layout.aspect());
        let cascades = CascadeSet::compute(
            &camera,
            self.sky.light_dir(),
            self.split,
            self.shadow_resolutions,
        );
        let ctx = SceneContext {
            assets: self.assets.as_ref(),
            placeholders: &self.placeholders,
            camera: &camera,
            lod: &self.lod,
            sky: &self.sky,
            show_lod_bounds: self.show_lod_bounds,
        };
        let scene = PreparedScene::build(objects, &ctx, &mut self.resources)?;

        let frame = FrameData {
            index: self.frame,
            camera: &camera,
            cascades: &cascades,
            scene: &scene,
            lights: &lights,
            sky: &self.sky,
            ssao: &self.ssao,
            post: &self.post,
            exposure,
            depth_bias: self.depth_bias,
        };
        let mut ledger = FrameLedger::new();
        for pass in PassKind::ORDER {
            ledger.begin(pass)?;
            run_pass(&mut self.backend, pass, &frame)?;
            log::trace!("Frame {}: {:?} pass done", self.frame, pass);
            ledger.complete(pass);
        }

        let stats = scene.stats;
        let report = FrameReport {
            frame: self.frame,
            passes: ledger.into_executed(),
            mesh_draws: stats.mesh_draws,
            instances: stats.instances,
            culled: stats.culled,
            terrain_nodes: stats.terrain_nodes,
            particles: stats.particles,
            overlay_lines: stats.overlay_lines,
            lights: lights.len(),
            dropped_objects,
            dropped_lights: lights.dropped(),
            resource_warnings: stats.resource_warnings,
            exposure,
            final_target: TargetId::LdrFront,
        };
        log::debug!(
            "Frame {}: {} mesh draws ({} culled), {} terrain nodes, {} lights, exposure {:.3}",
            report.frame,
            report.mesh_draws,
            report.culled,
            report.terrain_nodes,
            report.lights,
            report.exposure
        );
        self.frame += 1;
        Ok(report)
    }

    /// The final LDR image of the last frame.
    pub fn final_image(&mut self) -> Result<image::RgbaImage, RenderError> {
        if !self.targets_valid {
            return Err(RenderError::TargetsNotCreated);
        }
        self.backend.read_final()
    }
}

impl<B: RenderBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.backend.destroy_targets();
    }
}

fn run_pass<B: RenderBackend>(
    backend: &mut B,
    pass: PassKind,
    frame: &FrameData<'_>,
) -> Result<(), RenderError> {
    match pass {
        PassKind::Shadow => backend.shadow_pass(frame),
        PassKind::Geometry => backend.geometry_pass(frame),
        PassKind::Occlusion => backend.occlusion_pass(frame),
        PassKind::Lighting => backend.lighting_pass(frame),
        PassKind::ToneMap => backend.tonemap_pass(frame),
        PassKind::PostEffects => backend.post_pass(frame),
        PassKind::Overlay => backend.overlay_pass(frame),
    }
}
