//! CPU implementation of every pass.
//!
//! Targets are plain vectors sized by the [`TargetLayout`]. The software
//! backend needs no device, which makes it the reference for tests and the
//! fallback when no adapter is available.

use glam::{Mat3, Vec2, Vec3, Vec3Swizzles, Vec4Swizzles};

use super::raster::{self, ClipVertex, Fragment, Viewport, to_clip};
use super::{FrameData, RenderBackend};
use crate::camera::FrameCamera;
use crate::error::RenderError;
use crate::exposure::log_average_luminance;
use crate::post::{PostEffect, glitch_uvs, tonemap};
use crate::shadow::{CASCADE_COUNT, CascadeSet};
use crate::sky::{SEA_ALBEDO, smoothstep};
use crate::targets::TargetLayout;

/// Depth of the cleared buffers (the far plane in reverse-Z).
const CLEAR_DEPTH: f32 = 0.0;

/// Reverse-Z slack when comparing an occlusion sample to the stored depth.
const OCCLUSION_EPSILON: f32 = 1e-6;

struct DepthMap {
    size: u32,
    texels: Vec<f32>,
}

impl DepthMap {
    fn new(size: u32) -> Self {
        Self {
            size,
            texels: vec![CLEAR_DEPTH; (size * size) as usize],
        }
    }

    fn clear(&mut self) {
        self.texels.fill(CLEAR_DEPTH);
    }

    fn keep_nearest(&mut self, x: u32, y: u32, depth: f32) {
        let texel = &mut self.texels[(y * self.size + x) as usize];
        if depth > *texel {
            *texel = depth;
        }
    }

    fn texel(&self, x: i32, y: i32) -> f32 {
        let max = self.size as i32 - 1;
        let (x, y) = (x.clamp(0, max), y.clamp(0, max));
        self.texels[(y as u32 * self.size + x as u32) as usize]
    }
}

struct Targets {
    layout: TargetLayout,
    viewport: Viewport,
    albedo: Vec<Vec3>,
    normal: Vec<Vec3>,
    depth: Vec<f32>,
    occlusion: Vec<f32>,
    hdr: Vec<Vec3>,
    ldr_front: Vec<Vec3>,
    ldr_back: Vec<Vec3>,
    shadows: [DepthMap; CASCADE_COUNT],
}

impl Targets {
    fn new(layout: TargetLayout) -> Self {
        let viewport = Viewport::new(layout.width, layout.height);
        let n = viewport.pixel_count();
        Self {
            layout,
            viewport,
            albedo: vec![Vec3::ZERO; n],
            normal: vec![Vec3::Y; n],
            depth: vec![CLEAR_DEPTH; n],
            occlusion: vec![1.0; n],
            hdr: vec![Vec3::ZERO; n],
            ldr_front: vec![Vec3::ZERO; n],
            ldr_back: vec![Vec3::ZERO; n],
            shadows: std::array::from_fn(|i| DepthMap::new(layout.shadow_resolutions[i])),
        }
    }

    /// Depth-tested G-buffer write.
    fn write_surface(&mut self, x: u32, y: u32, depth: f32, albedo: Vec3, normal: Vec3) {
        let i = self.viewport.index(x, y);
        if depth >= self.depth[i] {
            self.depth[i] = depth;
            self.albedo[i] = albedo;
            self.normal[i] = normal.normalize_or(Vec3::Y);
        }
    }
}

/// Renders on the CPU.
#[derive(Default)]
pub struct SoftwareBackend {
    targets: Option<Targets>,
    luminance: Option<f32>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn targets(&mut self) -> Result<&mut Targets, RenderError> {
        self.targets.as_mut().ok_or(RenderError::TargetsNotCreated)
    }

    /// Reverse-Z depth stored at a pixel by the last geometry pass.
    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        let t = self.targets.as_ref()?;
        (x < t.viewport.width && y < t.viewport.height).then(|| t.depth[t.viewport.index(x, y)])
    }

    /// Occlusion factor at a pixel from the last occlusion pass.
    pub fn occlusion_at(&self, x: u32, y: u32) -> Option<f32> {
        let t = self.targets.as_ref()?;
        (x < t.viewport.width && y < t.viewport.height).then(|| t.occlusion[t.viewport.index(x, y)])
    }

    /// Linear HDR color at a pixel from the last lighting pass.
    pub fn hdr_at(&self, x: u32, y: u32) -> Option<Vec3> {
        let t = self.targets.as_ref()?;
        (x < t.viewport.width && y < t.viewport.height).then(|| t.hdr[t.viewport.index(x, y)])
    }
}

impl RenderBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_targets(&mut self, layout: TargetLayout) -> Result<(), RenderError> {
        log::debug!(
            "Creating software targets {}x{} (shadows {:?})",
            layout.width,
            layout.height,
            layout.shadow_resolutions
        );
        self.targets = Some(Targets::new(layout));
        self.luminance = None;
        Ok(())
    }

    fn destroy_targets(&mut self) {
        self.targets = None;
        self.luminance = None;
    }

    fn layout(&self) -> Option<TargetLayout> {
        self.targets.as_ref().map(|t| t.layout)
    }

    fn shadow_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let targets = self.targets()?;
        let scene = frame.scene;
        for (map, cascade) in targets.shadows.iter_mut().zip(&frame.cascades.cascades) {
            map.clear();
            let viewport = Viewport::new(map.size, map.size);
            let light = cascade.light_view_proj;
            for draw in scene.meshes.iter().filter(|d| d.casts_shadows) {
                for model in &draw.instances {
                    let mvp = light * *model;
                    raster::draw_indexed(
                        &viewport,
                        &draw.mesh.indices,
                        |i| {
                            draw.mesh.vertices.get(i).map(|v| ClipVertex {
                                clip: to_clip(&mvp, Vec3::from(v.position)),
                                attrs: [],
                            })
                        },
                        |f: &Fragment<0>| map.keep_nearest(f.x, f.y, f.depth),
                    );
                }
            }
            for terrain in &scene.terrain {
                raster::draw_indexed(
                    &viewport,
                    &terrain.mesh.indices,
                    |i| {
                        terrain.mesh.vertices.get(i).map(|v| ClipVertex {
                            clip: to_clip(&light, Vec3::from(v.position)),
                            attrs: [],
                        })
                    },
                    |f: &Fragment<0>| map.keep_nearest(f.x, f.y, f.depth),
                );
            }
        }
        Ok(())
    }

    fn geometry_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let targets = self.targets()?;
        let viewport = targets.viewport;
        targets.depth.fill(CLEAR_DEPTH);
        targets.albedo.fill(Vec3::ZERO);
        targets.normal.fill(Vec3::Y);

        let view_proj = frame.camera.view_proj;
        for draw in frame.scene.meshes.iter().filter(|d| d.visible) {
            for model in &draw.instances {
                let mvp = view_proj * *model;
                let normal_matrix = Mat3::from_mat4(*model).inverse().transpose();
                raster::draw_indexed(
                    &viewport,
                    &draw.mesh.indices,
                    |i| {
                        draw.mesh.vertices.get(i).map(|v| {
                            let n = normal_matrix * Vec3::from(v.normal);
                            ClipVertex {
                                clip: to_clip(&mvp, Vec3::from(v.position)),
                                attrs: [n.x, n.y, n.z, v.uv[0], v.uv[1]],
                            }
                        })
                    },
                    |f: &Fragment<5>| {
                        let [nx, ny, nz, u, v] = f.attrs;
                        let albedo = draw.albedo.sample(Vec2::new(u, v)).xyz();
                        targets.write_surface(f.x, f.y, f.depth, albedo, Vec3::new(nx, ny, nz));
                    },
                );
            }
        }

        for terrain in &frame.scene.terrain {
            raster::draw_indexed(
                &viewport,
                &terrain.mesh.indices,
                |i| {
                    terrain.mesh.vertices.get(i).map(|v| {
                        let [nx, ny, nz] = v.normal;
                        let [w0, w1, w2, w3] = v.weights;
                        ClipVertex {
                            clip: to_clip(&view_proj, Vec3::from(v.position)),
                            attrs: [nx, ny, nz, v.uv[0], v.uv[1], w0, w1, w2, w3],
                        }
                    })
                },
                |f: &Fragment<9>| {
                    let [nx, ny, nz, u, v, weights @ ..] = f.attrs;
                    let uv = Vec2::new(u, v) * terrain.tiling;
                    let total: f32 = weights.iter().sum();
                    let albedo = if total > 0.0 {
                        weights
                            .iter()
                            .zip(&terrain.ground)
                            .map(|(w, tex)| tex.sample(uv).xyz() * *w)
                            .sum::<Vec3>()
                            / total
                    } else {
                        terrain.ground[0].sample(uv).xyz()
                    };
                    targets.write_surface(f.x, f.y, f.depth, albedo, Vec3::new(nx, ny, nz));
                },
            );
        }

        if let Some(sea) = frame.scene.sea {
            let mesh = sea.mesh();
            raster::draw_indexed(
                &viewport,
                &mesh.indices,
                |i| {
                    mesh.vertices.get(i).map(|v| ClipVertex {
                        clip: to_clip(&view_proj, Vec3::from(v.position)),
                        attrs: [],
                    })
                },
                |f: &Fragment<0>| targets.write_surface(f.x, f.y, f.depth, SEA_ALBEDO, Vec3::Y),
            );
        }
        Ok(())
    }

    fn occlusion_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let targets = self.targets()?;
        let kernel = frame.ssao;
        if !kernel.enabled || kernel.samples.is_empty() {
            targets.occlusion.fill(1.0);
            return Ok(());
        }
        let viewport = targets.viewport;
        let camera = frame.camera;
        for y in 0..viewport.height {
            for x in 0..viewport.width {
                let i = viewport.index(x, y);
                let depth = targets.depth[i];
                if depth <= CLEAR_DEPTH {
                    targets.occlusion[i] = 1.0;
                    continue;
                }
                let ndc = viewport.to_ndc(x, y);
                let p = camera.unproject(ndc.x, ndc.y, depth);
                let n = targets.normal[i];
                let rot = kernel.rotation_at(x, y);
                let r = Vec3::new(rot.x, rot.y, 0.0);
                let tangent = (r - n * n.dot(r)).normalize_or(n.any_orthonormal_vector());
                let bitangent = n.cross(tangent);
                let p_depth = camera.view_depth(p);

                let mut occluded = 0.0;
                for s in &kernel.samples {
                    let sample = p + (tangent * s.x + bitangent * s.y + n * s.z) * kernel.radius;
                    let Some((sx, sy, sample_depth)) = project(camera, &viewport, sample) else {
                        continue;
                    };
                    let scene_depth = targets.depth[viewport.index(sx, sy)];
                    if scene_depth <= CLEAR_DEPTH || scene_depth <= sample_depth + OCCLUSION_EPSILON {
                        continue;
                    }
                    let sndc = viewport.to_ndc(sx, sy);
                    let scene_point = camera.unproject(sndc.x, sndc.y, scene_depth);
                    let gap = (p_depth - camera.view_depth(scene_point)).abs().max(1e-6);
                    occluded += smoothstep(0.0, 1.0, kernel.radius / gap);
                }
                let fraction = occluded / kernel.samples.len() as f32;
                targets.occlusion[i] = (1.0 - kernel.strength * fraction).clamp(0.0, 1.0);
            }
        }
        Ok(())
    }

    fn lighting_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let targets = self.targets()?;
        let viewport = targets.viewport;
        let camera = frame.camera;
        let sky = frame.sky;
        let to_sun = -frame.cascades.light_dir;
        let sun = sky.sun_color();
        let ambient = sky.ambient_color();

        for y in 0..viewport.height {
            for x in 0..viewport.width {
                let i = viewport.index(x, y);
                let depth = targets.depth[i];
                let ndc = viewport.to_ndc(x, y);
                if depth <= CLEAR_DEPTH {
                    targets.hdr[i] = if sky.sky_enabled {
                        let dir = (camera.unproject(ndc.x, ndc.y, 1.0) - camera.position)
                            .normalize_or(camera.forward);
                        sky.sky_color(dir)
                    } else {
                        Vec3::ZERO
                    };
                    continue;
                }
                let p = camera.unproject(ndc.x, ndc.y, depth);
                let n = targets.normal[i];
                let albedo = targets.albedo[i];

                let mut color = ambient * albedo * targets.occlusion[i];
                let n_dot_l = n.dot(to_sun);
                if n_dot_l > 0.0 {
                    let visibility = shadow_visibility(
                        &targets.shadows,
                        frame.cascades,
                        p,
                        camera.view_depth(p),
                        frame.depth_bias,
                    );
                    color += sun * albedo * n_dot_l * visibility;
                }
                color += albedo * frame.lights.irradiance(p, n);
                targets.hdr[i] = color;
            }
        }

        let scale_y = camera.proj.y_axis.y * viewport.height as f32 * 0.5;
        for particle in &frame.scene.particles {
            let clip = to_clip(&camera.view_proj, particle.position);
            if clip.w <= 1e-5 {
                continue;
            }
            let ndc = clip.xyz() / clip.w;
            if !(0.0..=1.0).contains(&ndc.z) {
                continue;
            }
            let center = viewport.to_screen(ndc.xy());
            let radius = particle.size * scale_y / clip.w;
            if radius < 0.5 {
                continue;
            }
            let min = (center - radius).floor().max(Vec2::ZERO);
            let max = (center + radius)
                .ceil()
                .min(Vec2::new(viewport.width as f32, viewport.height as f32));
            for py in min.y as u32..max.y.max(min.y) as u32 {
                for px in min.x as u32..max.x.max(min.x) as u32 {
                    let d = Vec2::new(px as f32 + 0.5, py as f32 + 0.5).distance(center) / radius;
                    let i = viewport.index(px, py);
                    if d >= 1.0 || ndc.z < targets.depth[i] {
                        continue;
                    }
                    let falloff = (1.0 - d * d).powi(2);
                    targets.hdr[i] += particle.color * falloff;
                }
            }
        }

        let luminance = log_average_luminance(targets.hdr.iter().map(|c| c.to_array()));
        self.luminance = luminance;
        Ok(())
    }

    fn tonemap_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let targets = self.targets()?;
        for (ldr, hdr) in targets.ldr_front.iter_mut().zip(&targets.hdr) {
            *ldr = tonemap(*hdr, frame.exposure);
        }
        Ok(())
    }

    fn post_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let targets = self.targets()?;
        let viewport = targets.viewport;
        let post = frame.post;
        let effects = post.active_effects();
        if effects.is_empty() {
            targets.ldr_back.copy_from_slice(&targets.ldr_front);
            return Ok(());
        }
        for effect in effects {
            {
                let (front, back) = (&targets.ldr_front, &mut targets.ldr_back);
                for y in 0..viewport.height {
                    for x in 0..viewport.width {
                        let i = viewport.index(x, y);
                        let uv = viewport.to_uv(x, y);
                        back[i] = match effect {
                            PostEffect::ColorCorrection => match &post.color_correction {
                                Some(lut) => lut.apply(front[i]),
                                None => front[i],
                            },
                            PostEffect::Vignetting => match &post.vignetting {
                                Some(mask) => front[i] * mask.sample(uv).xyz(),
                                None => front[i],
                            },
                            PostEffect::Glitch => {
                                let [r, g, b] = glitch_uvs(uv, post.time, post.seed, post.glitch);
                                Vec3::new(
                                    sample_clamped(front, &viewport, r).x,
                                    sample_clamped(front, &viewport, g).y,
                                    sample_clamped(front, &viewport, b).z,
                                )
                            }
                        };
                    }
                }
            }
            std::mem::swap(&mut targets.ldr_front, &mut targets.ldr_back);
        }
        Ok(())
    }

    fn overlay_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let targets = self.targets()?;
        let viewport = targets.viewport;
        let view_proj = frame.camera.view_proj;
        for line in &frame.scene.overlay.lines {
            let color = line.color.clamp(Vec3::ZERO, Vec3::ONE);
            raster::draw_line(
                &viewport,
                to_clip(&view_proj, line.start),
                to_clip(&view_proj, line.end),
                |x, y| targets.ldr_front[viewport.index(x, y)] = color,
            );
        }
        Ok(())
    }

    fn average_luminance(&self) -> Option<f32> {
        self.luminance
    }

    fn read_final(&mut self) -> Result<image::RgbaImage, RenderError> {
        let targets = self.targets()?;
        let viewport = targets.viewport;
        let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Ok(image::RgbaImage::from_fn(viewport.width, viewport.height, |x, y| {
            let c = targets.ldr_front[viewport.index(x, y)];
            image::Rgba([to_u8(c.x), to_u8(c.y), to_u8(c.z), 255])
        }))
    }
}

/// Pixel and reverse-Z depth of a world point, if it lands on screen.
fn project(camera: &FrameCamera, viewport: &Viewport, world: Vec3) -> Option<(u32, u32, f32)> {
    let clip = to_clip(&camera.view_proj, world);
    if clip.w <= 1e-5 {
        return None;
    }
    let ndc = clip.xyz() / clip.w;
    let screen = viewport.to_screen(ndc.xy());
    if screen.x < 0.0
        || screen.y < 0.0
        || screen.x >= viewport.width as f32
        || screen.y >= viewport.height as f32
    {
        return None;
    }
    Some((screen.x as u32, screen.y as u32, ndc.z))
}

/// Fraction of a 2×2 texel footprint that sees the sun.
fn shadow_visibility(
    maps: &[DepthMap; CASCADE_COUNT],
    cascades: &CascadeSet,
    world: Vec3,
    view_depth: f32,
    bias: f32,
) -> f32 {
    let index = cascades.select(view_depth);
    let map = &maps[index];
    let clip = to_clip(&cascades.cascades[index].light_view_proj, world);
    let ndc = clip.xyz() / clip.w;
    if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || !(0.0..=1.0).contains(&ndc.z) {
        return 1.0;
    }
    let size = map.size as f32;
    let fx = (ndc.x * 0.5 + 0.5) * size - 0.5;
    let fy = (0.5 - ndc.y * 0.5) * size - 0.5;
    let (x0, y0) = (fx.floor() as i32, fy.floor() as i32);
    let mut lit = 0;
    for dy in 0..2 {
        for dx in 0..2 {
            // Larger depth is closer to the light.
            if map.texel(x0 + dx, y0 + dy) <= ndc.z + bias {
                lit += 1;
            }
        }
    }
    lit as f32 / 4.0
}

fn sample_clamped(image: &[Vec3], viewport: &Viewport, uv: Vec2) -> Vec3 {
    let x = (uv.x * viewport.width as f32).clamp(0.0, viewport.width as f32 - 1.0) as u32;
    let y = (uv.y * viewport.height as f32).clamp(0.0, viewport.height as f32 - 1.0) as u32;
    image[viewport.index(x, y)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{Mesh, Texture};
    use crate::camera::Camera;
    use crate::lights::{Light, LightSet};
    use crate::post::PostSettings;
    use crate::prepare::{MeshDraw, PreparedScene};
    use crate::shadow::SplitScheme;
    use crate::sky::SkyState;
    use crate::ssao::SsaoKernel;
    use glam::Mat4;
    use std::sync::Arc;

    const LAYOUT: TargetLayout = TargetLayout {
        width: 48,
        height: 32,
        shadow_resolutions: [128, 64, 64],
    };

    struct Fixture {
        camera: FrameCamera,
        cascades: CascadeSet,
        scene: PreparedScene,
        lights: LightSet,
        sky: SkyState,
        ssao: SsaoKernel,
        post: PostSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let mut eye = Camera::looking_at(Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO);
            eye.far = 20.0;
            let camera = FrameCamera::snapshot(&eye, LAYOUT.aspect());
            let mut sky = SkyState::new(0.5, 0);
            sky.sky_enabled = false;
            let cascades = CascadeSet::compute(
                &camera,
                sky.light_dir(),
                SplitScheme::Practical { lambda: 0.5 },
                LAYOUT.shadow_resolutions,
            );
            Self {
                camera,
                cascades,
                scene: PreparedScene::default(),
                lights: LightSet::new(),
                sky,
                ssao: SsaoKernel::new(16, 0.5, 1.0, 7),
                post: PostSettings::default(),
            }
        }

        fn with_mesh(mut self, mesh: Mesh, model: Mat4) -> Self {
            self.scene.meshes.push(MeshDraw {
                mesh: Arc::new(mesh),
                albedo: Arc::new(Texture::solid([200, 200, 200, 255])),
                instances: vec![model],
                casts_shadows: true,
                visible: true,
            });
            self
        }

        fn frame(&self) -> FrameData<'_> {
            FrameData {
                index: 0,
                camera: &self.camera,
                cascades: &self.cascades,
                scene: &self.scene,
                lights: &self.lights,
                sky: &self.sky,
                ssao: &self.ssao,
                post: &self.post,
                exposure: 1.0,
                depth_bias: 1e-4,
            }
        }
    }

    fn run_all(backend: &mut SoftwareBackend, frame: &FrameData<'_>) {
        backend.shadow_pass(frame).unwrap();
        backend.geometry_pass(frame).unwrap();
        backend.occlusion_pass(frame).unwrap();
        backend.lighting_pass(frame).unwrap();
        backend.tonemap_pass(frame).unwrap();
        backend.post_pass(frame).unwrap();
        backend.overlay_pass(frame).unwrap();
    }

    fn ground() -> Mat4 {
        Mat4::from_scale(Vec3::new(20.0, 0.1, 20.0))
    }

    #[test]
    fn test_passes_fail_without_targets() {
        let fixture = Fixture::new();
        let mut backend = SoftwareBackend::new();
        assert!(matches!(
            backend.geometry_pass(&fixture.frame()),
            Err(RenderError::TargetsNotCreated)
        ));
        assert!(backend.read_final().is_err());
    }

    #[test]
    fn test_geometry_writes_reverse_z_depth() {
        let fixture = Fixture::new().with_mesh(Mesh::cube(), Mat4::IDENTITY);
        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        backend.geometry_pass(&fixture.frame()).unwrap();
        let center = backend.depth_at(24, 16).unwrap();
        let corner = backend.depth_at(0, 0).unwrap();
        assert!(center > 0.0 && center <= 1.0);
        assert_eq!(corner, 0.0);
    }

    #[test]
    fn test_nearer_surface_wins_depth_test() {
        let near = Mat4::from_translation(Vec3::new(0.0, 1.5, 3.0));
        let fixture = Fixture::new()
            .with_mesh(Mesh::cube(), Mat4::IDENTITY)
            .with_mesh(Mesh::cube(), near);
        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        backend.geometry_pass(&fixture.frame()).unwrap();
        let both = backend.depth_at(24, 16).unwrap();

        let only_far = Fixture::new().with_mesh(Mesh::cube(), Mat4::IDENTITY);
        backend.geometry_pass(&only_far.frame()).unwrap();
        assert!(both > backend.depth_at(24, 16).unwrap());
    }

    #[test]
    fn test_disabled_occlusion_is_white() {
        let mut fixture = Fixture::new().with_mesh(Mesh::cube(), ground());
        fixture.ssao.enabled = false;
        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        let frame = fixture.frame();
        backend.geometry_pass(&frame).unwrap();
        backend.occlusion_pass(&frame).unwrap();
        assert_eq!(backend.occlusion_at(24, 20), Some(1.0));
    }

    #[test]
    fn test_corner_is_more_occluded_than_open_floor() {
        let wall = Mat4::from_translation(Vec3::new(0.0, 1.0, -0.5)) * Mat4::from_scale(Vec3::new(20.0, 2.0, 1.0));
        let fixture = Fixture::new().with_mesh(Mesh::cube(), ground()).with_mesh(Mesh::cube(), wall);
        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        let frame = fixture.frame();
        backend.geometry_pass(&frame).unwrap();
        backend.occlusion_pass(&frame).unwrap();
        let occlusion: Vec<f32> = (0..LAYOUT.height)
            .filter_map(|y| backend.occlusion_at(24, y))
            .collect();
        assert!(occlusion.iter().all(|o| (0.0..=1.0).contains(o)));
        assert!(occlusion.iter().any(|&o| o < 1.0));
    }

    #[test]
    fn test_caster_shadows_the_ground() {
        // At noon the sun sits overhead, tilted towards +z.
        let caster = Mat4::from_translation(Vec3::new(0.0, 1.5, 0.45));
        let mut lit = Fixture::new().with_mesh(Mesh::cube(), ground());
        lit.scene.meshes[0].casts_shadows = false;
        let mut shadowed = Fixture::new()
            .with_mesh(Mesh::cube(), ground())
            .with_mesh(Mesh::cube(), caster);
        shadowed.scene.meshes[0].casts_shadows = false;
        let point = Vec3::new(0.0, 0.05, 0.0);

        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        let frame = lit.frame();
        backend.shadow_pass(&frame).unwrap();
        let targets = backend.targets.as_ref().unwrap();
        let open = shadow_visibility(&targets.shadows, frame.cascades, point, frame.camera.view_depth(point), 1e-4);

        let frame = shadowed.frame();
        backend.shadow_pass(&frame).unwrap();
        let targets = backend.targets.as_ref().unwrap();
        let covered = shadow_visibility(&targets.shadows, frame.cascades, point, frame.camera.view_depth(point), 1e-4);

        assert_eq!(open, 1.0);
        assert!(covered < 1.0);
    }

    #[test]
    fn test_point_light_brightens_surface() {
        let dark = {
            let mut f = Fixture::new().with_mesh(Mesh::cube(), ground());
            f.sky = SkyState::new(0.0, 0);
            f.sky.sky_enabled = false;
            f
        };
        let mut lit = Fixture::new().with_mesh(Mesh::cube(), ground());
        lit.sky = dark.sky.clone();
        lit.lights.add(Light::new(Vec3::new(0.0, 1.0, 0.0), 10.0, 10.0)).unwrap();

        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        run_all(&mut backend, &dark.frame());
        let before = backend.hdr_at(24, 20).unwrap();
        run_all(&mut backend, &lit.frame());
        let after = backend.hdr_at(24, 20).unwrap();
        assert!(after.x > before.x);
    }

    #[test]
    fn test_particles_add_light_in_front_of_geometry() {
        let position = Vec3::new(0.0, 0.5, 0.0);
        let mut fixture = Fixture::new().with_mesh(Mesh::cube(), ground());
        fixture.scene.particles.push(crate::objects::Particle {
            position,
            color: Vec3::new(5.0, 0.0, 0.0),
            size: 0.5,
        });
        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        let frame = fixture.frame();
        backend.geometry_pass(&frame).unwrap();
        backend.occlusion_pass(&frame).unwrap();
        backend.lighting_pass(&frame).unwrap();
        let viewport = Viewport::new(LAYOUT.width, LAYOUT.height);
        let (x, y, _) = project(frame.camera, &viewport, position).unwrap();
        let center = backend.hdr_at(x, y).unwrap();
        assert!(center.x > center.y + 1.0);
    }

    #[test]
    fn test_sky_fills_background() {
        let mut fixture = Fixture::new();
        fixture.sky.sky_enabled = true;
        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        run_all(&mut backend, &fixture.frame());
        assert!(backend.hdr_at(0, 0).unwrap().length() > 0.0);
        assert!(backend.average_luminance().is_some());
    }

    #[test]
    fn test_post_effects_leave_result_in_front() {
        let mut fixture = Fixture::new().with_mesh(Mesh::cube(), ground());
        fixture.post.vignetting = Some(Arc::new(Texture::solid([0, 0, 0, 255])));
        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        run_all(&mut backend, &fixture.frame());
        let image = backend.read_final().unwrap();
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn test_overlay_draws_over_final_image() {
        let mut fixture = Fixture::new();
        fixture
            .scene
            .overlay
            .line(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        run_all(&mut backend, &fixture.frame());
        let image = backend.read_final().unwrap();
        assert!(image.pixels().any(|p| p.0 == [0, 255, 0, 255]));
    }

    #[test]
    fn test_resize_changes_final_size() {
        let mut backend = SoftwareBackend::new();
        backend.create_targets(LAYOUT).unwrap();
        backend.create_targets(TargetLayout::new(10, 7, [16, 16, 16])).unwrap();
        assert_eq!(backend.read_final().unwrap().dimensions(), (10, 7));
        backend.destroy_targets();
        assert_eq!(backend.layout(), None);
    }
}
