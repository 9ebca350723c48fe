//! Cascaded shadow maps for the sun.
//!
//! The view depth range `[near, far]` is split into [`CASCADE_COUNT`]
//! contiguous slices. Each slice gets a tight orthographic light-space
//! matrix around its world-space corners and its own shadow map resolution,
//! giving sharp shadows near the camera and cheaper ones far away.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use umbra_config::{ShadowConfig, SplitKind};

use crate::camera::FrameCamera;

/// Number of shadow cascades.
pub const CASCADE_COUNT: usize = 3;

/// How far the light volume reaches past a slice towards the sun, so casters
/// outside the view slice still land in the map.
const CASTER_MARGIN: f32 = 200.0;

/// How the view depth range is divided between cascades.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SplitScheme {
    /// Equal depth ranges.
    Uniform,
    /// Geometric progression; equal ratio between consecutive splits.
    Logarithmic,
    /// `lambda * logarithmic + (1 - lambda) * uniform`.
    Practical { lambda: f32 },
}

impl SplitScheme {
    /// The scheme selected by the shadow configuration.
    pub fn from_config(config: &ShadowConfig) -> Self {
        match config.split {
            SplitKind::Uniform => SplitScheme::Uniform,
            SplitKind::Logarithmic => SplitScheme::Logarithmic,
            SplitKind::Practical => SplitScheme::Practical {
                lambda: config.lambda.clamp(0.0, 1.0),
            },
        }
    }

    /// Split distances: `near`, the interior splits, then `far`.
    ///
    /// The end points are the inputs themselves, and interior splits never
    /// decrease, so slice `i` is exactly `[splits[i], splits[i + 1]]`.
    pub fn splits(&self, near: f32, far: f32) -> [f32; CASCADE_COUNT + 1] {
        let mut splits = [near; CASCADE_COUNT + 1];
        let n = CASCADE_COUNT as f32;
        for i in 1..CASCADE_COUNT {
            let t = i as f32 / n;
            let uniform = near + (far - near) * t;
            let log = near * (far / near).powf(t);
            let split = match *self {
                SplitScheme::Uniform => uniform,
                SplitScheme::Logarithmic => log,
                SplitScheme::Practical { lambda } => lambda * log + (1.0 - lambda) * uniform,
            };
            splits[i] = split.max(splits[i - 1]).min(far);
        }
        splits[CASCADE_COUNT] = far;
        splits
    }
}

/// One shadow cascade.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cascade {
    /// View depth where the slice begins.
    pub start: f32,
    /// View depth where the slice ends.
    pub end: f32,
    /// Shadow map edge in texels.
    pub resolution: u32,
    /// World to light clip space, reverse-Z.
    pub light_view_proj: Mat4,
}

/// The cascades of one frame and the light they were fitted for.
#[derive(Clone, Debug)]
pub struct CascadeSet {
    /// Nearest first.
    pub cascades: [Cascade; CASCADE_COUNT],
    /// Direction the light travels, from the sun into the scene.
    pub light_dir: Vec3,
}

impl CascadeSet {
    /// Fit all cascades to the camera snapshot.
    pub fn compute(
        camera: &FrameCamera,
        light_dir: Vec3,
        scheme: SplitScheme,
        resolutions: [u32; CASCADE_COUNT],
    ) -> Self {
        let light_dir = light_dir.normalize_or(Vec3::NEG_Y);
        let splits = scheme.splits(camera.near, camera.far);
        let cascades = std::array::from_fn(|i| {
            let (start, end) = (splits[i], splits[i + 1]);
            let resolution = resolutions[i].max(1);
            let corners = slice_corners(camera, start, end);
            Cascade {
                start,
                end,
                resolution,
                light_view_proj: compute_cascade_matrix(light_dir, &corners, resolution),
            }
        });
        Self {
            cascades,
            light_dir,
        }
    }

    /// Index of the cascade that shades a fragment at `view_depth`.
    pub fn select(&self, view_depth: f32) -> usize {
        select_cascade(&self.cascades, view_depth)
    }
}

/// First cascade whose `end >= view_depth`; depths beyond the last cascade
/// use the last one. A depth exactly on a boundary belongs to the nearer,
/// higher-resolution cascade.
pub fn select_cascade(cascades: &[Cascade], view_depth: f32) -> usize {
    cascades
        .iter()
        .position(|c| c.end >= view_depth)
        .unwrap_or(cascades.len().saturating_sub(1))
}

/// World-space corners of the camera frustum between two view depths,
/// near face first.
pub fn slice_corners(camera: &FrameCamera, start: f32, end: f32) -> [Vec3; 8] {
    let proj = Mat4::perspective_rh(camera.fov_y, camera.aspect, end, start);
    let inv = (proj * camera.view).inverse();
    // Reverse-Z: the near face is at z=1, the far face at z=0.
    const NDC: [(f32, f32, f32); 8] = [
        (-1.0, -1.0, 1.0),
        (1.0, -1.0, 1.0),
        (1.0, 1.0, 1.0),
        (-1.0, 1.0, 1.0),
        (-1.0, -1.0, 0.0),
        (1.0, -1.0, 0.0),
        (1.0, 1.0, 0.0),
        (-1.0, 1.0, 0.0),
    ];
    NDC.map(|(x, y, z)| {
        let w = inv * Vec4::new(x, y, z, 1.0);
        w.truncate() / w.w
    })
}

/// Tight orthographic light matrix around a set of world-space corners.
///
/// The footprint is the bounding sphere of the corners, so its size does not
/// change as the camera turns, and its center is snapped to whole texels so
/// the map does not shimmer as the camera moves.
pub fn compute_cascade_matrix(light_dir: Vec3, corners: &[Vec3; 8], resolution: u32) -> Mat4 {
    // 1. Bounding sphere of the slice.
    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let radius = corners
        .iter()
        .map(|c| c.distance(center))
        .fold(0.0f32, f32::max)
        .max(1e-3);
    let radius = (radius * 16.0).ceil() / 16.0;

    // 2. Light view at the origin, looking along the light.
    let light_up = if light_dir.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let light_view = Mat4::look_to_rh(Vec3::ZERO, light_dir, light_up);

    // 3. Snap the center to the texel grid in light space.
    let texel = 2.0 * radius / resolution.max(1) as f32;
    let mut c = light_view.transform_point3(center);
    c.x = (c.x / texel).floor() * texel;
    c.y = (c.y / texel).floor() * texel;
    let half = radius + texel;

    // 4. Depth range from the corners, extended towards the light.
    let (mut min_z, mut max_z) = (f32::MAX, f32::MIN);
    for corner in corners {
        let z = light_view.transform_point3(*corner).z;
        min_z = min_z.min(z);
        max_z = max_z.max(z);
    }

    // 5. Reverse-Z orthographic: pass far distance as "near" and near as "far".
    let ortho = Mat4::orthographic_rh(
        c.x - half,
        c.x + half,
        c.y - half,
        c.y + half,
        -min_z,
        -max_z - CASTER_MARGIN,
    );
    ortho * light_view
}

/// Cascade data as bound by the GPU lighting shader.
///
/// Total size: 3×64 + 16 + 16 = 224 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowUniform {
    /// Light view-projection per cascade.
    pub light_matrices: [[f32; 16]; CASCADE_COUNT],
    /// Cascade end depths, w unused.
    pub cascade_ends: [f32; 4],
    /// x = depth bias, yzw unused.
    pub params: [f32; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<ShadowUniform>(), 224);

impl ShadowUniform {
    /// Pack a cascade set.
    pub fn new(set: &CascadeSet, depth_bias: f32) -> Self {
        let c = &set.cascades;
        Self {
            light_matrices: c.map(|c| c.light_view_proj.to_cols_array()),
            cascade_ends: [c[0].end, c[1].end, c[2].end, 0.0],
            params: [depth_bias, 0.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn snapshot(near: f32, far: f32) -> FrameCamera {
        let mut camera = Camera::looking_at(Vec3::new(0.0, 20.0, 40.0), Vec3::ZERO);
        camera.near = near;
        camera.far = far;
        FrameCamera::snapshot(&camera, 16.0 / 9.0)
    }

    const SCHEMES: [SplitScheme; 4] = [
        SplitScheme::Uniform,
        SplitScheme::Logarithmic,
        SplitScheme::Practical { lambda: 0.5 },
        SplitScheme::Practical { lambda: 0.95 },
    ];

    #[test]
    fn test_cascades_are_contiguous_and_cover_near_to_far() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let near = rng.random_range(0.01..5.0);
            let far = near + rng.random_range(1.0..5000.0);
            let camera = snapshot(near, far);
            for scheme in SCHEMES {
                let set = CascadeSet::compute(&camera, Vec3::NEG_Y, scheme, [512; 3]);
                let c = &set.cascades;
                assert_eq!(c[0].start, near);
                assert_eq!(c[CASCADE_COUNT - 1].end, far);
                for i in 0..CASCADE_COUNT - 1 {
                    assert_eq!(c[i].end, c[i + 1].start, "{scheme:?} gap after cascade {i}");
                    assert!(c[i].start <= c[i].end);
                }
            }
        }
    }

    #[test]
    fn test_uniform_and_logarithmic_split_values() {
        let uniform = SplitScheme::Uniform.splits(1.0, 301.0);
        assert!((uniform[1] - 101.0).abs() < 1e-3);
        assert!((uniform[2] - 201.0).abs() < 1e-3);

        let log = SplitScheme::Logarithmic.splits(1.0, 1000.0);
        assert!((log[1] - 10.0).abs() < 1e-3);
        assert!((log[2] - 100.0).abs() < 1e-2);
    }

    #[test]
    fn test_practical_lambda_blends_between_schemes() {
        let (near, far) = (0.5, 800.0);
        let uniform = SplitScheme::Uniform.splits(near, far);
        let log = SplitScheme::Logarithmic.splits(near, far);
        let zero = SplitScheme::Practical { lambda: 0.0 }.splits(near, far);
        let one = SplitScheme::Practical { lambda: 1.0 }.splits(near, far);
        for i in 0..=CASCADE_COUNT {
            assert!((zero[i] - uniform[i]).abs() < 1e-3);
            assert!((one[i] - log[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_select_cascade_ties_go_to_nearer_cascade() {
        let camera = snapshot(0.1, 300.0);
        let set = CascadeSet::compute(&camera, Vec3::NEG_Y, SplitScheme::Uniform, [1024; 3]);
        let boundary = set.cascades[0].end;
        assert_eq!(set.select(boundary), 0);
        assert_eq!(set.select(boundary + 0.01), 1);
        assert_eq!(set.select(0.1), 0);
        assert_eq!(set.select(300.0), 2);
        assert_eq!(set.select(10_000.0), 2);
    }

    #[test]
    fn test_cascade_matrix_encloses_slice() {
        let camera = snapshot(0.5, 400.0);
        let light_dir = Vec3::new(0.3, -1.0, 0.2).normalize();
        let set = CascadeSet::compute(
            &camera,
            light_dir,
            SplitScheme::Practical { lambda: 0.75 },
            [2048, 1024, 1024],
        );
        for cascade in &set.cascades {
            let corners = slice_corners(&camera, cascade.start, cascade.end);
            for corner in corners {
                let p = cascade.light_view_proj.project_point3(corner);
                assert!(p.x.abs() <= 1.0 + 1e-3 && p.y.abs() <= 1.0 + 1e-3, "{p:?}");
                assert!((-1e-3..=1.0 + 1e-3).contains(&p.z), "{p:?}");
            }
        }
    }

    #[test]
    fn test_cascade_matrix_is_finite_for_vertical_light() {
        let camera = snapshot(0.1, 100.0);
        let set = CascadeSet::compute(&camera, Vec3::NEG_Y, SplitScheme::Uniform, [256; 3]);
        for cascade in &set.cascades {
            assert!(cascade.light_view_proj.is_finite());
        }
    }

    #[test]
    fn test_split_scheme_from_config() {
        let config = ShadowConfig {
            split: SplitKind::Practical,
            lambda: 0.4,
            ..ShadowConfig::default()
        };
        assert_eq!(
            SplitScheme::from_config(&config),
            SplitScheme::Practical { lambda: 0.4 }
        );
        let config = ShadowConfig {
            split: SplitKind::Uniform,
            ..config
        };
        assert_eq!(SplitScheme::from_config(&config), SplitScheme::Uniform);
    }

    #[test]
    fn test_shadow_uniform_packs_cascade_ends() {
        let camera = snapshot(1.0, 100.0);
        let set = CascadeSet::compute(&camera, Vec3::NEG_Y, SplitScheme::Uniform, [64; 3]);
        let uniform = ShadowUniform::new(&set, 0.002);
        assert_eq!(uniform.cascade_ends[2], 100.0);
        assert_eq!(uniform.params[0], 0.002);
    }
}
