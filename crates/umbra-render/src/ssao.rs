//! Ambient occlusion sampling pattern.
//!
//! The kernel is a set of points in the unit hemisphere around +Z, denser
//! near the origin. A 4×4 tile of random rotations about the normal is
//! repeated over the screen so neighbouring pixels sample different
//! directions. Both are generated once from a seed.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use umbra_config::RendererConfig;

/// Upper bound on kernel samples.
pub const MAX_KERNEL_SAMPLES: usize = 64;

/// Edge of the rotation tile in pixels.
pub const NOISE_TILE: usize = 4;

/// Precomputed occlusion kernel and rotation tile.
#[derive(Clone, Debug, PartialEq)]
pub struct SsaoKernel {
    pub enabled: bool,
    /// Hemisphere samples around +Z, tangent space.
    pub samples: Vec<Vec3>,
    /// Unit rotation vectors in the tangent plane, row-major.
    pub noise: [Vec2; NOISE_TILE * NOISE_TILE],
    /// Sampling radius in world units.
    pub radius: f32,
    pub strength: f32,
}

impl SsaoKernel {
    pub fn new(sample_count: usize, radius: f32, strength: f32, seed: u64) -> Self {
        let count = sample_count.clamp(1, MAX_KERNEL_SAMPLES);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let samples = (0..count)
            .map(|i| {
                let dir = Vec3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(0.05..1.0),
                )
                .normalize();
                // Pull samples towards the center.
                let t = i as f32 / count as f32;
                let scale = 0.1 + 0.9 * t * t;
                dir * rng.random_range(0.1..1.0f32) * scale
            })
            .collect();
        let noise = std::array::from_fn(|_| {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            Vec2::from_angle(angle)
        });
        Self {
            enabled: true,
            samples,
            noise,
            radius,
            strength,
        }
    }

    pub fn from_config(config: &RendererConfig) -> Self {
        let mut kernel = Self::new(
            config.ssao_samples as usize,
            config.ssao_radius,
            config.ssao_strength,
            config.seed,
        );
        kernel.enabled = config.ssao;
        kernel
    }

    /// Rotation vector for a pixel.
    pub fn rotation_at(&self, x: u32, y: u32) -> Vec2 {
        let i = (y as usize % NOISE_TILE) * NOISE_TILE + x as usize % NOISE_TILE;
        self.noise[i]
    }
}

/// Kernel as bound by the GPU occlusion shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SsaoUniform {
    pub samples: [[f32; 4]; MAX_KERNEL_SAMPLES],
    pub noise: [[f32; 4]; NOISE_TILE * NOISE_TILE],
    /// x = radius, y = strength, z = sample count, w = enabled.
    pub params: [f32; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<SsaoUniform>(), 16 * (64 + 16 + 1));

impl SsaoUniform {
    pub fn new(kernel: &SsaoKernel) -> Self {
        let mut samples = [[0.0; 4]; MAX_KERNEL_SAMPLES];
        for (slot, s) in samples.iter_mut().zip(&kernel.samples) {
            *slot = s.extend(0.0).to_array();
        }
        Self {
            samples,
            noise: kernel.noise.map(|n| [n.x, n.y, 0.0, 0.0]),
            params: [
                kernel.radius,
                kernel.strength,
                kernel.samples.len() as f32,
                kernel.enabled as u32 as f32,
            ],
        }
    }
}
