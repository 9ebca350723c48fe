//! Raw height samples and their procedural and image sources.

use std::path::Path;

use noise::{NoiseFn, Simplex};

use crate::TerrainError;

/// Configuration for multi-octave fBm noise used in heightmap generation.
#[derive(Clone, Debug)]
pub struct HeightmapParams {
    /// Seed for deterministic generation.
    pub seed: u64,
    /// Number of noise octaves to composite.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per sample.
    pub base_frequency: f64,
    /// Amplitude of the first octave.
    pub amplitude: f64,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 5,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 0.01,
            amplitude: 0.5,
        }
    }
}

/// A regular grid of height samples, row-major with `x` varying fastest.
///
/// Samples are unitless; the owning landscape multiplies them by its
/// vertical scale.
#[derive(Clone, Debug, PartialEq)]
pub struct Heightmap {
    width: u32,
    depth: u32,
    samples: Vec<f32>,
}

impl Heightmap {
    /// Wrap an existing sample buffer.
    pub fn new(width: u32, depth: u32, samples: Vec<f32>) -> Result<Self, TerrainError> {
        if width == 0 || depth == 0 || samples.len() != width as usize * depth as usize {
            return Err(TerrainError::SampleCount {
                width,
                depth,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            depth,
            samples,
        })
    }

    /// A heightmap with every sample set to `height`.
    pub fn flat(width: u32, depth: u32, height: f32) -> Self {
        Self {
            width: width.max(1),
            depth: depth.max(1),
            samples: vec![height; width.max(1) as usize * depth.max(1) as usize],
        }
    }

    /// Fill a heightmap with fractal Brownian motion over simplex noise.
    pub fn from_fbm(width: u32, depth: u32, params: &HeightmapParams) -> Self {
        let noise = Simplex::new(params.seed as u32);
        let mut map = Self::flat(width, depth, 0.0);
        for z in 0..map.depth {
            for x in 0..map.width {
                let mut total = 0.0;
                let mut frequency = params.base_frequency;
                let mut amplitude = params.amplitude;
                for _ in 0..params.octaves {
                    total += noise.get([x as f64 * frequency, z as f64 * frequency]) * amplitude;
                    frequency *= params.lacunarity;
                    amplitude *= params.persistence;
                }
                map.set(x, z, total as f32);
            }
        }
        map
    }

    /// Build from a grayscale image; black maps to 0 and white to 1.
    pub fn from_luma_image(image: &image::DynamicImage) -> Self {
        let luma = image.to_luma16();
        let samples = luma
            .pixels()
            .map(|p| f32::from(p.0[0]) / f32::from(u16::MAX))
            .collect();
        Self {
            width: luma.width().max(1),
            depth: luma.height().max(1),
            samples,
        }
    }

    /// Decode a grayscale heightmap image from disk.
    pub fn load_image(path: &Path) -> Result<Self, TerrainError> {
        let image = image::open(path)?;
        log::debug!("Loaded heightmap {} ({}x{})", path.display(), image.width(), image.height());
        Ok(Self::from_luma_image(&image))
    }

    /// Width in samples.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Depth in samples.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// All samples, row-major.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    fn index(&self, x: u32, z: u32) -> usize {
        z as usize * self.width as usize + x as usize
    }

    /// Sample at integer coordinates, clamped to the grid.
    pub fn get(&self, x: u32, z: u32) -> f32 {
        let x = x.min(self.width - 1);
        let z = z.min(self.depth - 1);
        self.samples[self.index(x, z)]
    }

    /// Overwrite one sample. Out-of-range writes are ignored.
    pub fn set(&mut self, x: u32, z: u32, value: f32) {
        if x < self.width && z < self.depth {
            let i = self.index(x, z);
            self.samples[i] = value;
        }
    }

    /// Bilinear sample at fractional grid coordinates, clamped to the grid.
    pub fn sample_bilinear(&self, u: f32, v: f32) -> f32 {
        let u = u.clamp(0.0, (self.width - 1) as f32);
        let v = v.clamp(0.0, (self.depth - 1) as f32);
        let x0 = u.floor() as u32;
        let z0 = v.floor() as u32;
        let fx = u - x0 as f32;
        let fz = v - z0 as f32;

        let h00 = self.get(x0, z0);
        let h10 = self.get(x0 + 1, z0);
        let h01 = self.get(x0, z0 + 1);
        let h11 = self.get(x0 + 1, z0 + 1);

        let top = h00 + (h10 - h00) * fx;
        let bottom = h01 + (h11 - h01) * fx;
        top + (bottom - top) * fz
    }

    /// Minimum and maximum over the inclusive sample rectangle.
    pub fn range(&self, x0: u32, z0: u32, x1: u32, z1: u32) -> (f32, f32) {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for z in z0..=z1.min(self.depth - 1) {
            for x in x0..=x1.min(self.width - 1) {
                let h = self.samples[self.index(x, z)];
                lo = lo.min(h);
                hi = hi.max(h);
            }
        }
        (lo, hi)
    }
}
