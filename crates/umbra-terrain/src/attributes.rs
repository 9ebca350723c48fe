//! Per-sample ground-type coverage.

use crate::TerrainError;

/// Number of blendable ground types.
pub const GROUND_TYPES: usize = 4;

/// Ground-type weights per heightmap sample. Each sample's weights sum to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeMap {
    width: u32,
    depth: u32,
    weights: Vec<[f32; GROUND_TYPES]>,
}

impl AttributeMap {
    /// A map fully covered by ground type 0.
    pub fn new(width: u32, depth: u32) -> Self {
        let mut base = [0.0; GROUND_TYPES];
        base[0] = 1.0;
        Self {
            width,
            depth,
            weights: vec![base; width as usize * depth as usize],
        }
    }

    /// Width in samples.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Depth in samples.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Weights at integer coordinates, clamped to the grid.
    pub fn get(&self, x: u32, z: u32) -> [f32; GROUND_TYPES] {
        let x = x.min(self.width.saturating_sub(1));
        let z = z.min(self.depth.saturating_sub(1));
        self.weights[z as usize * self.width as usize + x as usize]
    }

    pub(crate) fn get_mut(&mut self, x: u32, z: u32) -> Option<&mut [f32; GROUND_TYPES]> {
        if x < self.width && z < self.depth {
            self.weights.get_mut(z as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    /// Raise `ground_type` to `coverage` at one sample, rescaling the other
    /// types to share the remainder. Lower coverage than present is ignored.
    ///
    /// Returns whether the sample changed.
    pub fn raise(
        &mut self,
        x: u32,
        z: u32,
        ground_type: usize,
        coverage: f32,
    ) -> Result<bool, TerrainError> {
        if ground_type >= GROUND_TYPES {
            return Err(TerrainError::GroundType(ground_type));
        }
        let Some(w) = self.get_mut(x, z) else {
            return Ok(false);
        };
        let coverage = coverage.clamp(0.0, 1.0);
        if coverage <= w[ground_type] {
            return Ok(false);
        }
        let others = 1.0 - w[ground_type];
        for (t, weight) in w.iter_mut().enumerate() {
            if t == ground_type {
                *weight = coverage;
            } else if others > 0.0 {
                *weight *= (1.0 - coverage) / others;
            }
        }
        Ok(true)
    }

    /// Pack weights into an RGBA8 splat image.
    pub fn to_rgba8(&self) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.width, self.depth, |x, z| {
            let w = self.get(x, z);
            image::Rgba(w.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
        })
    }
}
