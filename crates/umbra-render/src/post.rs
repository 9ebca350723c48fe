//! Tone mapping and LDR post-effect math.
//!
//! The software backend calls these per pixel; the GPU shaders implement the
//! same formulas.

use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::assets::{AssetKey, ResourceLoadError, Texture};

/// A color-correction cube stored as a strip of `size` slices, each
/// `size × size`, laid out left to right by blue.
#[derive(Clone, Debug)]
pub struct ColorLut {
    texture: Arc<Texture>,
    size: u32,
}

impl ColorLut {
    pub fn new(key: &AssetKey, texture: Arc<Texture>) -> Result<Self, ResourceLoadError> {
        let size = texture.height();
        if size < 2 || texture.width() != size * size {
            return Err(ResourceLoadError::Invalid {
                key: key.clone(),
                reason: format!(
                    "color LUT must be N²×N, got {}×{}",
                    texture.width(),
                    texture.height()
                ),
            });
        }
        Ok(Self { texture, size })
    }

    /// The identity cube of edge `size`.
    pub fn identity(size: u32) -> Self {
        let size = size.max(2);
        let max = (size - 1) as f32;
        let image = image::RgbaImage::from_fn(size * size, size, |x, y| {
            let (b, r) = (x / size, x % size);
            let to_u8 = |v: u32| (v as f32 / max * 255.0).round() as u8;
            image::Rgba([to_u8(r), to_u8(y), to_u8(b), 255])
        });
        Self {
            texture: Arc::new(Texture::new(image)),
            size,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    /// Trilinear lookup of an LDR color.
    pub fn apply(&self, color: Vec3) -> Vec3 {
        let max = (self.size - 1) as f32;
        let c = color.clamp(Vec3::ZERO, Vec3::ONE) * max;
        let b0 = c.z.floor();
        let b1 = (b0 + 1.0).min(max);
        let fb = c.z - b0;
        let lo = self.sample_slice(b0 as u32, c.x, c.y);
        let hi = self.sample_slice(b1 as u32, c.x, c.y);
        lo.lerp(hi, fb)
    }

    fn sample_slice(&self, slice: u32, r: f32, g: f32) -> Vec3 {
        let max = self.size - 1;
        let (r0, g0) = (r.floor() as u32, g.floor() as u32);
        let (r1, g1) = ((r0 + 1).min(max), (g0 + 1).min(max));
        let (fr, fg) = (r - r0 as f32, g - g0 as f32);
        let base = slice * self.size;
        let t = |x: u32, y: u32| self.texture.texel(base + x, y).truncate();
        let top = t(r0, g0).lerp(t(r1, g0), fr);
        let bottom = t(r0, g1).lerp(t(r1, g1), fr);
        top.lerp(bottom, fg)
    }
}

/// Inputs of the post-effect chain.
#[derive(Clone, Debug, Default)]
pub struct PostSettings {
    pub color_correction: Option<ColorLut>,
    /// Multiplied over the image, sampled by screen uv.
    pub vignetting: Option<Arc<Texture>>,
    /// Glitch strength; 0 skips the effect.
    pub glitch: f32,
    /// Seconds since the renderer started.
    pub time: f32,
    pub seed: u64,
}

impl PostSettings {
    /// Effects that will run, in order.
    pub fn active_effects(&self) -> Vec<PostEffect> {
        let mut effects = Vec::with_capacity(3);
        if self.color_correction.is_some() {
            effects.push(PostEffect::ColorCorrection);
        }
        if self.vignetting.is_some() {
            effects.push(PostEffect::Vignetting);
        }
        if self.glitch > 0.0 {
            effects.push(PostEffect::Glitch);
        }
        effects
    }
}

/// One post-effect step of the LDR ping-pong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostEffect {
    ColorCorrection,
    Vignetting,
    Glitch,
}

/// Exposure then the ACES filmic curve (Narkowicz fit) then display gamma.
pub fn tonemap(hdr: Vec3, exposure: f32) -> Vec3 {
    let x = (hdr * exposure).max(Vec3::ZERO);
    let (a, b, c, d, e) = (2.51, 0.03, 2.43, 0.59, 0.14);
    let mapped = (x * (a * x + b)) / (x * (c * x + d) + e);
    mapped.clamp(Vec3::ZERO, Vec3::ONE).powf(1.0 / 2.2)
}

/// Integer hash shared with the glitch shader.
pub fn hash_u32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

fn hash_unit(x: u32) -> f32 {
    (hash_u32(x) >> 8) as f32 / (1u32 << 24) as f32
}

/// Horizontal uv displacement of the row band containing `v`.
///
/// Rows are grouped into 32 bands; each band is re-rolled 15 times a second
/// and displaced only if its roll passes the intensity threshold.
pub fn glitch_offset(v: f32, time: f32, seed: u64, intensity: f32) -> f32 {
    if intensity <= 0.0 {
        return 0.0;
    }
    let band = (v.clamp(0.0, 1.0) * 32.0) as u32;
    let tick = (time.max(0.0) * 15.0) as u32;
    let key = hash_u32(band ^ hash_u32(tick ^ hash_u32(seed as u32)));
    if hash_unit(key) < 1.0 - 0.5 * intensity.min(1.0) {
        return 0.0;
    }
    (hash_unit(key ^ 0x9e37_79b9) - 0.5) * 0.2 * intensity.min(1.0)
}

/// Source uv of each channel for a glitched pixel. Red and blue split apart
/// along the displacement.
pub fn glitch_uvs(uv: Vec2, time: f32, seed: u64, intensity: f32) -> [Vec2; 3] {
    let offset = glitch_offset(uv.y, time, seed, intensity);
    let shift = Vec2::new(offset, 0.0);
    [uv + shift * 1.5, uv + shift, uv + shift * 0.5]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_lut_is_identity() {
        let lut = ColorLut::identity(16);
        for c in [
            Vec3::ZERO,
            Vec3::ONE,
            Vec3::new(0.25, 0.5, 0.75),
            Vec3::new(0.9, 0.1, 0.33),
        ] {
            let out = lut.apply(c);
            assert!((out - c).abs().max_element() < 0.01, "{c:?} -> {out:?}");
        }
    }

    #[test]
    fn test_lut_rejects_bad_layout() {
        let texture = Arc::new(Texture::solid([0; 4]));
        assert!(ColorLut::new(&AssetKey::new("lut"), texture).is_err());
        let strip = Arc::new(Texture::new(image::RgbaImage::new(64, 8)));
        assert!(ColorLut::new(&AssetKey::new("lut"), strip).is_ok());
    }

    #[test]
    fn test_tonemap_range_and_order() {
        assert_eq!(tonemap(Vec3::ZERO, 1.0), Vec3::ZERO);
        let dim = tonemap(Vec3::splat(0.2), 1.0);
        let bright = tonemap(Vec3::splat(0.2), 4.0);
        assert!(bright.x > dim.x);
        assert!(tonemap(Vec3::splat(1e6), 1.0).x <= 1.0);
    }

    #[test]
    fn test_glitch_disabled_at_zero_intensity() {
        for i in 0..64 {
            assert_eq!(glitch_offset(i as f32 / 64.0, 3.7, 11, 0.0), 0.0);
        }
    }

    #[test]
    fn test_glitch_displaces_some_bands_at_full_intensity() {
        let displaced = (0..32)
            .filter(|band| glitch_offset((*band as f32 + 0.5) / 32.0, 1.0, 5, 1.0) != 0.0)
            .count();
        assert!(displaced > 0 && displaced < 32, "{displaced} bands displaced");
    }

    #[test]
    fn test_active_effect_order() {
        let settings = PostSettings {
            color_correction: Some(ColorLut::identity(4)),
            glitch: 0.5,
            ..PostSettings::default()
        };
        assert_eq!(
            settings.active_effects(),
            vec![PostEffect::ColorCorrection, PostEffect::Glitch]
        );
        assert!(PostSettings::default().active_effects().is_empty());
    }
}
