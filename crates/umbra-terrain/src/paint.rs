//! Height and ground-type brushes.
//!
//! Both brushes weight each sample by `opacity * falloff(distance)`, where
//! the falloff is a smoothstep from 1 at the brush center to 0 at its
//! radius. A zero weight never touches a sample, a full weight sets it
//! exactly, and repeating a stroke with identical arguments changes nothing.

use glam::Vec2;

use crate::{GROUND_TYPES, Landscape, TerrainError};

/// Brush weight of a sample `distance` away from the brush center.
pub fn brush_weight(distance: f32, radius: f32, opacity: f32) -> f32 {
    let falloff = if distance <= 0.0 {
        1.0
    } else if distance >= radius {
        0.0
    } else {
        let t = 1.0 - distance / radius;
        t * t * (3.0 - 2.0 * t)
    };
    opacity.clamp(0.0, 1.0) * falloff
}

impl Landscape {
    /// Inclusive sample rectangle a brush can reach, or `None` when it
    /// misses the landscape.
    fn brush_samples(&self, pos: Vec2, radius: f32) -> Option<(u32, u32, u32, u32)> {
        let center = self.to_sample_space(pos);
        let reach = radius / self.desc().cell_size;
        let last_x = (self.heightmap().width() - 1) as f32;
        let last_z = (self.heightmap().depth() - 1) as f32;
        let (x0, x1) = ((center.x - reach).floor(), (center.x + reach).ceil());
        let (z0, z1) = ((center.y - reach).floor(), (center.y + reach).ceil());
        if x1 < 0.0 || z1 < 0.0 || x0 > last_x || z0 > last_z {
            return None;
        }
        Some((
            x0.max(0.0) as u32,
            z0.max(0.0) as u32,
            x1.min(last_x) as u32,
            z1.min(last_z) as u32,
        ))
    }

    /// Pull heights under the brush towards `value` (in heightmap units).
    ///
    /// Each sample is clamped into a band around `value` whose half-width
    /// shrinks to zero as the brush weight reaches 1. Returns the number of
    /// samples that changed.
    pub fn paint_height(&mut self, pos: Vec2, radius: f32, value: f32, opacity: f32) -> usize {
        if !value.is_finite() || !pos.is_finite() || !(opacity > 0.0) {
            return 0;
        }
        let radius = radius.max(0.0);
        let Some((x0, z0, x1, z1)) = self.brush_samples(pos, radius) else {
            return 0;
        };
        let reach = radius.max(self.desc().cell_size) / self.desc().vertical_scale;

        let mut changed = 0;
        for z in z0..=z1 {
            for x in x0..=x1 {
                let d = pos.distance(self.sample_position(x, z));
                let w = brush_weight(d, radius, opacity);
                if w <= 0.0 {
                    continue;
                }
                let band = (1.0 - w) / w * reach;
                let (heights, _) = self.maps_mut();
                let old = heights.get(x, z);
                let new = old.clamp(value - band, value + band);
                if new != old {
                    heights.set(x, z, new);
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            self.mark_dirty_samples(x0, z0, x1, z1);
            log::trace!("paint_height changed {changed} samples at {pos}");
        }
        changed
    }

    /// Raise the coverage of `ground_type` under the brush to the brush
    /// weight. Returns the number of samples that changed.
    pub fn paint_color(
        &mut self,
        pos: Vec2,
        radius: f32,
        ground_type: usize,
        opacity: f32,
    ) -> Result<usize, TerrainError> {
        if ground_type >= GROUND_TYPES {
            return Err(TerrainError::GroundType(ground_type));
        }
        if !pos.is_finite() || !(opacity > 0.0) {
            return Ok(0);
        }
        let radius = radius.max(0.0);
        let Some((x0, z0, x1, z1)) = self.brush_samples(pos, radius) else {
            return Ok(0);
        };

        let mut changed = 0;
        for z in z0..=z1 {
            for x in x0..=x1 {
                let d = pos.distance(self.sample_position(x, z));
                let w = brush_weight(d, radius, opacity);
                if w <= 0.0 {
                    continue;
                }
                let (_, attributes) = self.maps_mut();
                if attributes.raise(x, z, ground_type, w)? {
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            self.mark_dirty_samples(x0, z0, x1, z1);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Heightmap, HeightmapParams, LandscapeDesc};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn noisy(seed: u64) -> Landscape {
        let params = HeightmapParams {
            seed,
            amplitude: 1.0,
            base_frequency: 0.05,
            ..Default::default()
        };
        let desc = LandscapeDesc {
            chunk_size: 8,
            vertical_scale: 16.0,
            ..Default::default()
        };
        Landscape::new(desc, Heightmap::from_fbm(33, 33, &params)).unwrap()
    }

    /// 2x2 chunks of 4 cells over a flat plane at height 0, one world unit
    /// per heightmap unit.
    fn flat() -> Landscape {
        let desc = LandscapeDesc {
            chunk_size: 4,
            vertical_scale: 1.0,
            ..Default::default()
        };
        Landscape::new(desc, Heightmap::flat(9, 9, 0.0)).unwrap()
    }

    fn bits(l: &Landscape) -> Vec<u32> {
        l.heightmap().samples().iter().map(|h| h.to_bits()).collect()
    }

    #[test]
    fn test_brush_weight_endpoints() {
        assert_eq!(brush_weight(0.0, 5.0, 1.0), 1.0);
        assert_eq!(brush_weight(0.0, 0.0, 1.0), 1.0);
        assert_eq!(brush_weight(5.0, 5.0, 1.0), 0.0);
        assert_eq!(brush_weight(1.0, 5.0, 0.0), 0.0);
        let mid = brush_weight(2.5, 5.0, 1.0);
        assert!((mid - 0.5).abs() < 1e-6);
        assert!(brush_weight(1.0, 5.0, 1.0) > brush_weight(2.0, 5.0, 1.0));
    }

    /// Zero opacity leaves the heightmap bit-for-bit unchanged.
    #[test]
    fn test_paint_height_zero_opacity_is_noop() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut l = noisy(4);
        let before = bits(&l);
        for _ in 0..50 {
            let pos = Vec2::new(rng.random_range(-20.0..20.0), rng.random_range(-20.0..20.0));
            let changed = l.paint_height(pos, rng.random_range(0.0..12.0), 3.0, 0.0);
            assert_eq!(changed, 0);
        }
        assert_eq!(bits(&l), before);
        assert_eq!(l.dirty_chunk_count(), 0);
    }

    /// A zero-radius, full-opacity stroke on a sample sets it exactly.
    #[test]
    fn test_paint_height_point_sets_exact_value() {
        let mut l = noisy(5);
        let pos = l.sample_position(10, 21);
        l.paint_height(pos, 0.0, 0.625, 1.0);
        assert_eq!(l.heightmap().get(10, 21), 0.625);
        // Neighbours are out of reach of a zero radius.
        assert_eq!(l.heightmap().get(11, 21), noisy(5).heightmap().get(11, 21));
    }

    #[test]
    fn test_paint_height_is_idempotent() {
        let mut l = noisy(6);
        let pos = Vec2::new(1.7, -3.2);
        l.paint_height(pos, 6.0, 0.4, 0.8);
        let once = bits(&l);
        assert_eq!(l.paint_height(pos, 6.0, 0.4, 0.8), 0);
        assert_eq!(bits(&l), once);
    }

    #[test]
    fn test_paint_height_center_reaches_value_rim_untouched() {
        let mut l = noisy(7);
        let original = noisy(7);
        let pos = l.sample_position(16, 16);
        l.paint_height(pos, 4.0, 2.0, 1.0);
        assert_eq!(l.heightmap().get(16, 16), 2.0);
        // Samples at or beyond the radius keep their values.
        assert_eq!(l.heightmap().get(20, 16), original.heightmap().get(20, 16));
        assert_eq!(l.heightmap().get(16, 25), original.heightmap().get(16, 25));
    }

    #[test]
    fn test_paint_color_twice_equals_once() {
        let mut l = noisy(8);
        let pos = Vec2::new(-4.2, 5.5);
        assert!(l.paint_color(pos, 7.0, 2, 1.0).unwrap() > 0);
        let once = l.attributes().clone();
        assert_eq!(l.paint_color(pos, 7.0, 2, 1.0).unwrap(), 0);
        assert_eq!(l.attributes(), &once);
    }

    #[test]
    fn test_paint_color_zero_opacity_and_bad_type() {
        let mut l = noisy(9);
        let before = l.attributes().clone();
        assert_eq!(l.paint_color(Vec2::ZERO, 5.0, 1, 0.0).unwrap(), 0);
        assert_eq!(l.attributes(), &before);
        assert!(matches!(
            l.paint_color(Vec2::ZERO, 5.0, 7, 1.0),
            Err(TerrainError::GroundType(7))
        ));
    }

    #[test]
    fn test_paint_outside_landscape_is_ignored() {
        let mut l = noisy(10);
        assert_eq!(l.paint_height(Vec2::new(500.0, 500.0), 3.0, 1.0, 1.0), 0);
    }

    #[test]
    fn test_paint_marks_chunks_and_meshes_dirty() {
        let mut l = noisy(11);
        let root = l.tree().root();
        let _ = l.node_mesh(root);
        let pos = l.sample_position(8, 8);
        l.paint_height(pos, 1.5, 5.0, 1.0);

        // Sample (8, 8) sits on the corner shared by chunks 0, 1, 4 and 5.
        for chunk in [0, 1, 4, 5] {
            assert!(l.is_chunk_dirty(chunk), "chunk {chunk} not dirty");
        }
        assert!(!l.is_chunk_dirty(15));
        assert!(l.cached_mesh(root).is_none());

        let report = l.refresh_dirty();
        assert!(report.refit >= 1);
        assert_eq!(l.dirty_chunk_count(), 0);
        let leaf = l.tree().leaf_for_chunk(0).unwrap();
        assert!(l.tree().node(leaf).max_height() >= 5.0 * 16.0 - 1e-3);
        let mesh = l.node_mesh(leaf);
        assert!(mesh.vertices.iter().any(|v| (v.position[1] - 80.0).abs() < 1e-3));
        let top = l.tree().node(root).sphere;
        assert!(top.contains_point(l.sample_world(8, 8)));
    }

    #[test]
    fn test_sub_epsilon_edit_keeps_bounds() {
        let mut l = flat();
        let leaf = l.tree().leaf_for_chunk(0).unwrap();
        let root = l.tree().root();
        let (leaf_before, root_before) = (l.tree().node(leaf).bounds, l.tree().node(root).sphere);

        // Sample (2, 2) lies inside chunk 0 only.
        assert_eq!(l.paint_height(l.sample_position(2, 2), 0.0, 5e-5, 1.0), 1);
        assert!(l.is_chunk_dirty(0));
        let report = l.refresh_dirty();
        assert_eq!(report.chunks, 1);
        assert_eq!(report.refit, 0);
        assert_eq!(l.tree().node(leaf).bounds, leaf_before);
        assert_eq!(l.tree().node(root).sphere, root_before);
    }

    #[test]
    fn test_edit_past_epsilon_refits_bounds() {
        let mut l = flat();
        let leaf = l.tree().leaf_for_chunk(0).unwrap();
        let root = l.tree().root();

        assert_eq!(l.paint_height(l.sample_position(2, 2), 0.0, 2e-4, 1.0), 1);
        let report = l.refresh_dirty();
        assert_eq!(report.refit, 1);
        assert!((l.tree().node(leaf).max_height() - 2e-4).abs() < 1e-6);
        assert!(l.tree().node(root).sphere.contains_point(l.sample_world(2, 2)));
    }

    #[test]
    fn test_non_finite_brush_position_is_ignored() {
        let mut l = flat();
        let before = bits(&l);
        assert_eq!(l.paint_height(Vec2::new(f32::NAN, 0.0), 2.0, 1.0, 1.0), 0);
        assert_eq!(l.paint_color(Vec2::new(0.0, f32::INFINITY), 2.0, 1, 1.0).unwrap(), 0);
        assert_eq!(bits(&l), before);
        assert_eq!(l.dirty_chunk_count(), 0);
    }
}
