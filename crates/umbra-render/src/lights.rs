//! Dynamic point lights and the fixed-capacity light set.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::CapacityError;

/// Dynamic lights accepted per frame.
pub const MAX_DYNAMIC_LIGHTS: usize = 13;

/// A point light submitted for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    /// World position.
    pub position: Vec3,
    /// Linear RGB color.
    pub color: Vec3,
    /// Luminous power. Scales the color.
    pub power: f32,
    /// Maximum radius of effect. Beyond this distance, contribution is zero.
    pub radius: f32,
}

impl Light {
    /// A white light.
    pub fn new(position: Vec3, power: f32, radius: f32) -> Self {
        Self {
            position,
            color: Vec3::ONE,
            power,
            radius,
        }
    }

    /// Radiance arriving at `point`, before the surface term.
    pub fn radiance_at(&self, point: Vec3) -> Vec3 {
        self.color * self.power * attenuation(self.position.distance(point), self.radius)
    }
}

/// Attenuation at a given distance from a point light.
///
/// Inverse-square falloff with a smooth window that reaches exactly zero at
/// the cutoff radius. Returns a value in `[0.0, 1.0]`.
pub fn attenuation(distance: f32, radius: f32) -> f32 {
    if distance >= radius {
        return 0.0;
    }
    // +1 keeps the falloff finite at d=0.
    let inv_sq = 1.0 / (distance * distance + 1.0);
    let ratio = distance / radius;
    let t = (1.0 - ratio * ratio).max(0.0);
    inv_sq * t * t
}

/// A vector that never grows past `N` entries.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundedVec<T, const N: usize> {
    items: Vec<T>,
}

impl<T, const N: usize> BoundedVec<T, N> {
    /// An empty vector with room for `N` entries.
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(N),
        }
    }

    /// Append `item`, or hand it back if the vector is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.items.len() >= N {
            return Err(item);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= N
    }

    /// Fixed capacity.
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T, const N: usize> Default for BoundedVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The dynamic lights of one frame, in submission order.
#[derive(Clone, Debug, Default)]
pub struct LightSet {
    lights: BoundedVec<Light, MAX_DYNAMIC_LIGHTS>,
    dropped: usize,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a light. Past the capacity the light is dropped with a warning.
    pub fn add(&mut self, light: Light) -> Result<(), CapacityError> {
        self.lights.push(light).map_err(|_| {
            self.dropped += 1;
            log::warn!(
                "Dynamic light limit of {} reached; dropping light at {:?}",
                MAX_DYNAMIC_LIGHTS,
                light.position
            );
            CapacityError {
                what: "dynamic light set",
                capacity: MAX_DYNAMIC_LIGHTS,
            }
        })
    }

    /// Active lights.
    pub fn lights(&self) -> &[Light] {
        self.lights.as_slice()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Lights refused since the last clear.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Remove every light and reset the drop count.
    pub fn clear(&mut self) {
        self.lights.clear();
        self.dropped = 0;
    }

    /// Summed radiance of every light at `point`, diffuse-weighted by `normal`.
    pub fn irradiance(&self, point: Vec3, normal: Vec3) -> Vec3 {
        self.lights
            .iter()
            .map(|light| {
                let l = (light.position - point).normalize_or_zero();
                light.radiance_at(point) * normal.dot(l).max(0.0)
            })
            .sum()
    }
}

/// Per-light GPU data, 32 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct LightGpu {
    /// xyz = world position, w = radius.
    pub position_radius: [f32; 4],
    /// xyz = color times power, w unused.
    pub color_power: [f32; 4],
}

/// Every dynamic light in a fixed-size uniform block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightsUniform {
    pub lights: [LightGpu; MAX_DYNAMIC_LIGHTS],
    /// x = active light count.
    pub count: [u32; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<LightGpu>(), 32);
static_assertions::const_assert_eq!(
    std::mem::size_of::<LightsUniform>(),
    32 * MAX_DYNAMIC_LIGHTS + 16
);

impl LightsUniform {
    pub fn new(set: &LightSet) -> Self {
        let mut lights = [LightGpu::default(); MAX_DYNAMIC_LIGHTS];
        for (slot, light) in lights.iter_mut().zip(set.lights()) {
            let c = light.color * light.power;
            *slot = LightGpu {
                position_radius: [light.position.x, light.position.y, light.position.z, light.radius],
                color_power: [c.x, c.y, c.z, 0.0],
            };
        }
        Self {
            lights,
            count: [set.len() as u32, 0, 0, 0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attenuation_at_zero_distance() {
        assert!((attenuation(0.0, 10.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_attenuation_reaches_zero_at_radius() {
        assert_eq!(attenuation(10.0, 10.0), 0.0);
        assert_eq!(attenuation(15.0, 10.0), 0.0);
        assert!(attenuation(9.99, 10.0) < 1e-4);
    }

    #[test]
    fn test_attenuation_decreases_monotonically() {
        let mut prev = attenuation(0.0, 50.0);
        for i in 1..500 {
            let a = attenuation(i as f32 * 0.1, 50.0);
            assert!(a <= prev, "attenuation rose at distance {}", i as f32 * 0.1);
            prev = a;
        }
    }

    #[test]
    fn test_twenty_lights_keep_first_thirteen() {
        let mut set = LightSet::new();
        let mut refused = 0;
        for i in 0..20 {
            if set.add(Light::new(Vec3::new(i as f32, 0.0, 0.0), 1.0, 5.0)).is_err() {
                refused += 1;
            }
        }
        assert_eq!(set.len(), MAX_DYNAMIC_LIGHTS);
        assert_eq!(refused, 20 - MAX_DYNAMIC_LIGHTS);
        assert_eq!(set.dropped(), 20 - MAX_DYNAMIC_LIGHTS);
        for (i, light) in set.lights().iter().enumerate() {
            assert_eq!(light.position.x, i as f32, "insertion order must be kept");
        }
    }

    #[test]
    fn test_clear_empties_and_resets_drops() {
        let mut set = LightSet::new();
        for _ in 0..15 {
            let _ = set.add(Light::new(Vec3::ZERO, 1.0, 1.0));
        }
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.dropped(), 0);
        assert!(set.add(Light::new(Vec3::ZERO, 1.0, 1.0)).is_ok());
    }

    #[test]
    fn test_bounded_vec_hands_back_overflow() {
        let mut v: BoundedVec<u32, 2> = BoundedVec::new();
        assert_eq!(v.push(1), Ok(()));
        assert_eq!(v.push(2), Ok(()));
        assert!(v.is_full());
        assert_eq!(v.push(3), Err(3));
        assert_eq!(v.as_slice(), &[1, 2]);
        assert_eq!(v.capacity(), 2);
    }

    #[test]
    fn test_each_light_contributes_once() {
        let mut set = LightSet::new();
        let light = Light::new(Vec3::new(0.0, 2.0, 0.0), 3.0, 10.0);
        set.add(light).unwrap();
        let single = set.irradiance(Vec3::ZERO, Vec3::Y);
        set.add(light).unwrap();
        let double = set.irradiance(Vec3::ZERO, Vec3::Y);
        assert!((double - single * 2.0).length() < 1e-5);
    }

    #[test]
    fn test_uniform_packs_active_count() {
        let mut set = LightSet::new();
        set.add(Light::new(Vec3::ONE, 2.0, 4.0)).unwrap();
        let uniform = LightsUniform::new(&set);
        assert_eq!(uniform.count[0], 1);
        assert_eq!(uniform.lights[0].position_radius, [1.0, 1.0, 1.0, 4.0]);
        assert_eq!(uniform.lights[1].color_power, [0.0; 4]);
    }
}
