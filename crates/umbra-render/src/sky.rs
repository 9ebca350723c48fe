//! Sun, sky and sea state driven by the time of day.

use std::f32::consts::TAU;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Albedo of the sea plane.
pub const SEA_ALBEDO: Vec3 = Vec3::new(0.02, 0.09, 0.14);

const NOON_SUN: Vec3 = Vec3::new(1.0, 0.96, 0.9);
const LOW_SUN: Vec3 = Vec3::new(1.0, 0.45, 0.2);
const DAY_ZENITH: Vec3 = Vec3::new(0.18, 0.36, 0.78);
const DAY_HORIZON: Vec3 = Vec3::new(0.62, 0.72, 0.85);
const NIGHT_ZENITH: Vec3 = Vec3::new(0.004, 0.006, 0.02);
const NIGHT_HORIZON: Vec3 = Vec3::new(0.02, 0.025, 0.05);

/// Ambient term, sky and sea toggles and the sun position.
#[derive(Clone, Debug, PartialEq)]
pub struct SkyState {
    /// Ambient color at full daylight, already scaled by intensity.
    pub ambient: Vec3,
    /// Draw the sky gradient behind geometry.
    pub sky_enabled: bool,
    /// Draw the sea plane.
    pub sea_enabled: bool,
    /// Sea plane height.
    pub sea_level: f32,
    time_of_day: f32,
    seed: u64,
    azimuth: f32,
}

impl SkyState {
    pub fn new(time_of_day: f32, seed: u64) -> Self {
        let mut sky = Self {
            ambient: Vec3::splat(0.25),
            sky_enabled: true,
            sea_enabled: false,
            sea_level: 0.0,
            time_of_day: 0.0,
            seed: 0,
            azimuth: 0.0,
        };
        sky.set_time_of_day(time_of_day, seed);
        sky
    }

    /// Move the sun. `time_of_day` wraps into `[0, 1)`: 0.25 is sunrise,
    /// 0.5 noon, 0.75 sunset. The seed tilts the sun's path.
    pub fn set_time_of_day(&mut self, time_of_day: f32, seed: u64) {
        self.time_of_day = time_of_day.rem_euclid(1.0);
        self.seed = seed;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.azimuth = rng.random_range(-0.35..0.35);
    }

    pub fn time_of_day(&self) -> f32 {
        self.time_of_day
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Unit vector from the scene towards the sun.
    pub fn sun_direction(&self) -> Vec3 {
        let angle = (self.time_of_day - 0.25) * TAU;
        let (sin_a, cos_a) = angle.sin_cos();
        let (sin_z, cos_z) = self.azimuth.sin_cos();
        Vec3::new(cos_a * cos_z, sin_a, cos_a * sin_z + 0.3).normalize()
    }

    /// Direction sunlight travels.
    pub fn light_dir(&self) -> Vec3 {
        -self.sun_direction()
    }

    /// How much daylight there is, 0 at night, 1 with the sun well up.
    pub fn daylight(&self) -> f32 {
        smoothstep(-0.1, 0.25, self.sun_direction().y)
    }

    /// Sun radiance, warmer near the horizon, zero once it has set.
    pub fn sun_color(&self) -> Vec3 {
        let elevation = self.sun_direction().y.max(0.0);
        let tint = LOW_SUN.lerp(NOON_SUN, elevation.sqrt());
        tint * 3.0 * smoothstep(-0.05, 0.1, self.sun_direction().y)
    }

    /// Ambient term after daylight.
    pub fn ambient_color(&self) -> Vec3 {
        self.ambient * (0.15 + 0.85 * self.daylight())
    }

    /// Sky gradient at the zenith and the horizon.
    pub fn gradient(&self) -> (Vec3, Vec3) {
        let day = self.daylight();
        (
            NIGHT_ZENITH.lerp(DAY_ZENITH, day),
            NIGHT_HORIZON.lerp(DAY_HORIZON, day),
        )
    }

    /// Sky radiance seen along `view_dir`.
    pub fn sky_color(&self, view_dir: Vec3) -> Vec3 {
        let (zenith, horizon) = self.gradient();
        let up = view_dir.y;
        let base = if up >= 0.0 {
            horizon.lerp(zenith, up.sqrt())
        } else {
            horizon * (1.0 + up).max(0.0) * 0.5
        };
        let glow = view_dir.dot(self.sun_direction()).max(0.0).powf(256.0);
        base + self.sun_color() * glow
    }
}

impl Default for SkyState {
    fn default() -> Self {
        Self::new(0.4, 0)
    }
}

pub(crate) fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Sky state as read by the GPU lighting shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SkyUniform {
    /// xyz = towards the sun.
    pub sun_direction: [f32; 4],
    pub sun_color: [f32; 4],
    pub ambient: [f32; 4],
    pub zenith: [f32; 4],
    pub horizon: [f32; 4],
    /// x = sky enabled, y = sea enabled, z = sea level.
    pub flags: [f32; 4],
}

impl SkyUniform {
    pub fn new(sky: &SkyState) -> Self {
        let (zenith, horizon) = sky.gradient();
        Self {
            sun_direction: sky.sun_direction().extend(0.0).to_array(),
            sun_color: sky.sun_color().extend(0.0).to_array(),
            ambient: sky.ambient_color().extend(0.0).to_array(),
            zenith: zenith.extend(1.0).to_array(),
            horizon: horizon.extend(1.0).to_array(),
            flags: [
                sky.sky_enabled as u32 as f32,
                sky.sea_enabled as u32 as f32,
                sky.sea_level,
                0.0,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sun_is_up_at_noon_and_down_at_midnight() {
        let noon = SkyState::new(0.5, 0);
        let midnight = SkyState::new(0.0, 0);
        assert!(noon.sun_direction().y > 0.9);
        assert!(midnight.sun_direction().y < -0.9);
        assert_eq!(midnight.sun_color(), Vec3::ZERO);
        assert!(noon.sun_color().x > 1.0);
    }

    #[test]
    fn test_time_of_day_wraps() {
        let sky = SkyState::new(1.5, 3);
        assert!((sky.time_of_day() - 0.5).abs() < 1e-6);
        assert!((sky.sun_direction() - SkyState::new(0.5, 3).sun_direction()).length() < 1e-6);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = SkyState::new(0.4, 42);
        let b = SkyState::new(0.4, 42);
        assert_eq!(a.sun_direction(), b.sun_direction());
    }

    #[test]
    fn test_ambient_dims_at_night() {
        let day = SkyState::new(0.5, 0);
        let night = SkyState::new(0.0, 0);
        assert!(night.ambient_color().x < day.ambient_color().x);
        assert!(night.ambient_color().x > 0.0);
    }

    #[test]
    fn test_sky_is_brighter_at_zenith_by_day() {
        let sky = SkyState::new(0.5, 0);
        let zenith = sky.sky_color(Vec3::Y);
        let below = sky.sky_color(Vec3::NEG_Y);
        assert!(zenith.z > below.z);
    }
}
