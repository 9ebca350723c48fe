//! Adaptive exposure for the tone mapping pass.

use umbra_config::RendererConfig;

/// Exposure state carried across frames.
#[derive(Clone, Debug, PartialEq)]
pub struct Exposure {
    /// Exposure applied this frame.
    pub current: f32,
    /// Value `current` moves towards.
    pub target: f32,
    /// Maximum change per second.
    pub speed: f32,
    auto: Option<AutoExposure>,
}

/// Parameters for deriving the target from scene luminance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoExposure {
    /// Middle-grey key the average luminance is mapped to.
    pub key: f32,
    pub min: f32,
    pub max: f32,
}

impl Exposure {
    pub fn new(current: f32, target: f32, speed: f32) -> Self {
        Self {
            current,
            target,
            speed,
            auto: None,
        }
    }

    /// Exposure configured by the renderer section.
    pub fn from_config(config: &RendererConfig) -> Self {
        let mut exposure = Self::new(
            config.exposure,
            config.exposure_target,
            config.exposure_speed,
        );
        if config.auto_exposure {
            exposure.auto = Some(AutoExposure {
                key: config.auto_exposure_key,
                min: config.exposure_min,
                max: config.exposure_max,
            });
        }
        exposure
    }

    pub fn auto(&self) -> Option<AutoExposure> {
        self.auto
    }

    /// Retarget from the log-average luminance of the previous frame.
    /// Does nothing without auto exposure or a usable measurement.
    pub fn observe_luminance(&mut self, average: f32) {
        if let Some(auto) = self.auto
            && average.is_finite()
            && average > 0.0
        {
            self.target = (auto.key / average).clamp(auto.min, auto.max);
        }
    }

    /// Step `current` towards `target` by at most `speed * dt`.
    pub fn adapt(&mut self, dt: f32) -> f32 {
        let max_step = (self.speed * dt.max(0.0)).max(0.0);
        self.current += (self.target - self.current).clamp(-max_step, max_step);
        self.current
    }
}

impl Default for Exposure {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

/// Log-average ("geometric mean") luminance of linear RGB pixels.
pub fn log_average_luminance(pixels: impl IntoIterator<Item = [f32; 3]>) -> Option<f32> {
    const DELTA: f32 = 1e-4;
    let (sum, count) = pixels.into_iter().fold((0.0f64, 0u64), |(sum, n), [r, g, b]| {
        let l = luminance(r, g, b).max(0.0);
        (sum + f64::from((DELTA + l).ln()), n + 1)
    });
    (count > 0).then(|| (sum / count as f64).exp() as f32)
}

/// Rec. 709 relative luminance.
pub fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}
