//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the config inside its directory.
pub const CONFIG_FILE_NAME: &str = "umbra.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Final image settings.
    pub output: OutputConfig,
    /// Frame pipeline settings.
    pub renderer: RendererConfig,
    /// Cascaded shadow settings.
    pub shadows: ShadowConfig,
    /// Landscape chunking and LOD settings.
    pub terrain: TerrainConfig,
    /// Asset bindings for post effects and ground textures.
    pub assets: AssetConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Final image configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Width of the render targets in pixels.
    pub width: u32,
    /// Height of the render targets in pixels.
    pub height: u32,
    /// Number of frames the headless app renders before writing the image.
    pub frames: u32,
    /// Where the final image is written.
    pub path: PathBuf,
}

/// Which pass executor drives the frame.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// CPU reference rasterizer.
    #[default]
    Software,
    /// Headless wgpu device.
    Gpu,
}

/// Frame pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// Pass executor.
    pub backend: BackendKind,
    /// Render objects accepted per frame before new submissions are dropped.
    pub max_render_objects: usize,
    /// Enable the ambient occlusion pass. When disabled the pass clears to 1.
    pub ssao: bool,
    /// Sampling radius of the occlusion kernel in world units.
    pub ssao_radius: f32,
    /// Kernel sample count.
    pub ssao_samples: u32,
    /// Occlusion strength multiplier.
    pub ssao_strength: f32,
    /// Exposure at startup.
    pub exposure: f32,
    /// Exposure the tone mapper adapts towards when auto exposure is off.
    pub exposure_target: f32,
    /// Maximum exposure change per second.
    pub exposure_speed: f32,
    /// Derive the exposure target from the previous frame's luminance.
    pub auto_exposure: bool,
    /// Middle-grey key for auto exposure.
    pub auto_exposure_key: f32,
    /// Lower bound of the auto exposure target.
    pub exposure_min: f32,
    /// Upper bound of the auto exposure target.
    pub exposure_max: f32,
    /// Draw the sky dome behind geometry.
    pub sky_enabled: bool,
    /// Draw the sea plane.
    pub sea_enabled: bool,
    /// Height of the sea plane in world units.
    pub sea_level: f32,
    /// Time of day in `[0, 1)`; 0.25 is sunrise, 0.5 noon.
    pub time_of_day: f32,
    /// Seed for sky and glitch variation.
    pub seed: u64,
    /// Glitch distortion strength, 0 disables the effect.
    pub glitch: f32,
}

/// Cascade split scheme.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SplitKind {
    /// Equal depth ranges.
    Uniform,
    /// Geometric progression from near to far.
    Logarithmic,
    /// Blend of uniform and logarithmic weighted by `lambda`.
    #[default]
    Practical,
}

/// Cascaded shadow configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowConfig {
    /// How the view depth range is split.
    pub split: SplitKind,
    /// Logarithmic weight for the practical split scheme.
    pub lambda: f32,
    /// Shadow map resolution per cascade, nearest first.
    pub resolutions: [u32; 3],
    /// Constant depth bias applied when sampling.
    pub depth_bias: f32,
}

/// Landscape chunking and LOD configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Heightmap samples per chunk edge. Must be a power of two.
    pub chunk_size: u32,
    /// A node is drawn whole once camera distance exceeds `lod_ratio` times its radius.
    pub lod_ratio: f32,
    /// How many levels above the leaves a coarse node may be.
    pub max_coarse_depth: u32,
}

/// Asset bindings used by the renderer and the demo scene.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetConfig {
    /// Directory the paths below are relative to.
    pub root: PathBuf,
    /// Color correction LUT image (a 16x16x16 cube laid out as a 256x16 strip).
    pub color_correction: Option<String>,
    /// Vignette texture multiplied over the final image.
    pub vignetting: Option<String>,
    /// Ground textures selected by the landscape attribute weights.
    pub ground_textures: Vec<String>,
    /// Grayscale heightmap image for the demo landscape; noise when absent.
    pub heightmap: Option<String>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for the JSON log file.
    pub log_dir: Option<PathBuf>,
    /// Also write a JSON log file into `log_dir`.
    pub json_log: bool,
    /// Draw LOD node bounding spheres in the overlay pass.
    pub show_lod_bounds: bool,
}

// --- Default implementations ---

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frames: 1,
            path: PathBuf::from("umbra.png"),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Software,
            max_render_objects: 8192,
            ssao: true,
            ssao_radius: 0.75,
            ssao_samples: 16,
            ssao_strength: 1.0,
            exposure: 1.0,
            exposure_target: 1.0,
            exposure_speed: 1.0,
            auto_exposure: false,
            auto_exposure_key: 0.18,
            exposure_min: 0.1,
            exposure_max: 8.0,
            sky_enabled: true,
            sea_enabled: false,
            sea_level: 0.0,
            time_of_day: 0.15,
            seed: 0,
            glitch: 0.0,
        }
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            split: SplitKind::Practical,
            lambda: 0.75,
            resolutions: [2048, 1024, 1024],
            depth_bias: 0.002,
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            lod_ratio: 4.0,
            max_coarse_depth: 3,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
            json_log: false,
            show_lod_bounds: false,
        }
    }
}

/// Platform config directory for Umbra, falling back to the working directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("umbra"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Validation ---

impl Config {
    /// Reject values the renderer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.width == 0 || self.output.height == 0 {
            return Err(ConfigError::Invalid {
                field: "output",
                reason: format!(
                    "resolution must be non-zero, got {}x{}",
                    self.output.width, self.output.height
                ),
            });
        }
        if !self.terrain.chunk_size.is_power_of_two() {
            return Err(ConfigError::Invalid {
                field: "terrain.chunk_size",
                reason: format!("{} is not a power of two", self.terrain.chunk_size),
            });
        }
        if !(0.0..=1.0).contains(&self.shadows.lambda) {
            return Err(ConfigError::Invalid {
                field: "shadows.lambda",
                reason: format!("{} is outside [0, 1]", self.shadows.lambda),
            });
        }
        if self.shadows.resolutions.contains(&0) {
            return Err(ConfigError::Invalid {
                field: "shadows.resolutions",
                reason: "cascade resolution must be non-zero".to_string(),
            });
        }
        if self.renderer.exposure_speed < 0.0 {
            return Err(ConfigError::Invalid {
                field: "renderer.exposure_speed",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `umbra.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("width: 1280"));
        assert!(ron_str.contains("max_render_objects: 8192"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.shadows.split = SplitKind::Logarithmic;
        config.renderer.backend = BackendKind::Gpu;
        config.assets.ground_textures = vec!["grass.png".to_string(), "rock.png".to_string()];
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let config: Config = ron::from_str("(output: (width: 640), terrain: ())").unwrap();
        assert_eq!(config.output.width, 640);
        assert_eq!(config.output.height, 720);
        assert_eq!(config.shadows, ShadowConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.output.width = 320;
        config.renderer.time_of_day = 0.5;
        config.assets.color_correction = Some("lut.png".to_string());

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.terrain.lod_ratio = 8.0;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().terrain.lod_ratio, 8.0);
        assert!(modified.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.terrain.chunk_size = 30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "terrain.chunk_size", .. })
        ));

        let mut config = Config::default();
        config.output.height = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.shadows.lambda = 1.5;
        assert!(config.validate().is_err());
    }
}
