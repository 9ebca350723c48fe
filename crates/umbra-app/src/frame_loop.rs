//! Fixed-timestep headless frame loop.
//!
//! Every frame advances simulated time by [`FIXED_DT`] regardless of how long
//! rendering took, so output images are reproducible run to run.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};
use umbra_config::Config;
use umbra_render::{RenderBackend, RenderError, Renderer};

use crate::scene::{DemoScene, SceneError};

/// Simulated seconds per frame: 60 Hz.
pub const FIXED_DT: f32 = 1.0 / 60.0;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("render: {0}")]
    Render(#[from] RenderError),

    #[error("scene: {0}")]
    Scene(#[from] SceneError),

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    SaveImage {
        path: PathBuf,
        source: image::ImageError,
    },
}

impl AppError {
    /// Subsystem name reported when the error ends the process.
    pub fn source_kind(&self) -> &'static str {
        match self {
            AppError::Render(_) => "render",
            AppError::Scene(_) => "scene",
            AppError::OutputDir { .. } | AppError::SaveImage { .. } => "output",
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub frames: u32,
    pub output: PathBuf,
    pub final_exposure: f32,
    /// Resource warnings summed over all frames.
    pub resource_warnings: usize,
}

/// Render `config.output.frames` frames of the demo scene and save the last.
///
/// A fatal render error aborts the run at the frame it happened in.
pub fn run<B: RenderBackend>(config: &Config, backend: B) -> Result<RunSummary, AppError> {
    let scene = DemoScene::build(config)?;
    let mut renderer = Renderer::new(config, backend, scene.assets())?;
    renderer.set_time_of_day(config.renderer.time_of_day, config.renderer.seed);

    let frames = config.output.frames.max(1);
    let started = Instant::now();
    let mut resource_warnings = 0;
    let mut final_exposure = 0.0;
    for frame in 0..frames {
        let t = frame as f32 * FIXED_DT;
        scene.submit(&mut renderer, t)?;
        let report = renderer.render(FIXED_DT)?;
        if report.dropped_objects > 0 || report.dropped_lights > 0 {
            warn!(
                "Frame {}: dropped {} objects and {} lights",
                report.frame, report.dropped_objects, report.dropped_lights
            );
        }
        debug!(
            "Frame {}: {} draws, {} terrain nodes, {} culled, exposure {:.3}",
            report.frame, report.mesh_draws, report.terrain_nodes, report.culled, report.exposure
        );
        resource_warnings += report.resource_warnings;
        final_exposure = report.exposure;
    }
    let elapsed = started.elapsed();
    info!(
        "Rendered {frames} frames in {:.1}ms ({:.2}ms/frame)",
        elapsed.as_secs_f64() * 1000.0,
        elapsed.as_secs_f64() * 1000.0 / f64::from(frames)
    );

    let image = renderer.final_image()?;
    let output = config.output.path.clone();
    save_image(&image, &output)?;
    info!("Wrote {}x{} image to {}", image.width(), image.height(), output.display());

    Ok(RunSummary {
        frames,
        output,
        final_exposure,
        resource_warnings,
    })
}

fn save_image(image: &image::RgbaImage, path: &Path) -> Result<(), AppError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| AppError::OutputDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    image.save(path).map_err(|source| AppError::SaveImage {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_render::SoftwareBackend;

    fn small_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.output.width = 48;
        config.output.height = 32;
        config.output.frames = 3;
        config.output.path = dir.join("out").join("frame.png");
        config.shadows.resolutions = [64, 32, 32];
        config.terrain.chunk_size = 8;
        config.renderer.ssao_samples = 8;
        config
    }

    #[test]
    fn test_run_writes_image_of_configured_size() {
        let tmp = tempfile::tempdir().unwrap();
        let config = small_config(tmp.path());
        let summary = run(&config, SoftwareBackend::new()).unwrap();
        assert_eq!(summary.frames, 3);

        let written = image::open(&summary.output).unwrap();
        assert_eq!((written.width(), written.height()), (48, 32));
    }

    #[test]
    fn test_zero_frames_still_renders_once() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = small_config(tmp.path());
        config.output.frames = 0;
        let summary = run(&config, SoftwareBackend::new()).unwrap();
        assert_eq!(summary.frames, 1);
        assert!(summary.output.exists());
    }

    #[test]
    fn test_unwritable_output_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let mut config = small_config(tmp.path());
        config.output.frames = 1;
        config.output.path = blocker.join("frame.png");
        let err = run(&config, SoftwareBackend::new()).unwrap_err();
        assert_eq!(err.source_kind(), "output");
    }

    #[test]
    fn test_render_errors_name_their_subsystem() {
        let err = AppError::from(RenderError::TargetsNotCreated);
        assert_eq!(err.source_kind(), "render");
    }
}
