//! Command-line argument parsing for Umbra.

use std::path::PathBuf;

use clap::Parser;

use crate::{BackendKind, Config};

/// Umbra command-line arguments.
///
/// CLI values override settings loaded from `umbra.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "umbra", about = "Headless deferred renderer")]
pub struct CliArgs {
    /// Output width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Frames to render before writing the image.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Pass executor.
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Where to write the final image.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Time of day in [0, 1).
    #[arg(long)]
    pub time_of_day: Option<f32>,

    /// Seed for sky and glitch variation.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.output.width = w;
        }
        if let Some(h) = args.height {
            self.output.height = h;
        }
        if let Some(frames) = args.frames {
            self.output.frames = frames;
        }
        if let Some(backend) = args.backend {
            self.renderer.backend = backend;
        }
        if let Some(ref path) = args.output {
            self.output.path = path.clone();
        }
        if let Some(tod) = args.time_of_day {
            self.renderer.time_of_day = tod;
        }
        if let Some(seed) = args.seed {
            self.renderer.seed = seed;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
