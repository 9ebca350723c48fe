//! The binary entry point for the headless Umbra renderer.

use clap::Parser;
use tracing::{info, warn};
use umbra_app::frame_loop::{self, AppError};
use umbra_config::{BackendKind, CliArgs, Config, default_config_dir};
use umbra_log::{FatalSignal, init_logging, install_panic_hook, terminate};
use umbra_render::{GpuBackend, SoftwareBackend};

fn main() {
    let args = CliArgs::parse();

    // 1. Load config, then let the command line win
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let (mut config, load_error) = match Config::load_or_create(&config_dir) {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    };
    config.apply_cli_overrides(&args);

    // 2. Logging and the panic funnel
    init_logging(config.debug.log_dir.as_deref(), config.debug.json_log, Some(&config));
    install_panic_hook();
    if let Some(err) = load_error {
        warn!("Using default config, {}: {err}", config_dir.display());
    }
    if let Err(err) = config.validate() {
        terminate(&FatalSignal::from_error("config", &err));
    }

    // 3. Pick the pass executor and render
    let result = match config.renderer.backend {
        BackendKind::Software => frame_loop::run(&config, SoftwareBackend::new()),
        BackendKind::Gpu => match GpuBackend::new() {
            Ok(gpu) => {
                info!("Rendering on {}", gpu.adapter_name());
                frame_loop::run(&config, gpu)
            }
            Err(err) => {
                warn!("GPU backend unavailable ({err}); falling back to software");
                frame_loop::run(&config, SoftwareBackend::new())
            }
        },
    };

    match result {
        Ok(summary) => info!(
            "Done: {} frames, exposure {:.3}, {} resource warnings",
            summary.frames, summary.final_exposure, summary.resource_warnings
        ),
        Err(err) => fail(&err),
    }
}

fn fail(err: &AppError) -> ! {
    terminate(&FatalSignal::from_error(err.source_kind(), err))
}
