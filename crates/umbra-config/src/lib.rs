//! Configuration system for Umbra.
//!
//! Settings persist to disk as RON files, missing fields fall back to their
//! defaults, and command-line arguments override whatever was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AssetConfig, BackendKind, CONFIG_FILE_NAME, Config, DebugConfig, OutputConfig, RendererConfig,
    ShadowConfig, SplitKind, TerrainConfig, default_config_dir,
};
pub use error::ConfigError;
