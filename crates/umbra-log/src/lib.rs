//! Structured logging and the fatal-error funnel for Umbra.
//!
//! Console output carries uptime timestamps and module paths; a JSON file
//! layer can be enabled for post-mortem analysis. `log` records from the
//! library crates are forwarded into the same subscriber.

mod fatal;

pub use fatal::{EXIT_FATAL, FatalSignal, install_panic_hook, report, terminate};

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use umbra_config::Config;

/// Filter used when neither `RUST_LOG` nor the config supply one.
pub const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// Name of the JSON log file inside the log directory.
pub const LOG_FILE_NAME: &str = "umbra.log";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file
/// * `json_file` - whether to write the JSON log file at all
/// * `config` - optional configuration supplying `debug.log_level`
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// in one process panics inside `tracing-subscriber`; use [`try_init_logging`]
/// where that can happen.
///
/// ```no_run
/// use umbra_config::Config;
/// use umbra_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, json_file: bool, config: Option<&Config>) {
    let _ = try_init_logging(log_dir, json_file, config);
}

/// Like [`init_logging`], but reports instead of ignoring a second initialization.
pub fn try_init_logging(
    log_dir: Option<&Path>,
    json_file: bool,
    config: Option<&Config>,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter_str = filter_for(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if json_file
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        return subscriber.with(file_layer).try_init();
    }

    subscriber.try_init()
}

/// The filter string derived from the config, falling back to [`DEFAULT_FILTER`].
pub fn filter_for(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => {
            let level = &config.debug.log_level;
            if level.contains('=') {
                level.clone()
            } else {
                format!("{level},wgpu=warn,naga=warn")
            }
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
