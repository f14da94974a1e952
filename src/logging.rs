//! Structured logging setup.
//!
//! Installs a `tracing` subscriber writing to stderr, either human-readable or
//! as JSON lines. `RUST_LOG` overrides the configured level.
//!
//! ```no_run
//! use column_splitter::{config::LoggingConfig, logging};
//!
//! logging::init(&LoggingConfig::default());
//! tracing::info!("Splitter started");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer as _};

use crate::config::LoggingConfig;

/// Builds the filter: `RUST_LOG` when set and valid, else `config.level`.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// Returns `false` if a subscriber was already installed, which is the case
/// in tests and when embedded in a host that set up its own.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = build_filter(config);

    let layer = if config.json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let installed = tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %config.level, json = config.json, "Logging initialized");
    }
    installed
}
