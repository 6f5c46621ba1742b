use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::settings::LoggingConfig;

/// Installs the global tracing subscriber. Output goes to stderr.
///
/// `RUST_LOG` wins over the configured level. Calling this more than once
/// keeps the first subscriber.
pub fn init_tracing(config: &LoggingConfig) {
    // Prefer RUST_LOG from env, otherwise use the configured level.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
