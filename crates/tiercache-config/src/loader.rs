use std::path::{Path, PathBuf};

use config::{Config, Environment, File};

use crate::error::ConfigError;
use crate::settings::CacheSettings;

/// Prefix of environment overrides, e.g. `TIERCACHE__LOGGING__LEVEL=debug`.
pub const ENV_PREFIX: &str = "TIERCACHE";

/// File read when no explicit path is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "tiercache.toml";

/// Loads settings from a TOML file plus environment overrides, then validates.
///
/// An explicit `path` must exist. Without one, `tiercache.toml` in the
/// working directory is used when present.
pub fn load_settings(path: Option<&Path>) -> Result<CacheSettings, ConfigError> {
    let mut builder = Config::builder();
    match path {
        Some(p) => {
            builder = builder.add_source(File::from(p.to_path_buf()).required(true));
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path));
            }
        }
    }
    // Environment variable overrides, e.g., TIERCACHE__RETRY__MAX_RETRIES=5
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__"),
    );

    let settings: CacheSettings = builder.build()?.try_deserialize()?;
    settings.validate()?;

    tracing::debug!(
        path = ?path,
        tiers = settings.tiers.len(),
        "cache settings loaded"
    );
    Ok(settings)
}
