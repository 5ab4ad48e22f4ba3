use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    BackendConfig, Config, LoggingConfig, PriceFeedConfig, TradingConfig, DEFAULT_BASE_URL,
};

/// Environment variables with this prefix override file values, using `__` as the
/// section separator (e.g. `TRADEDESK__BACKEND__BASE_URL`).
pub const ENV_PREFIX: &str = "TRADEDESK";

/// Loads the application configuration from `config.toml` in the working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"))
}

/// Loads the application configuration from the given file.
///
/// The file is optional: every setting has a default, and environment variables
/// are layered on top of whatever the file provides. The result is validated
/// before it is returned.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );
    let config = finish(builder)?;
    tracing::debug!(
        path = %path.display(),
        base_url = %config.backend.base_url,
        "Configuration loaded."
    );
    Ok(config)
}

fn finish(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<Config, ConfigError> {
    // Deserialize the entire configuration into our `Config` struct, then sanity-check it.
    let config = builder.build()?.try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}
