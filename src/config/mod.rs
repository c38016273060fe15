mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BrokerSettings, LoggingSettings, PublisherSettings, ServerSettings, Settings,
    ShutdownSettings,
};

/// Prefix for environment overrides, e.g. `TICKCAST__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "TICKCAST";

/// Loads the configuration from `config/default.*` and the environment,
/// merged over the built-in defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit config file base name (no
/// extension). The file is optional.
pub fn load_config_from(file: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
