use serde::de::DeserializeOwned;
use std::path::Path;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Base configuration file loaded for all environments.
const BASE_CONFIG_FILE: &str = "base";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
///
/// Example: `APP_BATCH__MAX_SIZE` sets the `batch.max_size` field.
const ENV_SEPARATOR: &str = "__";

/// Loads hierarchical configuration from the `configuration` directory.
///
/// Loads configuration in this order:
/// 1. Base configuration from `configuration/base.{yaml,json}`
/// 2. Environment-specific file from `configuration/{environment}.{yaml,json}`, if present
/// 3. Environment variable overrides prefixed with `APP`
pub fn load_config<T>() -> Result<T, config::ConfigError>
where
    T: DeserializeOwned,
{
    let base_path = std::env::current_dir()
        .map_err(|err| config::ConfigError::Message(format!("no current directory: {err}")))?;
    let configuration_directory = base_path.join(CONFIGURATION_DIR);

    let environment = Environment::load()
        .map_err(|err| config::ConfigError::Message(err.to_string()))?;
    let environment_file = configuration_directory.join(environment.to_string());

    let settings = config::Config::builder()
        .add_source(config::File::with_name(
            &configuration_directory.join(BASE_CONFIG_FILE).to_string_lossy(),
        ))
        .add_source(
            config::File::with_name(&environment_file.to_string_lossy()).required(false),
        )
        .add_source(environment_source())
        .build()?;

    settings.try_deserialize::<T>()
}

/// Loads configuration from a single file, as passed with `--config`.
///
/// The format is inferred from the extension (`.json`, `.yaml`, `.yml`). Environment variables
/// prefixed with `APP` override values of the file.
pub fn load_config_from_path<T>(path: &Path) -> Result<T, config::ConfigError>
where
    T: DeserializeOwned,
{
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(environment_source())
        .build()?;

    settings.try_deserialize::<T>()
}

fn environment_source() -> config::Environment {
    // E.g. `APP_DESTINATION__BIG_QUERY__SERVICE_ACCOUNT_KEY_PATH=/key.json` sets
    // `TargetConfig { destination: BigQuery { service_account_key_path } }`.
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
