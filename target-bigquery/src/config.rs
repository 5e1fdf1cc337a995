use std::path::Path;

use etl_config::shared::TargetConfig;
use etl_config::{load_config, load_config_from_path};

/// Loads the [`TargetConfig`] and validates it.
///
/// An explicit `path` replaces the `configuration` directory.
pub fn load_target_config(path: Option<&Path>) -> anyhow::Result<TargetConfig> {
    let config = match path {
        Some(path) => load_config_from_path::<TargetConfig>(path)?,
        None => load_config::<TargetConfig>()?,
    };
    config.validate()?;

    Ok(config)
}
