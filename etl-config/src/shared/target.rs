use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, DestinationConfig, SentryConfig, ValidationError};

/// Complete configuration of the target.
///
/// Field names match the flat JSON config that singer targets are invoked with, so an
/// existing `config.json` with `project_id`, `dataset_id` and `table_id` loads unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TargetConfig {
    /// Google Cloud project that owns the dataset.
    pub project_id: String,
    /// Dataset holding the destination table.
    pub dataset_id: String,
    /// The single table every stream of the run is loaded into.
    pub table_id: String,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    /// Disables the anonymous usage report sent at startup.
    #[serde(default = "default_disable_collection")]
    pub disable_collection: bool,
    /// Optional Sentry configuration for error tracking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentry: Option<SentryConfig>,
}

fn default_disable_collection() -> bool {
    true
}

impl TargetConfig {
    /// Validates the complete target configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let identifiers = [
            ("project_id", &self.project_id),
            ("dataset_id", &self.dataset_id),
            ("table_id", &self.table_id),
        ];
        for (name, value) in identifiers {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyIdentifier(name));
            }
        }

        if self.batch.max_size == 0 {
            return Err(ValidationError::BatchMaxSizeZero);
        }

        self.destination.validate()
    }
}
