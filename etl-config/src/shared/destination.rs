use serde::{Deserialize, Serialize};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Store the loader writes to.
///
/// When omitted, BigQuery is used with the application default credentials taken from
/// `GOOGLE_APPLICATION_CREDENTIALS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationConfig {
    /// Keeps rows in memory and discards them at exit. Useful to dry-run a tap.
    Memory,
    /// Google BigQuery.
    BigQuery {
        /// Path to a service account key file.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service_account_key_path: Option<String>,
        /// Inline service account key (JSON).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service_account_key: Option<SerializableSecretString>,
    },
}

impl DestinationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            DestinationConfig::Memory => Ok(()),
            DestinationConfig::BigQuery {
                service_account_key_path: Some(_),
                service_account_key: Some(_),
            } => Err(ValidationError::AmbiguousServiceAccountKey),
            DestinationConfig::BigQuery { .. } => Ok(()),
        }
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        DestinationConfig::BigQuery {
            service_account_key_path: None,
            service_account_key: None,
        }
    }
}
