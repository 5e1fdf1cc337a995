use serde::{Deserialize, Serialize};

/// Default number of rows buffered per stream before a flush.
pub const DEFAULT_BATCH_MAX_SIZE: usize = 500;

/// Batching of rows before they are inserted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of rows buffered for a single stream. A full buffer is flushed
    /// immediately.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

fn default_max_size() -> usize {
    DEFAULT_BATCH_MAX_SIZE
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_BATCH_MAX_SIZE,
        }
    }
}
