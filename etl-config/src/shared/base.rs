use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A destination identifier is empty.
    #[error("`{0}` cannot be empty")]
    EmptyIdentifier(&'static str),
    /// Batches must hold at least one row.
    #[error("`batch.max_size` cannot be zero")]
    BatchMaxSizeZero,
    /// Both a key file and an inline key were given for BigQuery.
    #[error(
        "Invalid BigQuery config: set either `service_account_key_path` or `service_account_key`, not both"
    )]
    AmbiguousServiceAccountKey,
}
