mod client;
mod core;
mod encryption;

pub use client::{BigQueryClient, BigQueryProjectId};
pub use core::BigQueryDestination;
pub use encryption::install_crypto_provider_for_bigquery;
