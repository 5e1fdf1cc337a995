//! Store implementations for the loader.
//!
//! Each store lives behind a cargo feature and implements [`etl::destination::Destination`].

#[cfg(feature = "bigquery")]
pub mod bigquery;
