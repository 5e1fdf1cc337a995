//! Stream schemas: translation into store columns and the per-run registry.

mod registry;
mod translator;

pub use registry::{StreamEntry, StreamRegistry};
pub use translator::{scalar_column_type, translate_property, translate_schema};
