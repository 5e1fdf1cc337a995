//! Store abstractions and implementations.
//!
//! Provides the [`Destination`] trait through which the loader provisions and fills its table,
//! an in-memory implementation and the [`TableProvisioner`] that makes provisioning idempotent.

mod base;
pub mod memory;
mod provisioner;

pub use base::{CreateOutcome, Destination, InsertOutcome, RowError};
pub use provisioner::TableProvisioner;
