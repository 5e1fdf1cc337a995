//! Loads streams of singer-style protocol messages into a column-oriented store.
//!
//! A run reads newline-delimited JSON messages, one at a time:
//!
//! - `SCHEMA` messages declare a stream. Their JSON-Schema-like description is translated into
//!   store columns ([`schema`]) and the destination table is provisioned idempotently
//!   ([`destination::TableProvisioner`]).
//! - `RECORD` messages are validated against their stream's schema ([`validation`]), encoded
//!   for the store ([`conversions`]) and buffered per stream until a batch is full
//!   ([`batch`]).
//! - `STATE` messages update the checkpoint ([`state`]), which is written once the run
//!   completes.
//!
//! The [`pipeline::Pipeline`] ties these together. Stores implement
//! [`destination::Destination`].

pub mod batch;
pub mod conversions;
pub mod destination;
pub mod error;
mod macros;
pub mod pipeline;
pub mod protocol;
pub mod schema;
pub mod state;
pub mod types;
pub mod validation;
