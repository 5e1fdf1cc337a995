//! Common types used throughout the loader.
//!
//! Re-exports the protocol messages, the JSON-Schema-like [`SchemaNode`] tree, the store's
//! [`ColumnSchema`] tree and the table and row types handed to destinations.

mod column;
mod message;
mod schema;
mod table;

pub use column::*;
pub use message::*;
pub use schema::*;
pub use table::*;
