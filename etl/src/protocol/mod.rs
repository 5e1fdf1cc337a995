//! Line-delimited protocol input.
//!
//! Turns text lines into tagged [`crate::types::Message`]s. Any line that cannot be turned
//! into a message is a fatal error for the run.

mod reader;

pub use reader::{MessageReader, parse_message};
