//! Resumption state handed back to the caller once the records it covers are committed.

mod checkpoint;

pub use checkpoint::Checkpointer;
