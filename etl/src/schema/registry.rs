use std::collections::HashMap;

use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::schema::translate_schema;
use crate::types::{ColumnSchema, SchemaMessage, SchemaNode};

/// What the run knows about one stream.
///
/// An entry is replaced wholesale by every schema message for its stream, nothing from the
/// previous declaration is merged into it.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub stream_id: String,
    pub current_schema: SchemaNode,
    pub key_properties: Vec<String>,
    pub bookmark_properties: Vec<String>,
    /// Columns translated from `current_schema`.
    pub columns: Vec<ColumnSchema>,
}

impl StreamEntry {
    pub fn from_message(message: SchemaMessage) -> Self {
        let columns = translate_schema(&message.schema);

        Self {
            stream_id: message.stream,
            current_schema: message.schema,
            key_properties: message.key_properties,
            bookmark_properties: message.bookmark_properties,
            columns,
        }
    }
}

/// Registry of the streams declared so far in a run.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    entries: HashMap<String, StreamEntry>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema message, replacing any previous entry of the same stream.
    ///
    /// Returns the registered entry.
    pub fn register(&mut self, message: SchemaMessage) -> &StreamEntry {
        let entry = StreamEntry::from_message(message);
        let stream_id = entry.stream_id.clone();

        debug!(
            stream = %stream_id,
            columns = entry.columns.len(),
            "registering stream schema"
        );

        self.entries.insert(stream_id.clone(), entry);
        &self.entries[&stream_id]
    }

    /// Returns the entry of `stream_id`, failing if no schema was declared for it.
    pub fn require(&self, stream_id: &str) -> EtlResult<&StreamEntry> {
        match self.entries.get(stream_id) {
            Some(entry) => Ok(entry),
            None => bail!(
                ErrorKind::SchemaNotRegistered,
                "Record received before its schema",
                format!("stream '{stream_id}' has no registered schema")
            ),
        }
    }
}
