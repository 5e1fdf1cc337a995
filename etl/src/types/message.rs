use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::types::schema::SchemaNode;

/// A protocol message read from the input stream.
///
/// The variants are exhaustive: any other discriminator is rejected by the reader before a
/// [`Message`] is built.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Schema(SchemaMessage),
    Record(RecordMessage),
    State(StateMessage),
    ActivateVersion(ActivateVersionMessage),
}

impl Message {
    /// Returns the kind of the message as it appears in the `type` field.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Schema(_) => MessageKind::Schema,
            Message::Record(_) => MessageKind::Record,
            Message::State(_) => MessageKind::State,
            Message::ActivateVersion(_) => MessageKind::ActivateVersion,
        }
    }

    /// Returns the stream the message belongs to, if it belongs to one.
    pub fn stream(&self) -> Option<&str> {
        match self {
            Message::Schema(message) => Some(&message.stream),
            Message::Record(message) => Some(&message.stream),
            Message::State(_) => None,
            Message::ActivateVersion(message) => Some(&message.stream),
        }
    }
}

/// Discriminator values of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Schema,
    Record,
    State,
    ActivateVersion,
}

impl MessageKind {
    /// Resolves a discriminator value, ignoring ASCII case.
    pub fn from_discriminator(value: &str) -> Option<MessageKind> {
        match value.to_ascii_uppercase().as_str() {
            "SCHEMA" => Some(MessageKind::Schema),
            "RECORD" => Some(MessageKind::Record),
            "STATE" => Some(MessageKind::State),
            "ACTIVATE_VERSION" => Some(MessageKind::ActivateVersion),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageKind::Schema => write!(f, "SCHEMA"),
            MessageKind::Record => write!(f, "RECORD"),
            MessageKind::State => write!(f, "STATE"),
            MessageKind::ActivateVersion => write!(f, "ACTIVATE_VERSION"),
        }
    }
}

/// Declares (or redeclares) the schema of a stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchemaMessage {
    pub stream: String,
    pub schema: SchemaNode,
    pub key_properties: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bookmark_properties: Vec<String>,
}

/// Carries one record of a stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordMessage {
    pub stream: String,
    pub record: Map<String, Value>,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub time_extracted: Option<String>,
}

/// Carries an opaque resumption value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateMessage {
    pub value: Value,
}

/// Marks a new table version of a stream. Accepted and ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivateVersionMessage {
    pub stream: String,
    #[serde(default)]
    pub version: Option<u64>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
