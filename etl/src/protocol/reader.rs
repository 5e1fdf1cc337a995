use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::debug;

use crate::error::{ErrorKind, EtlResult};
use crate::types::{Message, MessageKind};
use crate::{bail, etl_error};

/// Name of the field discriminating message kinds.
const DISCRIMINATOR_FIELD: &str = "type";

/// Parses one protocol line into a [`Message`].
///
/// Fails with [`ErrorKind::MessageParseFailed`] when the line is not a JSON object or when a
/// recognized message misses required fields, and with [`ErrorKind::UnrecognizedMessage`] when
/// the discriminator is missing or unknown. The raw line is always part of the error detail.
pub fn parse_message(line: &str) -> EtlResult<Message> {
    let value: Value = serde_json::from_str(line).map_err(|err| {
        etl_error!(
            ErrorKind::MessageParseFailed,
            "Unable to parse message",
            format!("{err}; line: {line}")
        )
    })?;

    if !value.is_object() {
        bail!(
            ErrorKind::MessageParseFailed,
            "Message is not a JSON object",
            format!("line: {line}")
        );
    }

    let Some(kind) = value
        .get(DISCRIMINATOR_FIELD)
        .and_then(Value::as_str)
        .and_then(MessageKind::from_discriminator)
    else {
        bail!(
            ErrorKind::UnrecognizedMessage,
            "Unrecognized message",
            format!("line: {line}")
        );
    };

    let message = match kind {
        MessageKind::Schema => Message::Schema(decode(value, kind, line)?),
        MessageKind::Record => Message::Record(decode(value, kind, line)?),
        MessageKind::State => Message::State(decode(value, kind, line)?),
        MessageKind::ActivateVersion => Message::ActivateVersion(decode(value, kind, line)?),
    };

    Ok(message)
}

fn decode<T: DeserializeOwned>(value: Value, kind: MessageKind, line: &str) -> EtlResult<T> {
    serde_json::from_value(value).map_err(|err| {
        etl_error!(
            ErrorKind::MessageParseFailed,
            "Malformed message",
            format!("{kind} message: {err}; line: {line}")
        )
    })
}

/// Reads [`Message`]s line by line from an async buffered input.
#[derive(Debug)]
pub struct MessageReader<R> {
    lines: Lines<R>,
    line_number: u64,
}

impl<R> MessageReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
            line_number: 0,
        }
    }

    /// Returns the number of lines consumed so far, including skipped blank lines.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Reads the next message, or `None` at end of input.
    ///
    /// Whitespace-only lines are skipped.
    pub async fn next_message(&mut self) -> EtlResult<Option<Message>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;

            if line.trim().is_empty() {
                debug!(line_number = self.line_number, "skipping blank input line");
                continue;
            }

            return parse_message(&line).map(Some);
        }

        Ok(None)
    }
}
