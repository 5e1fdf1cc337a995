use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::EtlResult;

/// A state value together with the position of the message that carried it.
#[derive(Debug, Clone, PartialEq)]
struct HeldState {
    value: Value,
    sequence: u64,
}

/// Tracks the latest state value of a run and emits it once at the end.
///
/// Positions are the sequence numbers the dispatcher assigns to messages in input order. A
/// held value is dropped as soon as a flush commits a record that arrived after it, since
/// the value no longer describes what has been committed at that point.
#[derive(Debug, Default)]
pub struct Checkpointer {
    held: Option<HeldState>,
}

impl Checkpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the held value with the one carried by the message at `sequence`.
    ///
    /// A `null` value clears the checkpoint.
    pub fn set(&mut self, value: Value, sequence: u64) {
        self.held = if value.is_null() {
            None
        } else {
            Some(HeldState { value, sequence })
        };
    }

    /// Records that a flush committed rows up to the message at `last_sequence`.
    pub fn on_flush(&mut self, last_sequence: u64) {
        let Some(held) = &self.held else {
            return;
        };

        if last_sequence > held.sequence {
            debug!(
                state_sequence = held.sequence,
                last_sequence, "clearing checkpoint after flush of later records"
            );
            self.held = None;
        }
    }

    pub fn current(&self) -> Option<&Value> {
        self.held.as_ref().map(|held| &held.value)
    }

    /// Writes the held value as a single JSON line to `output`, if there is one.
    ///
    /// Returns the emitted value.
    pub async fn emit<W>(&self, output: &mut W) -> EtlResult<Option<Value>>
    where
        W: AsyncWrite + Unpin,
    {
        let Some(held) = &self.held else {
            info!("no checkpoint to emit");
            return Ok(None);
        };

        let mut line = serde_json::to_vec(&held.value)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;

        info!(sequence = held.sequence, "emitted checkpoint");

        Ok(Some(held.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_latest_state_wins() {
        let mut checkpointer = Checkpointer::new();
        checkpointer.set(json!({"x": 1}), 1);
        checkpointer.set(json!({"x": 2}), 2);

        assert_eq!(checkpointer.current(), Some(&json!({"x": 2})));
    }

    #[test]
    fn test_null_state_clears() {
        let mut checkpointer = Checkpointer::new();
        checkpointer.set(json!({"x": 1}), 1);
        checkpointer.set(Value::Null, 2);

        assert_eq!(checkpointer.current(), None);
    }

    #[test]
    fn test_flush_of_earlier_records_keeps_state() {
        let mut checkpointer = Checkpointer::new();
        checkpointer.set(json!({"x": 1}), 5);
        checkpointer.on_flush(4);

        assert_eq!(checkpointer.current(), Some(&json!({"x": 1})));
    }

    #[test]
    fn test_flush_of_later_records_clears_state() {
        let mut checkpointer = Checkpointer::new();
        checkpointer.set(json!({"x": 1}), 5);
        checkpointer.on_flush(6);

        assert_eq!(checkpointer.current(), None);
    }

    #[tokio::test]
    async fn test_emit_writes_one_line() {
        let mut checkpointer = Checkpointer::new();
        checkpointer.set(json!({"bookmarks": {"users": 10}}), 1);

        let mut output = Vec::new();
        let emitted = checkpointer.emit(&mut output).await.unwrap();

        assert_eq!(emitted, Some(json!({"bookmarks": {"users": 10}})));
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "{\"bookmarks\":{\"users\":10}}\n"
        );
    }

    #[tokio::test]
    async fn test_emit_without_state_writes_nothing() {
        let checkpointer = Checkpointer::new();

        let mut output = Vec::new();
        let emitted = checkpointer.emit(&mut output).await.unwrap();

        assert_eq!(emitted, None);
        assert!(output.is_empty());
    }
}
