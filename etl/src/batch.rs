//! Per-stream buffering of encoded rows and their flushing to the destination.

use std::collections::{BTreeSet, HashMap};

use tracing::{info, warn};

use crate::destination::{Destination, InsertOutcome, RowError};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::types::{Row, TableRef};

/// A buffered row with the position of the record message it came from.
#[derive(Debug, Clone)]
struct BufferedRow {
    sequence: u64,
    row: Row,
}

/// Outcome of one flush of a stream's buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    pub stream: String,
    pub attempted: usize,
    pub accepted: usize,
    pub rejected: Vec<RowError>,
    /// Position of the latest record message included in the flush.
    pub last_sequence: u64,
}

impl FlushReport {
    /// Describes the rows the store refused as a [`ErrorKind::RowsRejected`] error.
    ///
    /// The error is only reported, a flush with rejected rows still succeeds.
    pub fn rejection_error(&self) -> Option<EtlError> {
        if self.rejected.is_empty() {
            return None;
        }

        let rows = self
            .rejected
            .iter()
            .map(|error| format!("row {}: {}", error.index, error.reason))
            .collect::<Vec<_>>()
            .join("; ");

        Some(etl_error!(
            ErrorKind::RowsRejected,
            "Rows rejected by the destination",
            format!("stream `{}`, {rows}", self.stream)
        ))
    }
}

/// Buffers rows per stream and inserts them in batches.
///
/// A stream's buffer is flushed when it reaches `max_size` rows and at the end of the input.
/// Rows refused by the store are reported and dropped, while a failed insert call is fatal.
#[derive(Debug)]
pub struct BatchWriter<D> {
    destination: D,
    table: TableRef,
    max_size: usize,
    buffers: HashMap<String, Vec<BufferedRow>>,
}

impl<D> BatchWriter<D>
where
    D: Destination,
{
    pub fn new(destination: D, table: TableRef, max_size: usize) -> Self {
        Self {
            destination,
            table,
            max_size: max_size.max(1),
            buffers: HashMap::new(),
        }
    }

    /// Appends a row to the buffer of `stream`, flushing the buffer if it is full.
    pub async fn push(
        &mut self,
        stream: &str,
        sequence: u64,
        row: Row,
    ) -> EtlResult<Option<FlushReport>> {
        let buffer = self.buffers.entry(stream.to_owned()).or_default();
        buffer.push(BufferedRow { sequence, row });

        if buffer.len() < self.max_size {
            return Ok(None);
        }

        self.flush(stream).await
    }

    /// Number of rows waiting in the buffer of `stream`.
    pub fn pending(&self, stream: &str) -> usize {
        self.buffers.get(stream).map_or(0, Vec::len)
    }

    /// Flushes the buffer of `stream`. Returns `None` if there was nothing to flush.
    pub async fn flush(&mut self, stream: &str) -> EtlResult<Option<FlushReport>> {
        let Some(buffer) = self.buffers.get_mut(stream) else {
            return Ok(None);
        };
        if buffer.is_empty() {
            return Ok(None);
        }

        let buffered = std::mem::take(buffer);
        let attempted = buffered.len();
        let last_sequence = buffered
            .iter()
            .map(|buffered| buffered.sequence)
            .max()
            .unwrap_or_default();
        let rows = buffered.into_iter().map(|buffered| buffered.row).collect();

        let outcome = self
            .destination
            .insert_rows(&self.table, rows)
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::WriteFailed,
                    "Failed to insert rows",
                    format!("stream `{stream}`, {attempted} rows into `{}`: {err}", self.table)
                )
            })?;

        let rejected = match outcome {
            InsertOutcome::Inserted => Vec::new(),
            InsertOutcome::PartialErrors(errors) => errors,
        };
        let rejected_rows = rejected
            .iter()
            .map(|error| error.index)
            .collect::<BTreeSet<_>>()
            .len();
        let accepted = attempted.saturating_sub(rejected_rows);

        info!(stream, attempted, accepted, rejected = rejected_rows, "flushed batch");

        let report = FlushReport {
            stream: stream.to_owned(),
            attempted,
            accepted,
            rejected,
            last_sequence,
        };
        if let Some(err) = report.rejection_error() {
            warn!(stream, error = %err, "destination rejected rows");
        }

        Ok(Some(report))
    }

    /// Flushes every stream with pending rows, in stream name order.
    pub async fn flush_all(&mut self) -> EtlResult<Vec<FlushReport>> {
        let mut streams = self
            .buffers
            .iter()
            .filter(|(_, buffer)| !buffer.is_empty())
            .map(|(stream, _)| stream.clone())
            .collect::<Vec<_>>();
        streams.sort_unstable();

        let mut reports = Vec::with_capacity(streams.len());
        for stream in streams {
            if let Some(report) = self.flush(&stream).await? {
                reports.push(report);
            }
        }

        Ok(reports)
    }
}
