//! Dispatching of protocol messages.
//!
//! Contains the [`Pipeline`] that reads messages from an input stream, keeps the per-run
//! registries and routes every message to the component handling it: schema messages to
//! translation and provisioning, record messages to validation and batching, state messages
//! to the checkpointer.

use etl_config::shared::TargetConfig;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::batch::{BatchWriter, FlushReport};
use crate::conversions::row::encode_record;
use crate::destination::{Destination, TableProvisioner};
use crate::error::EtlResult;
use crate::protocol::MessageReader;
use crate::schema::StreamRegistry;
use crate::state::Checkpointer;
use crate::types::{ColumnSchema, Message, RecordMessage, SchemaMessage, TableRef};
use crate::validation::RecordValidator;

/// A row refused by the store during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub stream: String,
    /// Position of the row in the insert call that refused it.
    pub index: usize,
    pub reason: String,
}

/// What a completed run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub messages: u64,
    pub records: u64,
    pub batches: u64,
    pub rows_accepted: u64,
    pub rejected_rows: Vec<RejectedRow>,
    /// The checkpoint written to the output, if any.
    pub checkpoint: Option<Value>,
}

impl RunSummary {
    fn record_flush(&mut self, report: FlushReport) {
        self.batches += 1;
        self.rows_accepted += report.accepted as u64;
        self.rejected_rows
            .extend(report.rejected.into_iter().map(|error| RejectedRow {
                stream: report.stream.clone(),
                index: error.index,
                reason: error.reason,
            }));
    }
}

/// Loads a stream of protocol messages into a single destination table.
///
/// A [`Pipeline`] carries every piece of mutable state of a run: the stream registry, the
/// row buffers and the held checkpoint. Messages are processed strictly one at a time in input
/// order, and each call into the destination completes before the next message is read.
///
/// Any error is fatal: processing stops, buffered rows are dropped and no checkpoint is
/// written. Rows refused individually by the store are the only failures a run survives,
/// they are logged and collected in the [`RunSummary`].
#[derive(Debug)]
pub struct Pipeline<D> {
    table: TableRef,
    registry: StreamRegistry,
    validator: RecordValidator,
    provisioner: TableProvisioner<D>,
    writer: BatchWriter<D>,
    checkpointer: Checkpointer,
    provisioned_columns: Option<Vec<ColumnSchema>>,
    sequence: u64,
    summary: RunSummary,
}

impl<D> Pipeline<D>
where
    D: Destination + Clone,
{
    /// Creates a pipeline writing to the table named by `config`.
    pub fn new(config: &TargetConfig, destination: D) -> Self {
        let table = TableRef::new(config.dataset_id.clone(), config.table_id.clone());

        Self {
            registry: StreamRegistry::new(),
            validator: RecordValidator::new(),
            provisioner: TableProvisioner::new(destination.clone()),
            writer: BatchWriter::new(destination, table.clone(), config.batch.max_size),
            checkpointer: Checkpointer::new(),
            provisioned_columns: None,
            sequence: 0,
            summary: RunSummary::default(),
            table,
        }
    }

    /// Processes every message of `input` and writes the final checkpoint to `output`.
    ///
    /// On success, pending rows of every stream have been flushed and the checkpoint, if any,
    /// has been written as a single JSON line.
    pub async fn run<R, W>(mut self, input: R, output: &mut W) -> EtlResult<RunSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(table = %self.table, "starting to load messages");

        let mut reader = MessageReader::new(input);
        while let Some(message) = reader.next_message().await? {
            self.process(message).await?;
        }

        debug!(lines = reader.line_number(), "reached end of input");

        self.finish(output).await
    }

    /// Routes a single message.
    pub async fn process(&mut self, message: Message) -> EtlResult<()> {
        self.sequence += 1;
        self.summary.messages += 1;

        match message {
            Message::Schema(message) => self.handle_schema(message).await,
            Message::Record(message) => self.handle_record(message).await,
            Message::State(message) => {
                debug!(sequence = self.sequence, "received state");
                self.checkpointer.set(message.value, self.sequence);

                Ok(())
            }
            Message::ActivateVersion(message) => {
                debug!(stream = %message.stream, version = ?message.version, "ignoring activate version");

                Ok(())
            }
        }
    }

    /// Flushes every pending row and writes the checkpoint to `output`.
    pub async fn finish<W>(mut self, output: &mut W) -> EtlResult<RunSummary>
    where
        W: AsyncWrite + Unpin,
    {
        for report in self.writer.flush_all().await? {
            self.apply_flush(report);
        }

        self.summary.checkpoint = self.checkpointer.emit(output).await?;

        info!(
            messages = self.summary.messages,
            records = self.summary.records,
            batches = self.summary.batches,
            rows_accepted = self.summary.rows_accepted,
            rows_rejected = self.summary.rejected_rows.len(),
            "finished loading messages"
        );

        Ok(self.summary)
    }

    async fn handle_schema(&mut self, message: SchemaMessage) -> EtlResult<()> {
        let entry = self.registry.register(message);
        let stream = entry.stream_id.clone();
        let columns = entry.columns.clone();

        match &self.provisioned_columns {
            None => {
                info!(stream = %stream, table = %self.table, columns = columns.len(), "provisioning table");
                self.provisioner.ensure(&self.table, &columns).await?;
                self.provisioned_columns = Some(columns);
            }
            Some(provisioned) if *provisioned != columns => {
                warn!(
                    stream = %stream,
                    table = %self.table,
                    unprovisioned_columns = %unprovisioned_columns(provisioned, &columns),
                    "schema differs from the columns the table was provisioned with, the table is not altered"
                );
            }
            Some(_) => {}
        }

        Ok(())
    }

    async fn handle_record(&mut self, message: RecordMessage) -> EtlResult<()> {
        let entry = self.registry.require(&message.stream)?;
        self.validator
            .validate(&message.stream, &message.record, &entry.current_schema)?;

        let columns = self
            .provisioned_columns
            .as_deref()
            .unwrap_or(entry.columns.as_slice());
        let row = encode_record(&message.record, columns);
        self.summary.records += 1;

        if let Some(report) = self.writer.push(&message.stream, self.sequence, row).await? {
            self.apply_flush(report);
        }

        Ok(())
    }

    fn apply_flush(&mut self, report: FlushReport) {
        self.checkpointer.on_flush(report.last_sequence);
        self.summary.record_flush(report);
    }
}

/// Lists the columns of `columns` that the table was not provisioned with.
fn unprovisioned_columns(provisioned: &[ColumnSchema], columns: &[ColumnSchema]) -> String {
    columns
        .iter()
        .filter(|column| !provisioned.contains(column))
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
