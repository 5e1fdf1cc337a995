//! Shared helpers for driving a [`Pipeline`] end to end.

use std::collections::VecDeque;
use std::sync::Arc;

use etl::destination::{CreateOutcome, Destination, InsertOutcome};
use etl::error::{EtlError, EtlResult};
use etl::pipeline::{Pipeline, RunSummary};
use etl::types::{ColumnSchema, Row, TableRef};
use etl_config::shared::{BatchConfig, DestinationConfig, TargetConfig};
use tokio::sync::Mutex;

pub const DATASET_ID: &str = "analytics";
pub const TABLE_ID: &str = "events";

pub fn table() -> TableRef {
    TableRef::new(DATASET_ID, TABLE_ID)
}

pub fn target_config(max_size: usize) -> TargetConfig {
    TargetConfig {
        project_id: "test-project".to_owned(),
        dataset_id: DATASET_ID.to_owned(),
        table_id: TABLE_ID.to_owned(),
        batch: BatchConfig { max_size },
        destination: DestinationConfig::Memory,
        disable_collection: true,
        sentry: None,
    }
}

/// Runs a pipeline over `lines` and returns its result along with everything written to the
/// output.
pub async fn run_lines<D>(
    destination: D,
    max_size: usize,
    lines: &[&str],
) -> (EtlResult<RunSummary>, String)
where
    D: Destination + Clone,
{
    let input = lines.join("\n");
    let mut output = Vec::new();

    let pipeline = Pipeline::new(&target_config(max_size), destination);
    let result = pipeline.run(input.as_bytes(), &mut output).await;

    (result, String::from_utf8(output).unwrap())
}

#[derive(Debug, Default)]
struct Inner {
    existing_dataset: bool,
    existing_table: bool,
    dataset_error: Option<EtlError>,
    dataset_calls: usize,
    table_calls: usize,
    columns: Option<Vec<ColumnSchema>>,
    inserts: Vec<Vec<Row>>,
    insert_script: VecDeque<EtlResult<InsertOutcome>>,
}

/// A destination whose answers are scripted by the test.
///
/// Creation calls answer `Conflict` once the resource exists. Inserts answer with the next
/// scripted outcome, or store every row when the script is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDestination {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_existing_table(self) -> Self {
        {
            let mut inner = self.inner.lock().await;
            inner.existing_dataset = true;
            inner.existing_table = true;
        }

        self
    }

    pub async fn failing_dataset_creation(self, err: EtlError) -> Self {
        self.inner.lock().await.dataset_error = Some(err);
        self
    }

    pub async fn script_insert(&self, outcome: EtlResult<InsertOutcome>) {
        self.inner.lock().await.insert_script.push_back(outcome);
    }

    pub async fn dataset_calls(&self) -> usize {
        self.inner.lock().await.dataset_calls
    }

    pub async fn table_calls(&self) -> usize {
        self.inner.lock().await.table_calls
    }

    /// Columns the table was created with by this destination, if it created it.
    pub async fn columns(&self) -> Option<Vec<ColumnSchema>> {
        self.inner.lock().await.columns.clone()
    }

    /// Rows of every insert call, in call order.
    pub async fn inserts(&self) -> Vec<Vec<Row>> {
        self.inner.lock().await.inserts.clone()
    }
}

impl Destination for ScriptedDestination {
    async fn create_dataset_if_absent(&self, _dataset_id: &str) -> EtlResult<CreateOutcome> {
        let mut inner = self.inner.lock().await;
        inner.dataset_calls += 1;

        if let Some(err) = inner.dataset_error.clone() {
            return Err(err);
        }
        if inner.existing_dataset {
            return Ok(CreateOutcome::Conflict);
        }

        inner.existing_dataset = true;
        Ok(CreateOutcome::Created)
    }

    async fn create_table_if_absent(
        &self,
        _table: &TableRef,
        columns: &[ColumnSchema],
    ) -> EtlResult<CreateOutcome> {
        let mut inner = self.inner.lock().await;
        inner.table_calls += 1;

        if inner.existing_table {
            return Ok(CreateOutcome::Conflict);
        }

        inner.existing_table = true;
        inner.columns = Some(columns.to_vec());
        Ok(CreateOutcome::Created)
    }

    async fn insert_rows(&self, _table: &TableRef, rows: Vec<Row>) -> EtlResult<InsertOutcome> {
        let mut inner = self.inner.lock().await;
        let outcome = inner
            .insert_script
            .pop_front()
            .unwrap_or(Ok(InsertOutcome::Inserted));

        if outcome.is_ok() {
            inner.inserts.push(rows);
        }

        outcome
    }
}
