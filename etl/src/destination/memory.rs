use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bail;
use crate::destination::base::{CreateOutcome, Destination, InsertOutcome, RowError};
use crate::error::{ErrorKind, EtlResult};
use crate::types::{ColumnSchema, ColumnType, Row, TableRef};

#[derive(Debug)]
struct Inner {
    datasets: BTreeSet<String>,
    tables: HashMap<TableRef, Vec<ColumnSchema>>,
    rows: HashMap<TableRef, Vec<Row>>,
}

/// A [`Destination`] keeping everything in memory.
///
/// Used for dry runs and tests. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
    reject_undeclared_fields: bool,
}

impl MemoryDestination {
    pub fn new() -> Self {
        let inner = Inner {
            datasets: BTreeSet::new(),
            tables: HashMap::new(),
            rows: HashMap::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            reject_undeclared_fields: false,
        }
    }

    /// Makes inserts refuse rows carrying fields that the table does not declare, like a
    /// store with a fixed schema would.
    pub fn rejecting_undeclared_fields(mut self) -> Self {
        self.reject_undeclared_fields = true;
        self
    }

    pub async fn datasets(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.datasets.iter().cloned().collect()
    }

    pub async fn table_columns(&self, table: &TableRef) -> Option<Vec<ColumnSchema>> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).cloned()
    }

    pub async fn table_rows(&self, table: &TableRef) -> Vec<Row> {
        let inner = self.inner.lock().await;
        inner.rows.get(table).cloned().unwrap_or_default()
    }
}

impl Default for MemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl Destination for MemoryDestination {
    async fn create_dataset_if_absent(&self, dataset_id: &str) -> EtlResult<CreateOutcome> {
        let mut inner = self.inner.lock().await;
        if !inner.datasets.insert(dataset_id.to_owned()) {
            return Ok(CreateOutcome::Conflict);
        }

        info!(dataset_id, "created dataset in memory");

        Ok(CreateOutcome::Created)
    }

    async fn create_table_if_absent(
        &self,
        table: &TableRef,
        columns: &[ColumnSchema],
    ) -> EtlResult<CreateOutcome> {
        let mut inner = self.inner.lock().await;
        if !inner.datasets.contains(&table.dataset_id) {
            bail!(
                ErrorKind::DestinationError,
                "Dataset not found",
                format!("dataset `{}` does not exist", table.dataset_id)
            );
        }
        if inner.tables.contains_key(table) {
            return Ok(CreateOutcome::Conflict);
        }

        info!(%table, columns = columns.len(), "created table in memory");
        inner.tables.insert(table.clone(), columns.to_vec());

        Ok(CreateOutcome::Created)
    }

    async fn insert_rows(&self, table: &TableRef, rows: Vec<Row>) -> EtlResult<InsertOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(columns) = inner.tables.get(table) else {
            bail!(
                ErrorKind::DestinationError,
                "Table not found",
                format!("table `{table}` does not exist")
            );
        };

        let mut accepted = Vec::with_capacity(rows.len());
        let mut errors = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            let undeclared = if self.reject_undeclared_fields {
                undeclared_field(&row, columns)
            } else {
                None
            };

            match undeclared {
                Some(field) => errors.push(RowError {
                    index,
                    reason: format!("no such field: {field}"),
                }),
                None => accepted.push(row),
            }
        }

        debug!(%table, rows = accepted.len(), rejected = errors.len(), "inserting rows in memory");
        inner.rows.entry(table.clone()).or_default().extend(accepted);

        if errors.is_empty() {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::PartialErrors(errors))
        }
    }
}

/// Returns the path of the first field of `row` not declared by `columns`.
fn undeclared_field(row: &Row, columns: &[ColumnSchema]) -> Option<String> {
    for (name, value) in row {
        let Some(column) = columns.iter().find(|column| column.name == *name) else {
            return Some(name.clone());
        };
        if column.typ != ColumnType::Record {
            continue;
        }

        let nested = match value {
            Value::Object(map) => vec![map],
            Value::Array(elements) => elements.iter().filter_map(Value::as_object).collect(),
            _ => vec![],
        };
        for map in nested {
            if let Some(field) = undeclared_field(map, &column.children) {
                return Some(format!("{name}.{field}"));
            }
        }
    }

    None
}
