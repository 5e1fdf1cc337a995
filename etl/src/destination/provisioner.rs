use tracing::{debug, info};

use crate::destination::base::{CreateOutcome, Destination};
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::{ColumnSchema, TableRef};

/// Creates the dataset and table of a run if they do not exist yet.
///
/// An "already exists" answer from the store is a success, so calling [`TableProvisioner::ensure`]
/// any number of times has the same effect as calling it once. The columns of a pre-existing
/// table are neither compared nor altered.
#[derive(Debug, Clone)]
pub struct TableProvisioner<D> {
    destination: D,
}

impl<D> TableProvisioner<D>
where
    D: Destination,
{
    pub fn new(destination: D) -> Self {
        Self { destination }
    }

    /// Ensures `table` exists, creating its dataset first.
    ///
    /// Fails with [`ErrorKind::ProvisioningFailed`] on any store error other than a conflict.
    pub async fn ensure(&self, table: &TableRef, columns: &[ColumnSchema]) -> EtlResult<()> {
        let outcome = self
            .destination
            .create_dataset_if_absent(&table.dataset_id)
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::ProvisioningFailed,
                    "Failed to create dataset",
                    format!("dataset `{}`: {err}", table.dataset_id)
                )
            })?;
        log_outcome("dataset", &table.dataset_id, outcome);

        let outcome = self
            .destination
            .create_table_if_absent(table, columns)
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::ProvisioningFailed,
                    "Failed to create table",
                    format!("table `{table}`: {err}")
                )
            })?;
        log_outcome("table", &table.to_string(), outcome);

        Ok(())
    }
}

fn log_outcome(resource: &str, name: &str, outcome: CreateOutcome) {
    match outcome {
        CreateOutcome::Created => info!(resource, name, "created {resource}"),
        CreateOutcome::Conflict => debug!(resource, name, "{resource} already exists"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::memory::MemoryDestination;
    use crate::destination::InsertOutcome;
    use crate::types::{ColumnMode, ColumnType, Row};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails creating the dataset, or creating the table when `fail_on_table` is set.
    #[derive(Debug, Clone)]
    struct FailingDestination {
        calls: Arc<AtomicUsize>,
        fail_on_table: bool,
    }

    impl Destination for FailingDestination {
        async fn create_dataset_if_absent(&self, _dataset_id: &str) -> EtlResult<CreateOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_table {
                return Ok(CreateOutcome::Conflict);
            }

            Err(etl_error!(ErrorKind::PermissionDenied, "Access denied"))
        }

        async fn create_table_if_absent(
            &self,
            _table: &TableRef,
            _columns: &[ColumnSchema],
        ) -> EtlResult<CreateOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(etl_error!(ErrorKind::DestinationQueryFailed, "Invalid schema"))
        }

        async fn insert_rows(&self, _table: &TableRef, _rows: Vec<Row>) -> EtlResult<InsertOutcome> {
            Ok(InsertOutcome::Inserted)
        }
    }

    fn columns() -> Vec<ColumnSchema> {
        vec![ColumnSchema::new(
            "id".to_owned(),
            ColumnType::Int64,
            ColumnMode::Nullable,
        )]
    }

    #[tokio::test]
    async fn test_ensure_twice_is_idempotent() {
        let destination = MemoryDestination::new();
        let provisioner = TableProvisioner::new(destination.clone());
        let table = TableRef::new("analytics", "events");

        provisioner.ensure(&table, &columns()).await.unwrap();
        provisioner.ensure(&table, &columns()).await.unwrap();

        assert_eq!(destination.datasets().await, vec!["analytics".to_owned()]);
        assert_eq!(destination.table_columns(&table).await, Some(columns()));
    }

    #[tokio::test]
    async fn test_ensure_keeps_existing_table_columns() {
        let destination = MemoryDestination::new();
        let provisioner = TableProvisioner::new(destination.clone());
        let table = TableRef::new("analytics", "events");

        provisioner.ensure(&table, &columns()).await.unwrap();
        provisioner.ensure(&table, &[]).await.unwrap();

        assert_eq!(destination.table_columns(&table).await, Some(columns()));
    }

    #[tokio::test]
    async fn test_dataset_failure_is_provisioning_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provisioner = TableProvisioner::new(FailingDestination {
            calls: calls.clone(),
            fail_on_table: false,
        });

        let err = provisioner
            .ensure(&TableRef::new("analytics", "events"), &columns())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProvisioningFailed);
        assert!(err.detail().unwrap().contains("analytics"));
        // The table is not attempted once the dataset failed.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_table_failure_is_provisioning_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provisioner = TableProvisioner::new(FailingDestination {
            calls: calls.clone(),
            fail_on_table: true,
        });

        let err = provisioner
            .ensure(&TableRef::new("analytics", "events"), &columns())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProvisioningFailed);
        assert_eq!(err.description(), "Failed to create table");
        assert!(err.detail().unwrap().contains("Invalid schema"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
