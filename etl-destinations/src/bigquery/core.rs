use etl::destination::{CreateOutcome, Destination, InsertOutcome};
use etl::error::EtlResult;
use etl::types::{ColumnSchema, Row, TableRef};
use std::sync::Arc;
use tracing::{debug, info};

use crate::bigquery::client::{BigQueryClient, BigQueryProjectId};
use crate::bigquery::encryption::install_crypto_provider_for_bigquery;

/// A BigQuery destination writing through the REST API.
///
/// Tables are created from the translated columns and rows are streamed with `insertAll`,
/// skipping the rows BigQuery refuses. Clones share the same client.
#[derive(Debug, Clone)]
pub struct BigQueryDestination {
    client: Arc<BigQueryClient>,
}

impl BigQueryDestination {
    /// Creates a new [`BigQueryDestination`] using a service account key file path.
    pub async fn new_with_key_path(
        project_id: BigQueryProjectId,
        sa_key: &str,
    ) -> EtlResult<Self> {
        install_crypto_provider_for_bigquery();
        let client = BigQueryClient::new_with_key_path(project_id, sa_key).await?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Creates a new [`BigQueryDestination`] using a service account key JSON string.
    pub async fn new_with_key(project_id: BigQueryProjectId, sa_key: &str) -> EtlResult<Self> {
        install_crypto_provider_for_bigquery();
        let client = BigQueryClient::new_with_key(project_id, sa_key).await?;

        Ok(Self {
            client: Arc::new(client),
        })
    }
}

impl Destination for BigQueryDestination {
    async fn create_dataset_if_absent(&self, dataset_id: &str) -> EtlResult<CreateOutcome> {
        let outcome = self.client.create_dataset(dataset_id).await?;
        if outcome == CreateOutcome::Conflict {
            debug!(dataset_id, "dataset already exists in BigQuery");
        }

        Ok(outcome)
    }

    async fn create_table_if_absent(
        &self,
        table: &TableRef,
        columns: &[ColumnSchema],
    ) -> EtlResult<CreateOutcome> {
        let outcome = self
            .client
            .create_table(&table.dataset_id, &table.table_id, columns)
            .await?;
        if outcome == CreateOutcome::Conflict {
            info!(
                "table {} already exists in BigQuery, keeping its columns",
                self.client
                    .full_table_name(&table.dataset_id, &table.table_id)
            );
        }

        Ok(outcome)
    }

    async fn insert_rows(&self, table: &TableRef, rows: Vec<Row>) -> EtlResult<InsertOutcome> {
        if rows.is_empty() {
            return Ok(InsertOutcome::Inserted);
        }

        let row_count = rows.len();
        let errors = self
            .client
            .insert_rows(&table.dataset_id, &table.table_id, rows)
            .await?;

        debug!(
            row_count,
            rejected = errors.len(),
            "streamed rows into BigQuery"
        );

        if errors.is_empty() {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::PartialErrors(errors))
        }
    }
}
