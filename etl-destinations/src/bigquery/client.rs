use etl::destination::{CreateOutcome, RowError};
use etl::error::{ErrorKind, EtlError, EtlResult};
use etl::etl_error;
use etl::types::{ColumnMode, ColumnSchema, ColumnType, Row};
use gcp_bigquery_client::Client;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::dataset::Dataset;
use gcp_bigquery_client::model::field_type::FieldType;
use gcp_bigquery_client::model::table::Table;
use gcp_bigquery_client::model::table_data_insert_all_request::TableDataInsertAllRequest;
use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::model::table_schema::TableSchema;
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// HTTP status BigQuery answers with when a resource is missing.
const NOT_FOUND_STATUS: i64 = 404;
/// HTTP status BigQuery answers with when a resource already exists.
const CONFLICT_STATUS: i64 = 409;

pub type BigQueryProjectId = String;

/// A client for the BigQuery REST API, scoped to one project.
pub struct BigQueryClient {
    project_id: BigQueryProjectId,
    client: Client,
}

impl BigQueryClient {
    /// Creates a new [`BigQueryClient`] from a Google Cloud service account key file.
    pub async fn new_with_key_path(
        project_id: BigQueryProjectId,
        sa_key_path: &str,
    ) -> EtlResult<BigQueryClient> {
        let client = Client::from_service_account_key_file(sa_key_path)
            .await
            .map_err(bq_error_to_etl_error)?;

        Ok(BigQueryClient { project_id, client })
    }

    /// Creates a new [`BigQueryClient`] from a Google Cloud service account key string.
    pub async fn new_with_key(
        project_id: BigQueryProjectId,
        sa_key: &str,
    ) -> EtlResult<BigQueryClient> {
        let sa_key = parse_service_account_key(sa_key)
            .map_err(BQError::from)
            .map_err(bq_error_to_etl_error)?;
        let client = Client::from_service_account_key(sa_key, false)
            .await
            .map_err(bq_error_to_etl_error)?;

        Ok(BigQueryClient { project_id, client })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Returns the full BigQuery table name in the form `project_id.dataset_id.table_id`.
    pub fn full_table_name(&self, dataset_id: &str, table_id: &str) -> String {
        format!("`{}.{}.{}`", self.project_id, dataset_id, table_id)
    }

    /// Creates a dataset, reporting an existing one instead of failing.
    pub async fn create_dataset(&self, dataset_id: &str) -> EtlResult<CreateOutcome> {
        info!(project_id = %self.project_id, dataset_id, "creating dataset in BigQuery");

        let result = self
            .client
            .dataset()
            .create(Dataset::new(&self.project_id, dataset_id))
            .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) if is_status(&err, CONFLICT_STATUS) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(bq_error_to_etl_error(err)),
        }
    }

    /// Creates a table with the given columns, reporting an existing one instead of failing.
    ///
    /// The columns of an existing table are not compared with `column_schemas`.
    pub async fn create_table(
        &self,
        dataset_id: &str,
        table_id: &str,
        column_schemas: &[ColumnSchema],
    ) -> EtlResult<CreateOutcome> {
        let full_table_name = self.full_table_name(dataset_id, table_id);
        info!("creating table {full_table_name} in BigQuery");

        let table = Table::new(
            &self.project_id,
            dataset_id,
            table_id,
            Self::column_schemas_to_table_schema(column_schemas),
        );
        let result = self.client.table().create(table).await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) if is_status(&err, CONFLICT_STATUS) => Ok(CreateOutcome::Conflict),
            Err(err) if is_status(&err, NOT_FOUND_STATUS) => Err(etl_error!(
                ErrorKind::DestinationError,
                "BigQuery dataset not found",
                format!("cannot create {full_table_name}: {err}")
            )),
            Err(err) => Err(bq_error_to_etl_error(err)),
        }
    }

    /// Streams rows into a table with `tabledata.insertAll`.
    ///
    /// Invalid rows are skipped by BigQuery and returned as [`RowError`]s, every other row is
    /// stored.
    pub async fn insert_rows(
        &self,
        dataset_id: &str,
        table_id: &str,
        rows: Vec<Row>,
    ) -> EtlResult<Vec<RowError>> {
        let mut request = TableDataInsertAllRequest::new();
        request.skip_invalid_rows();
        for row in rows {
            request
                .add_row(None, row)
                .map_err(bq_error_to_etl_error)?;
        }

        let response = self
            .client
            .tabledata()
            .insert_all(&self.project_id, dataset_id, table_id, request)
            .await
            .map_err(bq_error_to_etl_error)?;

        let response = serde_json::to_value(&response)?;

        Ok(parse_insert_errors(&response))
    }

    /// Converts the columns of a table into a BigQuery [`TableSchema`].
    pub fn column_schemas_to_table_schema(column_schemas: &[ColumnSchema]) -> TableSchema {
        TableSchema::new(
            column_schemas
                .iter()
                .map(Self::column_schema_to_field_schema)
                .collect(),
        )
    }

    fn column_schema_to_field_schema(column_schema: &ColumnSchema) -> TableFieldSchema {
        let mut field = match column_schema.typ {
            ColumnType::Record => TableFieldSchema::record(
                &column_schema.name,
                column_schema
                    .children
                    .iter()
                    .map(Self::column_schema_to_field_schema)
                    .collect(),
            ),
            typ => TableFieldSchema::new(&column_schema.name, column_type_to_field_type(typ)),
        };
        field.mode = Some(column_mode_to_field_mode(column_schema.mode).to_owned());

        field
    }
}

impl fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project_id", &self.project_id)
            .finish()
    }
}

fn column_type_to_field_type(typ: ColumnType) -> FieldType {
    match typ {
        ColumnType::Bool => FieldType::Bool,
        ColumnType::Int64 => FieldType::Int64,
        ColumnType::Float64 => FieldType::Float64,
        ColumnType::String => FieldType::String,
        ColumnType::Timestamp => FieldType::Timestamp,
        ColumnType::Record => FieldType::Record,
    }
}

fn column_mode_to_field_mode(mode: ColumnMode) -> &'static str {
    match mode {
        ColumnMode::Nullable => "NULLABLE",
        ColumnMode::Required => "REQUIRED",
        ColumnMode::Repeated => "REPEATED",
    }
}

/// Extracts the per-row errors of an `insertAll` response.
///
/// BigQuery may list several errors for the same row, they are joined into one reason.
/// Rows that were only stopped because another row of the request was invalid do not appear
/// when invalid rows are skipped.
fn parse_insert_errors(response: &Value) -> Vec<RowError> {
    let Some(insert_errors) = response.get("insertErrors").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut reasons = BTreeMap::<usize, Vec<String>>::new();
    for insert_error in insert_errors {
        let Some(index) = insert_error.get("index").and_then(Value::as_u64) else {
            continue;
        };

        let errors = insert_error
            .get("errors")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let entry = reasons.entry(index as usize).or_default();
        for error in errors {
            entry.push(describe_error_proto(error));
        }
    }

    reasons
        .into_iter()
        .map(|(index, reasons)| RowError {
            index,
            reason: if reasons.is_empty() {
                "unknown error".to_owned()
            } else {
                reasons.join("; ")
            },
        })
        .collect()
}

fn describe_error_proto(error: &Value) -> String {
    let reason = error.get("reason").and_then(Value::as_str);
    let message = error.get("message").and_then(Value::as_str);
    let location = error
        .get("location")
        .and_then(Value::as_str)
        .filter(|location| !location.is_empty());

    let mut description = match (reason, message) {
        (Some(reason), Some(message)) => format!("{reason}: {message}"),
        (Some(text), None) | (None, Some(text)) => text.to_owned(),
        (None, None) => "unknown error".to_owned(),
    };
    if let Some(location) = location {
        description.push_str(&format!(" (at {location})"));
    }

    description
}

fn is_status(err: &BQError, status: i64) -> bool {
    matches!(err, BQError::ResponseError { error } if error.error.code == status)
}

/// Converts BigQuery errors to [`EtlError`] with an appropriate error kind.
fn bq_error_to_etl_error(err: BQError) -> EtlError {
    let (kind, description) = match &err {
        BQError::InvalidServiceAccountKey(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account key",
        ),
        BQError::AuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication error",
        ),
        BQError::YupAuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery OAuth authentication error",
        ),
        BQError::NoToken => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication token missing",
        ),
        BQError::RequestError(_) => (
            ErrorKind::DestinationConnectionFailed,
            "BigQuery request failed",
        ),
        BQError::ResponseError { error } => match error.error.code {
            401 => (ErrorKind::AuthenticationError, "BigQuery rejected the credentials"),
            403 => (ErrorKind::PermissionDenied, "BigQuery permission denied"),
            _ => (
                ErrorKind::DestinationQueryFailed,
                "BigQuery response error",
            ),
        },
        BQError::SerializationError(_) => (
            ErrorKind::SerializationError,
            "BigQuery JSON serialization error",
        ),
        _ => (ErrorKind::DestinationError, "BigQuery client error"),
    };

    etl_error!(kind, description, err.to_string())
}
