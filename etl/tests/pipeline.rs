mod common;

use etl::destination::memory::MemoryDestination;
use etl::destination::{InsertOutcome, RowError};
use etl::error::ErrorKind;
use etl::etl_error;
use etl::pipeline::{RejectedRow, RunSummary};
use etl::types::{ColumnMode, ColumnSchema, ColumnType};
use etl_telemetry::tracing::init_test_tracing;
use serde_json::json;

use crate::common::{ScriptedDestination, run_lines, table};

const USERS_SCHEMA: &str = r#"{"type": "SCHEMA", "stream": "A", "schema": {"properties": {"id": {"type": "integer"}}}, "key_properties": ["id"]}"#;

#[tokio::test]
async fn checkpoint_is_latest_state_after_all_records_are_flushed() {
    init_test_tracing();
    let destination = ScriptedDestination::new();

    let (result, output) = run_lines(
        destination.clone(),
        500,
        &[
            USERS_SCHEMA,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 1}}"#,
            r#"{"type": "STATE", "value": {"x": 1}}"#,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 2}}"#,
            r#"{"type": "STATE", "value": {"x": 2}}"#,
        ],
    )
    .await;

    let summary = result.unwrap();
    assert_eq!(output, "{\"x\":2}\n");
    assert_eq!(summary.checkpoint, Some(json!({"x": 2})));
    assert_eq!(summary.messages, 5);
    assert_eq!(summary.records, 2);
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.rows_accepted, 2);

    let inserts = destination.inserts().await;
    assert_eq!(inserts.len(), 1);
    let ids = inserts[0].iter().map(|row| row["id"].clone()).collect::<Vec<_>>();
    assert_eq!(ids, vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn record_before_schema_aborts_without_checkpoint() {
    init_test_tracing();
    let destination = ScriptedDestination::new();

    let (result, output) = run_lines(
        destination.clone(),
        500,
        &[
            r#"{"type": "STATE", "value": {"x": 1}}"#,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 1}}"#,
        ],
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaNotRegistered);
    assert!(output.is_empty());
    assert!(destination.inserts().await.is_empty());
}

#[tokio::test]
async fn partial_rejection_is_reported_and_run_continues() {
    init_test_tracing();
    let destination = ScriptedDestination::new();
    destination
        .script_insert(Ok(InsertOutcome::PartialErrors(vec![RowError {
            index: 1,
            reason: "invalid value for field id".to_owned(),
        }])))
        .await;

    let (result, output) = run_lines(
        destination.clone(),
        3,
        &[
            USERS_SCHEMA,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 1}}"#,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 2}}"#,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 3}}"#,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 4}}"#,
            r#"{"type": "STATE", "value": {"done": true}}"#,
        ],
    )
    .await;

    let summary = result.unwrap();
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.rows_accepted, 3);
    assert_eq!(
        summary.rejected_rows,
        vec![RejectedRow {
            stream: "A".to_owned(),
            index: 1,
            reason: "invalid value for field id".to_owned(),
        }]
    );
    assert_eq!(output, "{\"done\":true}\n");
    assert_eq!(destination.inserts().await.len(), 2);
}

#[tokio::test]
async fn one_rejected_row_out_of_three() {
    init_test_tracing();
    let destination = MemoryDestination::new().rejecting_undeclared_fields();

    let (result, output) = run_lines(
        destination.clone(),
        500,
        &[
            USERS_SCHEMA,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 1}}"#,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 2, "extra": "x"}}"#,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 3}}"#,
        ],
    )
    .await;

    let summary = result.unwrap();
    assert_eq!(summary.rows_accepted, 2);
    assert_eq!(summary.rejected_rows.len(), 1);
    assert_eq!(summary.rejected_rows[0].index, 1);
    assert_eq!(summary.rejected_rows[0].reason, "no such field: extra");
    assert!(output.is_empty());
    assert_eq!(destination.table_rows(&table()).await.len(), 2);
}

#[tokio::test]
async fn transport_failure_is_fatal() {
    init_test_tracing();
    let destination = ScriptedDestination::new();
    destination
        .script_insert(Err(etl_error!(
            ErrorKind::DestinationConnectionFailed,
            "Connection reset"
        )))
        .await;

    let (result, output) = run_lines(
        destination,
        500,
        &[
            USERS_SCHEMA,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 1}}"#,
            r#"{"type": "STATE", "value": {"x": 1}}"#,
        ],
    )
    .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::WriteFailed);
    assert!(output.is_empty());
}

#[tokio::test]
async fn provisioning_twice_succeeds() {
    init_test_tracing();
    let destination = MemoryDestination::new();

    for _ in 0..2 {
        let (result, _) = run_lines(
            destination.clone(),
            500,
            &[
                USERS_SCHEMA,
                r#"{"type": "RECORD", "stream": "A", "record": {"id": 1}}"#,
            ],
        )
        .await;
        result.unwrap();
    }

    assert_eq!(destination.table_rows(&table()).await.len(), 2);
}

#[tokio::test]
async fn existing_table_is_not_an_error() {
    init_test_tracing();
    let destination = ScriptedDestination::new().with_existing_table().await;

    let (result, _) = run_lines(destination.clone(), 500, &[USERS_SCHEMA]).await;

    result.unwrap();
    assert_eq!(destination.dataset_calls().await, 1);
    assert_eq!(destination.table_calls().await, 1);
    assert_eq!(destination.columns().await, None);
}

#[tokio::test]
async fn provisioning_failure_is_fatal() {
    init_test_tracing();
    let destination = ScriptedDestination::new()
        .failing_dataset_creation(etl_error!(
            ErrorKind::PermissionDenied,
            "Access denied"
        ))
        .await;

    let (result, output) = run_lines(
        destination.clone(),
        500,
        &[r#"{"type": "STATE", "value": 1}"#, USERS_SCHEMA],
    )
    .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::ProvisioningFailed);
    assert!(output.is_empty());
    assert_eq!(destination.table_calls().await, 0);
}

#[tokio::test]
async fn table_is_provisioned_from_translated_columns() {
    init_test_tracing();
    let destination = ScriptedDestination::new();

    let schema = json!({
        "type": "SCHEMA",
        "stream": "orders",
        "key_properties": ["id"],
        "schema": {
            "properties": {
                "id": {"type": ["null", "integer"]},
                "created_at": {"type": "string", "format": "date-time"},
                "lines": {"items": {"properties": {"n": {"type": "string"}}}, "type": "array"}
            }
        }
    })
    .to_string();

    let (result, _) = run_lines(destination.clone(), 500, &[schema.as_str()]).await;
    result.unwrap();

    let mut columns = destination.columns().await.unwrap();
    columns.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(
        columns,
        vec![
            ColumnSchema::new(
                "created_at".to_owned(),
                ColumnType::Timestamp,
                ColumnMode::Nullable
            ),
            ColumnSchema::new("id".to_owned(), ColumnType::Int64, ColumnMode::Nullable),
            ColumnSchema::record(
                "lines".to_owned(),
                ColumnMode::Repeated,
                vec![ColumnSchema::new(
                    "n".to_owned(),
                    ColumnType::String,
                    ColumnMode::Nullable
                )]
            ),
        ]
    );
}

#[tokio::test]
async fn table_is_provisioned_once_per_run() {
    init_test_tracing();
    let destination = ScriptedDestination::new();
    let other_schema = r#"{"type": "SCHEMA", "stream": "B", "schema": {"properties": {"name": {"type": "string"}}}, "key_properties": []}"#;

    let (result, _) = run_lines(
        destination.clone(),
        500,
        &[USERS_SCHEMA, other_schema, USERS_SCHEMA],
    )
    .await;

    result.unwrap();
    assert_eq!(destination.table_calls().await, 1);
    assert_eq!(destination.columns().await.unwrap().len(), 1);
}

#[tokio::test]
async fn records_are_encoded_for_the_store() {
    init_test_tracing();
    let destination = ScriptedDestination::new();
    let schema = r#"{"type": "SCHEMA", "stream": "A", "schema": {"properties": {"at": {"type": ["null", "string"], "format": "date-time"}, "meta": {"type": "object"}}}, "key_properties": []}"#;

    let (result, _) = run_lines(
        destination.clone(),
        500,
        &[
            schema,
            r#"{"type": "RECORD", "stream": "A", "record": {"at": "2024-06-01T12:00:00+02:00", "meta": {"k": [1]}}}"#,
        ],
    )
    .await;

    result.unwrap();
    let inserts = destination.inserts().await;
    assert_eq!(inserts[0][0]["at"], json!("2024-06-01T10:00:00.000000Z"));
    assert_eq!(inserts[0][0]["meta"], json!("{\"k\":[1]}"));
}

#[tokio::test]
async fn full_batch_flush_clears_earlier_state() {
    init_test_tracing();
    let destination = ScriptedDestination::new();

    let (result, output) = run_lines(
        destination.clone(),
        2,
        &[
            USERS_SCHEMA,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 1}}"#,
            r#"{"type": "STATE", "value": {"x": 1}}"#,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 2}}"#,
        ],
    )
    .await;

    let summary = result.unwrap();
    assert_eq!(summary.checkpoint, None);
    assert!(output.is_empty());
    assert_eq!(destination.inserts().await.len(), 1);
}

#[tokio::test]
async fn invalid_line_is_fatal() {
    init_test_tracing();
    let destination = ScriptedDestination::new();

    let (result, output) = run_lines(
        destination.clone(),
        500,
        &[
            USERS_SCHEMA,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 1}}"#,
            r#"{"type": "STATE", "value": {"x": 1}}"#,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": 2"#,
        ],
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MessageParseFailed);
    assert!(err.detail().unwrap().contains(r#"{"id": 2"#));
    assert!(output.is_empty());
    assert!(destination.inserts().await.is_empty());
}

#[tokio::test]
async fn unrecognized_message_is_fatal() {
    init_test_tracing();

    let (result, output) = run_lines(
        ScriptedDestination::new(),
        500,
        &[r#"{"type": "STATE", "value": 1}"#, r#"{"type": "BATCH"}"#],
    )
    .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::UnrecognizedMessage);
    assert!(output.is_empty());
}

#[tokio::test]
async fn invalid_record_is_fatal() {
    init_test_tracing();

    let (result, output) = run_lines(
        ScriptedDestination::new(),
        500,
        &[
            USERS_SCHEMA,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": "one"}}"#,
        ],
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert!(err.detail().unwrap().contains("field `id`"));
    assert!(output.is_empty());
}

#[tokio::test]
async fn records_are_validated_against_the_latest_schema() {
    init_test_tracing();
    let string_ids = r#"{"type": "SCHEMA", "stream": "A", "schema": {"properties": {"id": {"type": "string"}}}, "key_properties": ["id"]}"#;

    let (result, _) = run_lines(
        ScriptedDestination::new(),
        500,
        &[
            USERS_SCHEMA,
            string_ids,
            r#"{"type": "RECORD", "stream": "A", "record": {"id": "one"}}"#,
        ],
    )
    .await;

    assert_eq!(result.unwrap().records, 1);
}

#[tokio::test]
async fn activate_version_and_blank_lines_are_ignored() {
    init_test_tracing();
    let destination = ScriptedDestination::new();

    let (result, output) = run_lines(
        destination.clone(),
        500,
        &[
            USERS_SCHEMA,
            "",
            r#"{"type": "ACTIVATE_VERSION", "stream": "A", "version": 1}"#,
            "   ",
            r#"{"type": "STATE", "value": {"x": 1}}"#,
        ],
    )
    .await;

    let summary = result.unwrap();
    assert_eq!(summary.messages, 3);
    assert_eq!(output, "{\"x\":1}\n");
    assert!(destination.inserts().await.is_empty());
}

#[tokio::test]
async fn empty_input_emits_nothing() {
    init_test_tracing();

    let (result, output) = run_lines(ScriptedDestination::new(), 500, &[]).await;

    assert_eq!(result.unwrap(), RunSummary::default());
    assert!(output.is_empty());
}
