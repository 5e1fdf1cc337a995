use std::future::Future;

use crate::error::EtlResult;
use crate::types::{ColumnSchema, Row, TableRef};

/// Result of a create-if-absent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The resource already existed.
    Conflict,
}

/// A row refused by the store, identified by its position in the insert call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub index: usize,
    pub reason: String,
}

/// Result of an insert call that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Some rows were refused, all other rows of the call were stored.
    PartialErrors(Vec<RowError>),
}

/// The column-oriented store the loader writes to.
///
/// Every method returns `Err` only for failures other than the ones modelled by its outcome:
/// an existing resource is a [`CreateOutcome::Conflict`] and refused rows are
/// [`InsertOutcome::PartialErrors`]. Implementations should not retry internally beyond what
/// their client already does.
pub trait Destination {
    fn create_dataset_if_absent(
        &self,
        dataset_id: &str,
    ) -> impl Future<Output = EtlResult<CreateOutcome>> + Send;

    fn create_table_if_absent(
        &self,
        table: &TableRef,
        columns: &[ColumnSchema],
    ) -> impl Future<Output = EtlResult<CreateOutcome>> + Send;

    fn insert_rows(
        &self,
        table: &TableRef,
        rows: Vec<Row>,
    ) -> impl Future<Output = EtlResult<InsertOutcome>> + Send;
}
