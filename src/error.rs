//! Error type shared by the row codec, carry-over wrappers, engine and stage descriptor.
//!
//! Every variant is a contract violation. None are retried internally; the caller
//! (usually an orchestrator) decides whether to retry the whole batch, drop it, or halt.

use crate::row::Row;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StageError>;

/// Errors raised while validating, dispatching or assembling a stage invocation.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The reserved data column is absent from a batch or a postprocess input row.
    #[error("missing data column `{column}`")]
    MissingDataColumn { column: String },

    /// A declared expected input key is absent from a row's working payload.
    #[error("row {row_index} is missing required key `{key}`")]
    MissingRequiredKey { row_index: usize, key: String },

    /// A UDF emitted a result without echoing the index-in-batch tag.
    #[error("udf output is missing the index-in-batch tag: {}", display_row(.partial))]
    MissingIndexTag { partial: Row },

    /// The working payload of a row is not an object.
    #[error("row {row_index} has a non-object working payload")]
    InvalidPayload { row_index: usize },

    /// A postprocess input row holds a non-object value under the data column.
    #[error("data column `{column}` does not hold an object")]
    PayloadNotObject { column: String },

    /// A UDF echoed a tag that does not name a row of the current batch.
    #[error("index-in-batch tag {tag} does not address a row of a {num_rows}-row batch")]
    InvalidIndexTag { tag: serde_json::Value, num_rows: usize },

    /// Under exactly-once accounting, a row produced a second output.
    #[error("row {row_index} produced more than one output")]
    DuplicateOutput { row_index: usize },

    /// Under exactly-once accounting, rows ended the invocation without output.
    #[error("missing outputs for rows {rows:?}")]
    MissingOutputs { rows: Vec<usize> },

    /// Columns of a batch disagree on the row count.
    #[error("column `{column}` has {actual} rows, expected {expected}")]
    RaggedBatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// `map_batches_kwargs` pins a batch size different from the requested one.
    #[error("batch_size {configured} in map_batches_kwargs conflicts with requested batch_size {requested}")]
    BatchSizeConflict { configured: u64, requested: u64 },

    /// The user transform failed or was cancelled.
    #[error("udf failed: {0}")]
    Udf(#[source] anyhow::Error),

    /// The UDF factory could not build a replica.
    #[error("failed to instantiate udf: {0}")]
    Instantiate(#[source] anyhow::Error),
}

fn display_row(row: &Row) -> String {
    serde_json::to_string(row).unwrap_or_else(|_| format!("{row:?}"))
}

impl StageError {
    pub(crate) fn missing_data_column(column: &str) -> Self {
        Self::MissingDataColumn {
            column: column.to_string(),
        }
    }
}
