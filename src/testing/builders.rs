//! Builders for test batches.

use crate::config::DEFAULT_DATA_COLUMN;
use crate::row::{Batch, Row};
use serde_json::Value;

/// Convert a JSON object literal into a [`Row`].
///
/// # Panics
///
/// Panics if `value` is not an object.
///
/// # Example
///
/// ```
/// use batchstage::testing::row_from_json;
/// use serde_json::json;
///
/// let row = row_from_json(json!({"id": 1}));
/// assert_eq!(row["id"], json!(1));
/// ```
#[must_use]
pub fn row_from_json(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A fluent builder for batches carrying a working payload column.
///
/// Sibling columns are given per row alongside each payload so the result
/// always satisfies the row count invariant.
///
/// # Example
///
/// ```
/// use batchstage::testing::BatchBuilder;
/// use serde_json::json;
///
/// let batch = BatchBuilder::new("__data")
///     .add_row(json!({"value": 1}), json!({"extra": "a"}))
///     .add_payload(json!({"value": 2}))
///     .build();
///
/// assert_eq!(batch.num_rows(), 2);
/// assert_eq!(batch.column("extra").unwrap()[1], json!(null));
/// ```
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    data_column: String,
    rows: Vec<Row>,
}

impl Default for BatchBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_COLUMN)
    }
}

impl BatchBuilder {
    #[must_use]
    pub fn new(data_column: impl Into<String>) -> Self {
        Self {
            data_column: data_column.into(),
            rows: Vec::new(),
        }
    }

    /// Add a row holding only a working payload.
    #[must_use]
    pub fn add_payload(self, payload: Value) -> Self {
        self.add_row(payload, Value::Object(Row::new()))
    }

    /// Add a row with a working payload and sibling fields.
    ///
    /// # Panics
    ///
    /// Panics if `siblings` is not an object.
    #[must_use]
    pub fn add_row(mut self, payload: Value, siblings: Value) -> Self {
        let mut row = row_from_json(siblings);
        row.insert(self.data_column.clone(), payload);
        self.rows.push(row);
        self
    }

    /// Add `count` payloads produced by `f(i)`.
    #[must_use]
    pub fn add_generated<F>(mut self, count: usize, f: F) -> Self
    where
        F: Fn(usize) -> Value,
    {
        for i in 0..count {
            self = self.add_payload(f(i));
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Batch {
        if self.rows.is_empty() {
            return Batch::from_columns([(self.data_column, Vec::new())])
                .unwrap_or_default();
        }
        Batch::from_rows(self.rows)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
