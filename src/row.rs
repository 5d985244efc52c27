//! Row codec: conversion between column-oriented [`Batch`]es and row-oriented [`Row`]s.
//!
//! A [`Batch`] maps column names to equally long value vectors. The engine works
//! row by row, so batches are materialized into `Vec<Row>` on the way in and each
//! emitted result is packaged back into a one-row batch on the way out.
//!
//! # Example
//!
//! ```
//! use batchstage::row::{Batch, Row};
//! use serde_json::json;
//!
//! let batch: Batch = serde_json::from_value(json!({
//!     "id": [1, 2],
//!     "name": ["a", "b"],
//! })).unwrap();
//!
//! let rows = batch.to_rows();
//! assert_eq!(rows[1]["name"], json!("b"));
//!
//! let back = Batch::from_rows(rows);
//! assert_eq!(back, batch);
//! ```

use crate::error::{Result, StageError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One logical record: field name to value.
pub type Row = Map<String, Value>;

/// Column-oriented collection of rows processed together by one stage invocation.
///
/// All columns hold the same number of values. Columns iterate in name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Batch {
    columns: BTreeMap<String, Vec<Value>>,
}

impl Batch {
    /// A batch with no columns and no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a batch from columns, rejecting ragged input.
    pub fn from_columns<I, K>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Vec<Value>)>,
        K: Into<String>,
    {
        let columns: BTreeMap<String, Vec<Value>> =
            columns.into_iter().map(|(k, v)| (k.into(), v)).collect();
        check_row_count(&columns)?;
        Ok(Self { columns })
    }

    /// Build a batch from rows. The column set is the union of all row keys;
    /// rows lacking a key get `null` in that column.
    #[must_use]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let n = rows.len();
        let mut columns: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for (i, row) in rows.into_iter().enumerate() {
            for (key, value) in row {
                let col = columns.entry(key).or_insert_with(|| vec![Value::Null; n]);
                col[i] = value;
            }
        }
        Self { columns }
    }

    /// Package a single row as a one-row batch.
    #[must_use]
    pub fn from_row(row: Row) -> Self {
        Self::from_rows(vec![row])
    }

    /// Number of rows. A batch without columns has zero rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.columns.values().next().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    #[must_use]
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Column names in iteration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Remove a column and return its values.
    pub fn take_column(&mut self, name: &str) -> Option<Vec<Value>> {
        self.columns.remove(name)
    }

    /// Insert or replace a column. The new column must match the current row count
    /// unless the batch has no columns yet.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<()> {
        let name = name.into();
        let others = self.columns.iter().find(|(k, _)| **k != name);
        if let Some((_, existing)) = others {
            if existing.len() != values.len() {
                return Err(StageError::RaggedBatch {
                    column: name,
                    expected: existing.len(),
                    actual: values.len(),
                });
            }
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Materialize the row at `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<Row> {
        if index >= self.num_rows() {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|(k, col)| (k.clone(), col[index].clone()))
                .collect(),
        )
    }

    /// Row-oriented view: one [`Row`] per position, in batch order.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Row> {
        (0..self.num_rows())
            .map(|i| {
                self.columns
                    .iter()
                    .map(|(k, col)| (k.clone(), col[i].clone()))
                    .collect()
            })
            .collect()
    }

    /// Consume the batch into rows without cloning values.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        let n = self.num_rows();
        let mut rows: Vec<Row> = (0..n).map(|_| Row::new()).collect();
        for (key, col) in self.columns {
            for (row, value) in rows.iter_mut().zip(col) {
                row.insert(key.clone(), value);
            }
        }
        rows
    }

    /// Vertically concatenate batches. Columns absent from some batch are
    /// null-filled for that batch's rows.
    pub fn concat<I>(batches: I) -> Result<Self>
    where
        I: IntoIterator<Item = Batch>,
    {
        let batches: Vec<Batch> = batches.into_iter().collect();
        let total: usize = batches.iter().map(Batch::num_rows).sum();
        let mut columns: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        let mut offset = 0usize;
        for batch in batches {
            let n = batch.num_rows();
            for (key, col) in batch.columns {
                let out = columns
                    .entry(key)
                    .or_insert_with(|| vec![Value::Null; total]);
                for (i, value) in col.into_iter().enumerate() {
                    out[offset + i] = value;
                }
            }
            offset += n;
        }
        check_row_count(&columns)?;
        Ok(Self { columns })
    }

    /// Split into consecutive batches of at most `size` rows.
    ///
    /// A `size` of zero yields the whole batch as one chunk.
    #[must_use]
    pub fn chunks(self, size: usize) -> Vec<Batch> {
        let n = self.num_rows();
        if size == 0 || n <= size {
            return vec![self];
        }
        let mut out: Vec<Batch> = Vec::with_capacity(n.div_ceil(size));
        let mut columns: Vec<(String, std::vec::IntoIter<Value>)> = self
            .columns
            .into_iter()
            .map(|(k, v)| (k, v.into_iter()))
            .collect();
        let mut remaining = n;
        while remaining > 0 {
            let take = remaining.min(size);
            let chunk = columns
                .iter_mut()
                .map(|(k, it)| (k.clone(), it.by_ref().take(take).collect()))
                .collect();
            out.push(Batch { columns: chunk });
            remaining -= take;
        }
        out
    }
}

fn check_row_count(columns: &BTreeMap<String, Vec<Value>>) -> Result<()> {
    let mut iter = columns.iter();
    let Some((_, first)) = iter.next() else {
        return Ok(());
    };
    let expected = first.len();
    for (name, col) in iter {
        if col.len() != expected {
            return Err(StageError::RaggedBatch {
                column: name.clone(),
                expected,
                actual: col.len(),
            });
        }
    }
    Ok(())
}

impl<'de> Deserialize<'de> for Batch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let columns = BTreeMap::<String, Vec<Value>>::deserialize(deserializer)?;
        check_row_count(&columns).map_err(serde::de::Error::custom)?;
        Ok(Self { columns })
    }
}
