//! Assertion functions for testing stage outputs.
//!
//! Engines forward results in emission order, which is usually not input order.
//! These helpers compare outputs without depending on that order.

use crate::row::{Batch, Row};
use serde_json::Value;
use std::collections::BTreeMap;

/// Assert that indexed outputs name every input position in `0..num_rows`
/// exactly once.
///
/// # Panics
///
/// Panics on a missing, duplicated or out-of-range position.
///
/// # Example
///
/// ```
/// use batchstage::row::Batch;
/// use batchstage::testing::assert_positions_cover;
///
/// let outputs = vec![(1, Batch::empty()), (0, Batch::empty())];
/// assert_positions_cover(&outputs, 2);
/// ```
pub fn assert_positions_cover(outputs: &[(usize, Batch)], num_rows: usize) {
    let mut seen = vec![0usize; num_rows];
    for (idx, _) in outputs {
        assert!(
            *idx < num_rows,
            "Position {idx} out of range for a {num_rows}-row batch"
        );
        seen[*idx] += 1;
    }
    let missing: Vec<usize> = (0..num_rows).filter(|i| seen[*i] == 0).collect();
    let duplicated: Vec<usize> = (0..num_rows).filter(|i| seen[*i] > 1).collect();
    assert!(
        missing.is_empty() && duplicated.is_empty(),
        "Position coverage mismatch:\n  Missing: {missing:?}\n  Duplicated: {duplicated:?}"
    );
}

/// Assert that every forwarded batch holds exactly one row.
///
/// # Panics
///
/// Panics if any batch has a different row count.
pub fn assert_all_single_row(outputs: &[Batch]) {
    for (i, batch) in outputs.iter().enumerate() {
        assert_eq!(
            batch.num_rows(),
            1,
            "Output {i} has {} rows, expected 1: {batch:?}",
            batch.num_rows()
        );
    }
}

/// Assert that two lists of batches hold the same batches, ignoring order.
///
/// # Panics
///
/// Panics if the multisets of batches differ.
pub fn assert_batches_unordered_eq(actual: &[Batch], expected: &[Batch]) {
    let key = |b: &Batch| serde_json::to_string(b).unwrap_or_else(|_| format!("{b:?}"));
    let mut a: Vec<String> = actual.iter().map(key).collect();
    let mut e: Vec<String> = expected.iter().map(key).collect();
    a.sort();
    e.sort();
    assert_eq!(
        a, e,
        "Batch content mismatch (order-insensitive):\n  Expected: {e:?}\n  Actual: {a:?}"
    );
}

/// Pull the working payload of the first row of every batch.
///
/// # Panics
///
/// Panics if a batch lacks `data_column` or its payload is not an object.
#[must_use]
pub fn collect_payloads(outputs: &[Batch], data_column: &str) -> Vec<Row> {
    outputs
        .iter()
        .map(|batch| {
            let column = batch
                .column(data_column)
                .unwrap_or_else(|| panic!("Output batch lacks column `{data_column}`: {batch:?}"));
            match column.first() {
                Some(Value::Object(row)) => row.clone(),
                other => panic!("Expected an object payload, got {other:?}"),
            }
        })
        .collect()
}

/// Restore input order from indexed outputs. Fan-out keeps emission order
/// within a position.
#[must_use]
pub fn sort_by_position(outputs: Vec<(usize, Batch)>) -> Vec<Batch> {
    let mut by_pos: BTreeMap<usize, Vec<Batch>> = BTreeMap::new();
    for (idx, batch) in outputs {
        by_pos.entry(idx).or_default().push(batch);
    }
    by_pos.into_values().flatten().collect()
}
