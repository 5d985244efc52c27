//! Input validation for stage invocations.
//!
//! Before any user code runs, the engine checks the structural contract of the
//! incoming batch:
//! - the reserved data column is present,
//! - every working payload is an object,
//! - every payload carries each of the UDF's expected input keys.
//!
//! Validation is fail-fast. The first violation, scanning rows in batch order and
//! keys in declared order, fails the whole batch; no row is skipped or repaired.

use crate::error::{Result, StageError};
use crate::row::{Batch, Row};
use serde_json::Value;

/// Split `batch` into its working payloads and the remaining sibling columns.
///
/// # Errors
/// [`StageError::MissingDataColumn`] if `data_column` is absent and
/// [`StageError::InvalidPayload`] for the first non-object payload.
pub fn split_payloads(mut batch: Batch, data_column: &str) -> Result<(Vec<Row>, Batch)> {
    let Some(column) = batch.take_column(data_column) else {
        return Err(StageError::missing_data_column(data_column));
    };
    let payloads = column
        .into_iter()
        .enumerate()
        .map(|(row_index, value)| match value {
            Value::Object(row) => Ok(row),
            _ => Err(StageError::InvalidPayload { row_index }),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((payloads, batch))
}

/// Check that every payload carries every expected key.
///
/// # Errors
/// [`StageError::MissingRequiredKey`] naming the first offending row and key.
pub fn validate_inputs(payloads: &[Row], expected_keys: &[&str]) -> Result<()> {
    for (row_index, row) in payloads.iter().enumerate() {
        if let Some(key) = expected_keys.iter().find(|k| !row.contains_key(**k)) {
            return Err(StageError::MissingRequiredKey {
                row_index,
                key: (*key).to_string(),
            });
        }
    }
    Ok(())
}

/// Read the index-in-batch tag of an emitted result and remove it.
///
/// # Errors
/// [`StageError::MissingIndexTag`] if the tag is absent, and
/// [`StageError::InvalidIndexTag`] if it is not an integer in `0..num_rows`.
pub fn take_index_tag(result: &mut Row, tag_column: &str, num_rows: usize) -> Result<usize> {
    let Some(tag) = result.remove(tag_column) else {
        return Err(StageError::MissingIndexTag {
            partial: result.clone(),
        });
    };
    match tag.as_u64().and_then(|i| usize::try_from(i).ok()) {
        Some(i) if i < num_rows => Ok(i),
        _ => Err(StageError::InvalidIndexTag { tag, num_rows }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(v: Value) -> Vec<Row> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_first_missing_key_reported() {
        let payloads = rows(json!([{"a": 1, "b": 2}, {"a": 1}, {}]));
        let err = validate_inputs(&payloads, &["a", "b"]).unwrap_err();
        assert!(matches!(
            err,
            StageError::MissingRequiredKey { row_index: 1, ref key } if key == "b"
        ));
    }

    #[test]
    fn test_no_expected_keys_accepts_anything() {
        assert!(validate_inputs(&rows(json!([{}, {"x": 1}])), &[]).is_ok());
    }

    #[test]
    fn test_split_keeps_siblings() {
        let batch: Batch =
            serde_json::from_value(json!({"D": [{"v": 1}], "extra": ["a"]})).unwrap();
        let (payloads, siblings) = split_payloads(batch, "D").unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(siblings.column("extra").unwrap(), &[json!("a")]);
        assert!(!siblings.contains_column("D"));
    }

    #[test]
    fn test_tag_out_of_range() {
        let mut result = rows(json!([{"__idx_in_batch": 5}])).remove(0);
        let err = take_index_tag(&mut result, "__idx_in_batch", 2).unwrap_err();
        assert!(matches!(err, StageError::InvalidIndexTag { num_rows: 2, .. }));
    }

    #[test]
    fn test_tag_stripped() {
        let mut result = rows(json!([{"__idx_in_batch": 1, "p": 2}])).remove(0);
        assert_eq!(take_index_tag(&mut result, "__idx_in_batch", 2).unwrap(), 1);
        assert!(!result.contains_key("__idx_in_batch"));
    }
}
