//! Carry-over wrappers for single-row transforms.
//!
//! A stage's preprocess step turns a flat record into a working payload nested
//! under the reserved data column. Its postprocess step unnests the payload
//! again. These wrappers adapt plain `Row -> Row` functions to both shapes so a
//! pipeline does not have to re-thread unrelated fields by hand.
//!
//! - [`wrap_preprocess`] keeps every field of the input row and merges the
//!   transform's output on top, then nests the result.
//! - [`wrap_postprocess`] only unwraps; the transform selects what it emits.

use crate::error::{Result, StageError};
use crate::row::{Batch, Row};
use serde_json::Value;

/// Adapt `f` into a preprocess function.
///
/// For an input row `r` the returned function yields `{data_column: r ∪ f(r)}`,
/// with `f(r)` winning on key overlap.
///
/// # Example
/// ```
/// use batchstage::carry_over::wrap_preprocess;
/// use batchstage::row::Row;
/// use serde_json::json;
///
/// let double = |r: &Row| {
///     let id = r["id"].as_i64().unwrap_or_default();
///     json!({"value": id * 2}).as_object().cloned().unwrap()
/// };
/// let wrapped = wrap_preprocess(double, "__data");
///
/// let row = json!({"id": 5, "extra": "memo"}).as_object().cloned().unwrap();
/// let out = wrapped(row);
/// assert_eq!(
///     serde_json::Value::Object(out),
///     json!({"__data": {"id": 5, "extra": "memo", "value": 10}})
/// );
/// ```
pub fn wrap_preprocess<F>(f: F, data_column: impl Into<String>) -> impl Fn(Row) -> Row + Send + Sync
where
    F: Fn(&Row) -> Row + Send + Sync,
{
    let data_column = data_column.into();
    move |mut row: Row| {
        let produced = f(&row);
        row.extend(produced);
        let mut out = Row::new();
        out.insert(data_column.clone(), Value::Object(row));
        out
    }
}

/// Adapt `g` into a postprocess function.
///
/// The returned function reads the working payload from `row[data_column]` and
/// returns `g(payload)`. Fields of the payload that `g` does not emit are dropped.
///
/// # Errors
/// [`StageError::MissingDataColumn`] when the column is absent and
/// [`StageError::PayloadNotObject`] when it is not an object.
pub fn wrap_postprocess<G>(
    g: G,
    data_column: impl Into<String>,
) -> impl Fn(Row) -> Result<Row> + Send + Sync
where
    G: Fn(&Row) -> Row + Send + Sync,
{
    let data_column = data_column.into();
    move |mut row: Row| match row.remove(&data_column) {
        None => Err(StageError::missing_data_column(&data_column)),
        Some(Value::Object(payload)) => Ok(g(&payload)),
        Some(_) => Err(StageError::PayloadNotObject {
            column: data_column.clone(),
        }),
    }
}

/// Apply a wrapped preprocess function to every row of a batch.
pub fn preprocess_batch<F>(batch: Batch, f: F) -> Batch
where
    F: Fn(Row) -> Row,
{
    Batch::from_rows(batch.into_rows().into_iter().map(f).collect())
}

/// Apply a wrapped postprocess function to every row of a batch.
///
/// Fails on the first row rejected by `g`; a non-object payload reports that
/// row's position.
pub fn postprocess_batch<G>(batch: Batch, g: G) -> Result<Batch>
where
    G: Fn(Row) -> Result<Row>,
{
    let rows = batch
        .into_rows()
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            g(row).map_err(|e| match e {
                StageError::PayloadNotObject { .. } => StageError::InvalidPayload { row_index: i },
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Batch::from_rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn test_preprocess_transform_wins_on_overlap() {
        let wrapped = wrap_preprocess(|_: &Row| row(json!({"id": "replaced"})), "D");
        let out = wrapped(row(json!({"id": 1, "keep": true})));
        assert_eq!(out["D"], json!({"id": "replaced", "keep": true}));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_postprocess_non_object_payload() {
        let wrapped = wrap_postprocess(Row::clone, "D");
        let err = wrapped(row(json!({"D": 3}))).unwrap_err();
        assert!(matches!(err, StageError::PayloadNotObject { ref column } if column == "D"));
        assert_eq!(err.to_string(), "data column `D` does not hold an object");
    }

    #[test]
    fn test_postprocess_batch_reports_row() {
        let batch: Batch = serde_json::from_value(json!({
            "D": [{"a": 1}, "oops"],
        }))
        .unwrap();
        let err = postprocess_batch(batch, wrap_postprocess(Row::clone, "D")).unwrap_err();
        assert!(matches!(err, StageError::InvalidPayload { row_index: 1 }));
    }
}
