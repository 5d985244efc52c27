//! Fixture UDFs for common testing scenarios.
//!
//! Each fixture echoes the index-in-batch tag unless told not to, so they can be
//! dropped into an engine as-is.

use crate::config::IDX_IN_BATCH_COLUMN;
use crate::row::Row;
use crate::udf::{RowStream, StageUdf, channel, iter_stream};
use futures::stream::{self, StreamExt};
use serde_json::Value;

fn tagged(source: &Row) -> Row {
    let mut out = Row::new();
    if let Some(tag) = source.get(IDX_IN_BATCH_COLUMN) {
        out.insert(IDX_IN_BATCH_COLUMN.to_string(), tag.clone());
    }
    out
}

/// Emits `{"processed": 2 * value}` per row, in reverse input order.
///
/// Requires `value` in every payload.
#[derive(Debug, Clone, Default)]
pub struct DoublingUdf {
    /// Drop the index-in-batch tag from every result.
    pub omit_tag: bool,
}

impl DoublingUdf {
    #[must_use]
    pub const fn without_tag() -> Self {
        Self { omit_tag: true }
    }
}

impl StageUdf for DoublingUdf {
    fn expected_input_keys(&self) -> &[&str] {
        &["value"]
    }

    fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
        let omit_tag = self.omit_tag;
        iter_stream(rows.into_iter().rev().map(move |row| {
            let mut out = if omit_tag { Row::new() } else { tagged(&row) };
            let doubled = row
                .get("value")
                .and_then(Value::as_i64)
                .map_or(Value::Null, |v| Value::from(v * 2));
            out.insert("processed".to_string(), doubled);
            out
        }))
    }
}

/// Emits `copies` results per row, each carrying `{"copy": n}`. Zero copies
/// filters every row out.
#[derive(Debug, Clone)]
pub struct FanOutUdf {
    pub copies: usize,
}

impl StageUdf for FanOutUdf {
    fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
        let copies = self.copies;
        iter_stream(rows.into_iter().flat_map(move |row| {
            (0..copies).map(move |n| {
                let mut out = tagged(&row);
                out.insert("copy".to_string(), Value::from(n));
                out
            })
        }))
    }
}

/// Echoes the first `succeed` rows, then fails.
#[derive(Debug, Clone)]
pub struct FailingUdf {
    pub succeed: usize,
}

impl StageUdf for FailingUdf {
    fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
        let ok = rows
            .iter()
            .take(self.succeed)
            .map(|row| Ok(tagged(row)))
            .collect::<Vec<_>>();
        let fail = anyhow::anyhow!("udf gave up after {} rows", self.succeed);
        stream::iter(ok).chain(stream::once(async move { Err(fail) })).boxed()
    }
}

/// Processes every row in its own tokio task and emits results through a
/// channel as tasks complete. Later rows yield fewer times, so completion order
/// tends to run opposite to input order.
///
/// Must be invoked inside a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct ChannelUdf;

impl StageUdf for ChannelUdf {
    fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
        let (emitter, results) = channel(rows.len());
        let n = rows.len();
        for (i, row) in rows.into_iter().enumerate() {
            let emitter = emitter.clone();
            tokio::spawn(async move {
                for _ in 0..(n - i) {
                    tokio::task::yield_now().await;
                }
                let mut out = tagged(&row);
                out.insert("handled".to_string(), Value::Bool(true));
                emitter.emit(out).await;
            });
        }
        results
    }
}
