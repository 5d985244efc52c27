//! Stage execution engine.
//!
//! [`StageEngine`] applies a [`StageUdf`] to one batch at a time. An invocation
//! moves through the phases of [`StagePhase`]:
//!
//! 1. **ReceivedBatch → Validated**: the data column must exist, every payload
//!    must be an object carrying the UDF's expected input keys.
//! 2. **Validated → Dispatched**: each payload is stamped with its
//!    [`IDX_IN_BATCH_COLUMN`] position and the UDF is invoked once with all rows.
//! 3. **Dispatched → Collecting**: every emitted result is matched back to its
//!    input row by tag, merged into that row's payload, and forwarded right away
//!    as a one-row batch that also carries the row's sibling columns.
//! 4. **Collecting → Assembled**: the UDF stream ended.
//!
//! Any contract violation moves the invocation to **Failed**: the output stream
//! yields the error once and then ends. Batches forwarded before the failure stay
//! forwarded.
//!
//! # Example
//!
//! ```
//! use batchstage::config::IDX_IN_BATCH_COLUMN;
//! use batchstage::engine::StageEngine;
//! use batchstage::row::{Batch, Row};
//! use batchstage::udf::{iter_stream, RowStream, StageUdf};
//! use serde_json::json;
//!
//! struct Double;
//!
//! impl StageUdf for Double {
//!     fn expected_input_keys(&self) -> &[&str] {
//!         &["value"]
//!     }
//!
//!     fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
//!         iter_stream(rows.into_iter().rev().map(|row| {
//!             let mut out = Row::new();
//!             out.insert("processed".into(), json!(row["value"].as_i64().unwrap_or(0) * 2));
//!             out.insert(IDX_IN_BATCH_COLUMN.into(), row[IDX_IN_BATCH_COLUMN].clone());
//!             out
//!         }))
//!     }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! # tokio::runtime::Builder::new_current_thread().build()?.block_on(async {
//! let engine = StageEngine::with_data_column(Double, "__data");
//! let batch: Batch = serde_json::from_value(json!({
//!     "__data": [{"value": 1}, {"value": 2}],
//! }))?;
//!
//! let outputs = engine.process_collect(batch).await?;
//! assert_eq!(outputs.len(), 2);
//! assert_eq!(outputs[0].column("__data").unwrap()[0]["processed"], json!(4));
//! # Ok::<(), anyhow::Error>(())
//! # })
//! # }
//! ```

use crate::config::{IDX_IN_BATCH_COLUMN, OutputCardinality, StageConfig};
use crate::error::{Result, StageError};
use crate::row::{Batch, Row};
use crate::udf::{RowStream, StageUdf};
use crate::validation::{split_payloads, take_index_tag, validate_inputs};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::fmt;
use tracing::{Instrument, Span, debug, debug_span, trace, warn};

/// Lifecycle of a single invocation. Used for trace logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    ReceivedBatch,
    Validated,
    Dispatched,
    Collecting,
    Assembled,
    Failed,
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReceivedBatch => "received_batch",
            Self::Validated => "validated",
            Self::Dispatched => "dispatched",
            Self::Collecting => "collecting",
            Self::Assembled => "assembled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Runs a [`StageUdf`] over batches. Holds no state between invocations.
pub struct StageEngine<U> {
    udf: U,
    config: StageConfig,
}

impl<U: StageUdf> StageEngine<U> {
    #[must_use]
    pub const fn new(udf: U, config: StageConfig) -> Self {
        Self { udf, config }
    }

    /// Engine with default configuration and the given data column.
    #[must_use]
    pub fn with_data_column(udf: U, data_column: impl Into<String>) -> Self {
        Self::new(udf, StageConfig::default().with_data_column(data_column))
    }

    #[must_use]
    pub const fn udf(&self) -> &U {
        &self.udf
    }

    #[must_use]
    pub const fn config(&self) -> &StageConfig {
        &self.config
    }

    #[must_use]
    pub fn data_column(&self) -> &str {
        &self.config.data_column
    }

    /// Process one batch, streaming a one-row batch per UDF emission.
    ///
    /// Validation happens before the UDF is called; a validation failure is the
    /// only item of the returned stream.
    pub fn process(&self, batch: Batch) -> BoxStream<'_, Result<Batch>> {
        self.process_indexed(batch)
            .map_ok(|(_, batch)| batch)
            .boxed()
    }

    /// Like [`process`](Self::process), but pairs each forwarded batch with the
    /// input position its result was tagged with, so a downstream collector can
    /// restore input order.
    pub fn process_indexed(&self, batch: Batch) -> BoxStream<'_, Result<(usize, Batch)>> {
        let span = debug_span!(
            "stage",
            data_column = %self.config.data_column,
            rows = batch.num_rows()
        );
        trace!(parent: &span, phase = %StagePhase::ReceivedBatch);

        let (inputs, siblings) = match self.validate(batch) {
            Ok(v) => v,
            Err(e) => {
                warn!(parent: &span, phase = %StagePhase::Failed, error = %e, "rejected batch");
                return stream::once(future::ready(Err(e))).boxed();
            }
        };
        trace!(parent: &span, phase = %StagePhase::Validated);

        let tagged: Vec<Row> = inputs
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut row = row.clone();
                row.insert(IDX_IN_BATCH_COLUMN.to_string(), Value::from(i));
                row
            })
            .collect();
        let results = span.in_scope(|| self.udf.udf(tagged));
        debug!(parent: &span, phase = %StagePhase::Dispatched, "invoked udf");

        let state = Collecting {
            results,
            outputs: vec![0; inputs.len()],
            inputs,
            siblings,
            data_column: &self.config.data_column,
            cardinality: self.config.output_cardinality,
            emitted: 0,
            finished: false,
            span,
        };
        stream::unfold(state, |mut st| async move {
            let span = st.span.clone();
            st.next_batch().instrument(span).await.map(|item| (item, st))
        })
        .boxed()
    }

    /// Process one batch and collect every forwarded batch, failing on the first error.
    pub async fn process_collect(&self, batch: Batch) -> Result<Vec<Batch>> {
        self.process(batch).try_collect().await
    }

    fn validate(&self, batch: Batch) -> Result<(Vec<Row>, Batch)> {
        let (inputs, siblings) = split_payloads(batch, &self.config.data_column)?;
        validate_inputs(&inputs, self.udf.expected_input_keys())?;
        Ok((inputs, siblings))
    }
}

/// Consumer side of one invocation.
struct Collecting<'a> {
    results: RowStream<'a>,
    inputs: Vec<Row>,
    siblings: Batch,
    outputs: Vec<usize>,
    data_column: &'a str,
    cardinality: OutputCardinality,
    emitted: usize,
    finished: bool,
    span: Span,
}

impl Collecting<'_> {
    async fn next_batch(&mut self) -> Option<Result<(usize, Batch)>> {
        if self.finished {
            return None;
        }
        let outcome = match self.results.next().await {
            Some(Ok(result)) => self.assemble(result).map(Some),
            Some(Err(e)) => Err(StageError::Udf(e)),
            None => self.finish().map(|()| None),
        };
        match outcome {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                warn!(phase = %StagePhase::Failed, error = %e, emitted = self.emitted, "aborting invocation");
                Some(Err(e))
            }
        }
    }

    fn assemble(&mut self, mut result: Row) -> Result<(usize, Batch)> {
        if self.emitted == 0 {
            trace!(phase = %StagePhase::Collecting);
        }
        let idx = take_index_tag(&mut result, IDX_IN_BATCH_COLUMN, self.inputs.len())?;
        self.outputs[idx] += 1;
        if self.cardinality == OutputCardinality::ExactlyOnce && self.outputs[idx] > 1 {
            return Err(StageError::DuplicateOutput { row_index: idx });
        }
        self.emitted += 1;

        let mut payload = self.inputs[idx].clone();
        payload.extend(result);
        let mut row = self.siblings.row(idx).unwrap_or_default();
        row.insert(self.data_column.to_string(), Value::Object(payload));
        trace!(row_index = idx, "forwarding result");
        Ok((idx, Batch::from_row(row)))
    }

    fn finish(&self) -> Result<()> {
        let missing: Vec<usize> = self
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| i)
            .collect();
        if self.cardinality == OutputCardinality::ExactlyOnce && !missing.is_empty() {
            return Err(StageError::MissingOutputs { rows: missing });
        }
        if self.emitted != self.inputs.len() || !missing.is_empty() {
            debug!(
                inputs = self.inputs.len(),
                emitted = self.emitted,
                rows_without_output = missing.len(),
                "output count differs from input count"
            );
        }
        trace!(phase = %StagePhase::Assembled, emitted = self.emitted);
        Ok(())
    }
}
