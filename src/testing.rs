//! Testing utilities for stages.
//!
//! This module helps users write tests for their own UDFs and stage chains:
//!
//! - **Builders**: assemble input batches around a data column
//! - **Assertions**: compare forwarded batches and check tag coverage
//! - **Fixtures**: small UDFs exercising reordering, fan-out, failures and
//!   channel-based emission
//!
//! # Quick Start
//!
//! ```no_run
//! use batchstage::engine::StageEngine;
//! use batchstage::testing::*;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn doubles_every_row() -> anyhow::Result<()> {
//!     let engine = StageEngine::with_data_column(DoublingUdf::default(), "__data");
//!     let batch = BatchBuilder::new("__data")
//!         .add_payload(json!({"value": 1}))
//!         .add_payload(json!({"value": 2}))
//!         .build();
//!
//!     let outputs = collect_indexed(&engine, batch).await?;
//!     assert_positions_cover(&outputs, 2);
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;

pub use assertions::*;
pub use builders::*;
pub use fixtures::*;

use crate::engine::StageEngine;
use crate::error::Result;
use crate::row::Batch;
use crate::udf::StageUdf;
use futures::TryStreamExt;

/// Run `batch` through `engine` and collect `(input position, output batch)` pairs.
pub async fn collect_indexed<U: StageUdf>(
    engine: &StageEngine<U>,
    batch: Batch,
) -> Result<Vec<(usize, Batch)>> {
    engine.process_indexed(batch).try_collect().await
}
