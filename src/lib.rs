//! # Batchstage
//!
//! The **stage execution core** of a columnar batch pipeline. Batchstage defines the
//! contract and runtime that let a user-defined, possibly asynchronous, possibly
//! reordering transform be applied safely to a batch of structured records.
//!
//! ## Key Features
//!
//! - **Row codec** - convert column-oriented [`Batch`]es to row-oriented [`Row`]s and back
//! - **Carry-over wrappers** - nest and unnest working payloads without re-threading fields
//! - **Streaming engine** - forward each result as soon as the UDF emits it, in any order
//! - **Provenance** - every row is tagged with its position so results find their source
//! - **Fail-fast contracts** - schema violations abort the batch before user code runs
//! - **Stage descriptors** - immutable UDF + arguments bundles for an external orchestrator
//!
//! ## Quick Start
//!
//! ```no_run
//! use batchstage::*;
//! use batchstage::testing::DoublingUdf;
//! use futures::TryStreamExt;
//! use serde_json::json;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let engine = StageEngine::with_data_column(DoublingUdf::default(), "__data");
//! let batch: Batch = serde_json::from_value(json!({
//!     "__data": [{"value": 1, "extra": 10}, {"value": 2, "extra": 20}],
//! }))?;
//!
//! let mut outputs = engine.process(batch);
//! while let Some(one_row) = outputs.try_next().await? {
//!     // forward `one_row` to the next stage
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Batch and Row
//!
//! A [`Batch`] maps column names to equally long value vectors. A [`Row`] is a
//! `serde_json` object, one position of a batch. See [`row`].
//!
//! ### Reserved Data Column
//!
//! Each stage works on a payload nested under one column (default
//! [`DEFAULT_DATA_COLUMN`]). Sibling columns pass through untouched.
//!
//! ### Index-in-Batch Tag
//!
//! Before the UDF runs, each payload is stamped with [`IDX_IN_BATCH_COLUMN`]. The UDF
//! must echo it on every result; the engine uses it to merge the result into the
//! right input row and strips it from the output.
//!
//! ### UDFs
//!
//! Implement [`StageUdf`]: declare the required payload keys and return a stream of
//! tagged results. UDFs completing rows concurrently can push results through
//! [`udf::channel`].
//!
//! ### Stage Descriptors
//!
//! A [`StatefulStage`] bundles a [`UdfRef`] factory, its constructor arguments and its
//! batch-execution arguments. The orchestrator calls
//! [`instantiate`](StatefulStage::instantiate) once per replica.
//!
//! ## Errors
//!
//! Every failure is a [`StageError`]. All variants are contract violations: they abort
//! the in-flight batch and are never retried here.
//!
//! ## Logging
//!
//! The crate emits `tracing` events under a `stage` span per invocation. Call
//! [`logging::init_tracing`] to install a subscriber filtered by `BATCHSTAGE_LOG`.
//!
//! ## Feature Flags
//!
//! - `local-runner` - in-process sequential driver ([`runner`])
//! - `testing` - builders, assertions and fixture UDFs ([`testing`])
//!
//! ## Module Overview
//!
//! - [`row`] - `Batch`/`Row` types and the row codec
//! - [`carry_over`] - `wrap_preprocess` / `wrap_postprocess`
//! - [`udf`] - the `StageUdf` contract and result channels
//! - [`validation`] - payload and tag checks
//! - [`engine`] - the stage execution engine
//! - [`stage`] - stage descriptors and UDF factories
//! - [`config`] - stage configuration and reserved names
//! - [`error`] - the crate error type

pub mod carry_over;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod row;
pub mod stage;
pub mod udf;
pub mod validation;

#[cfg(feature = "local-runner")]
pub mod runner;

#[cfg(feature = "testing")]
pub mod testing;

// General re-exports
pub use carry_over::{postprocess_batch, preprocess_batch, wrap_postprocess, wrap_preprocess};
pub use config::{DEFAULT_DATA_COLUMN, IDX_IN_BATCH_COLUMN, OutputCardinality, StageConfig};
pub use engine::{StageEngine, StagePhase};
pub use error::{Result, StageError};
pub use row::{Batch, Row};
pub use stage::{Kwargs, StatefulStage, UdfFactory, UdfRef};
pub use udf::{RowEmitter, RowStream, StageUdf};

// Gated re-exports
#[cfg(feature = "local-runner")]
pub use runner::LocalRunner;
