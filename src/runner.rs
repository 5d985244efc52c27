//! In-process sequential driver for stage descriptors.
//!
//! [`LocalRunner`] stands in for the orchestrator when embedding stages in a
//! single process or testing them: it builds one replica per stage, splits the
//! input by the stage's `batch_size`, runs each chunk through the engine in
//! order, and concatenates every forwarded one-row batch.
//!
//! Output order follows emission order, chunk by chunk; it is not re-sorted. A
//! stage that forwards nothing yields an empty batch that keeps the input's
//! column names, so the next stage still finds its data column.

use crate::config::StageConfig;
use crate::row::Batch;
use crate::stage::StatefulStage;
use anyhow::{Context, Result};
use futures::TryStreamExt;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct LocalRunner {
    pub config: StageConfig,
}

impl LocalRunner {
    #[must_use]
    pub const fn new(config: StageConfig) -> Self {
        Self { config }
    }

    /// Run a single stage over `input`.
    pub async fn run_stage(&self, stage: &StatefulStage, input: Batch) -> Result<Batch> {
        let engine = stage
            .instantiate(self.config.clone())
            .with_context(|| format!("building replica of {}", stage.udf().name()))?;
        let shape: Vec<String> = input
            .column_names()
            .map(str::to_string)
            .chain(std::iter::once(self.config.data_column.clone()))
            .collect();
        let chunk_size = stage.batch_size().unwrap_or(0);
        let chunks = input.chunks(chunk_size);
        debug!(udf = stage.udf().name(), chunks = chunks.len(), "running stage");

        let mut forwarded: Vec<Batch> = Vec::new();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut outputs = engine.process(chunk);
            while let Some(batch) = outputs
                .try_next()
                .await
                .with_context(|| format!("stage {} failed on chunk {i}", stage.udf().name()))?
            {
                forwarded.push(batch);
            }
        }
        if forwarded.is_empty() {
            debug!(udf = stage.udf().name(), "stage forwarded no rows");
            return Ok(empty_like(shape)?);
        }
        Ok(Batch::concat(forwarded)?)
    }

    /// Run `stages` in sequence, feeding each stage's output to the next.
    pub async fn run(&self, stages: &[StatefulStage], input: Batch) -> Result<Batch> {
        let mut current = input;
        for stage in stages {
            current = self.run_stage(stage, current).await?;
        }
        info!(stages = stages.len(), rows = current.num_rows(), "pipeline finished");
        Ok(current)
    }
}

fn empty_like(columns: Vec<String>) -> crate::error::Result<Batch> {
    Batch::from_columns(columns.into_iter().map(|name| (name, Vec::new())))
}
