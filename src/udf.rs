//! The user transform contract.
//!
//! A [`StageUdf`] declares the keys it needs in each working payload and turns
//! an ordered list of rows into a lazy, unordered, finite stream of results. Each
//! result must echo the [`IDX_IN_BATCH_COLUMN`](crate::config::IDX_IN_BATCH_COLUMN)
//! tag of the row it answers.
//!
//! UDFs that finish rows out of order (overlapping I/O, remote calls) can push
//! results through [`channel`] from spawned tasks instead of hand-writing a stream.

use crate::row::Row;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

/// Lazy stream of results produced by one UDF invocation.
pub type RowStream<'a> = BoxStream<'a, anyhow::Result<Row>>;

/// A transform applied to the working payloads of one batch.
pub trait StageUdf: Send + Sync {
    /// Keys every working payload must carry before [`udf`](Self::udf) is called.
    fn expected_input_keys(&self) -> &[&str] {
        &[]
    }

    /// Process `rows` and yield tagged results in any order.
    fn udf(&self, rows: Vec<Row>) -> RowStream<'_>;
}

impl<U: StageUdf + ?Sized> StageUdf for Box<U> {
    fn expected_input_keys(&self) -> &[&str] {
        (**self).expected_input_keys()
    }

    fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
        (**self).udf(rows)
    }
}

impl<U: StageUdf + ?Sized> StageUdf for std::sync::Arc<U> {
    fn expected_input_keys(&self) -> &[&str] {
        (**self).expected_input_keys()
    }

    fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
        (**self).udf(rows)
    }
}

/// Producer half of [`channel`].
#[derive(Clone)]
pub struct RowEmitter {
    tx: mpsc::Sender<anyhow::Result<Row>>,
}

impl RowEmitter {
    /// Push a result. Returns `false` once the consumer has been dropped, which
    /// means the invocation was cancelled and producers should stop.
    pub async fn emit(&self, row: Row) -> bool {
        self.tx.send(Ok(row)).await.is_ok()
    }

    /// Push a failure. The engine aborts the invocation when it reaches it.
    pub async fn fail(&self, err: anyhow::Error) -> bool {
        self.tx.send(Err(err)).await.is_ok()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Bounded producer/consumer pair: results pushed through the [`RowEmitter`]
/// come out of the [`RowStream`] in push order. The stream ends once every
/// emitter clone is dropped.
#[must_use]
pub fn channel(capacity: usize) -> (RowEmitter, RowStream<'static>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let rows = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    (RowEmitter { tx }, rows)
}

/// Wrap an in-memory list of results as a [`RowStream`].
#[must_use]
pub fn iter_stream<'a, I>(results: I) -> RowStream<'a>
where
    I: IntoIterator<Item = Row>,
    I::IntoIter: Send + 'a,
{
    stream::iter(results.into_iter().map(Ok)).boxed()
}
