//! Stage descriptor.
//!
//! A [`StatefulStage`] is an immutable bundle of a UDF factory, the keyword
//! arguments used to construct the UDF, and the batch-execution arguments the
//! orchestrator passes to its `map_batches` equivalent. The orchestrator builds
//! one replica per worker with [`StatefulStage::instantiate`].
//!
//! # Example
//!
//! ```
//! use batchstage::stage::{Kwargs, StatefulStage, UdfRef};
//! use batchstage::row::Row;
//! use batchstage::udf::{iter_stream, RowStream, StageUdf};
//! use serde_json::json;
//!
//! struct Passthrough;
//! impl StageUdf for Passthrough {
//!     fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
//!         iter_stream(rows)
//!     }
//! }
//!
//! let udf = UdfRef::from_fn(|_: &Kwargs| Ok(Passthrough));
//! let stage = StatefulStage::new(
//!     udf.clone(),
//!     json!({"data_column": "__data"}).as_object().cloned().unwrap(),
//!     json!({"batch_size": 10}).as_object().cloned().unwrap(),
//! );
//!
//! assert_eq!(stage.udf(), &udf);
//! assert_eq!(stage.batch_size(), Some(10));
//! ```

use crate::config::StageConfig;
use crate::engine::StageEngine;
use crate::error::{Result, StageError};
use crate::udf::StageUdf;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Keyword arguments: constructor arguments or batch-execution parameters.
pub type Kwargs = Map<String, Value>;

/// Builds UDF replicas from constructor arguments.
pub trait UdfFactory: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn build(&self, kwargs: &Kwargs) -> anyhow::Result<Box<dyn StageUdf>>;
}

impl<F, U> UdfFactory for F
where
    F: Fn(&Kwargs) -> anyhow::Result<U> + Send + Sync,
    U: StageUdf + 'static,
{
    fn build(&self, kwargs: &Kwargs) -> anyhow::Result<Box<dyn StageUdf>> {
        Ok(Box::new(self(kwargs)?))
    }
}

/// Shared reference to a UDF factory. Equality is identity: two `UdfRef`s are
/// equal only if they point at the same factory.
#[derive(Clone)]
pub struct UdfRef(Arc<dyn UdfFactory>);

impl UdfRef {
    pub fn new<F: UdfFactory + 'static>(factory: F) -> Self {
        Self(Arc::new(factory))
    }

    /// Wrap a constructor closure.
    pub fn from_fn<F, U>(f: F) -> Self
    where
        F: Fn(&Kwargs) -> anyhow::Result<U> + Send + Sync + 'static,
        U: StageUdf + 'static,
    {
        Self::new(f)
    }

    /// Wrap a constructor closure under `name`, which is reported in logs and
    /// error context instead of the closure's type name.
    pub fn named<F, U>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Kwargs) -> anyhow::Result<U> + Send + Sync + 'static,
        U: StageUdf + 'static,
    {
        Self::new(Named {
            name: name.into(),
            factory: f,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn build(&self, kwargs: &Kwargs) -> anyhow::Result<Box<dyn StageUdf>> {
        self.0.build(kwargs)
    }
}

struct Named<F> {
    name: String,
    factory: F,
}

impl<F, U> UdfFactory for Named<F>
where
    F: Fn(&Kwargs) -> anyhow::Result<U> + Send + Sync,
    U: StageUdf + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, kwargs: &Kwargs) -> anyhow::Result<Box<dyn StageUdf>> {
        Ok(Box::new((self.factory)(kwargs)?))
    }
}

impl From<Arc<dyn UdfFactory>> for UdfRef {
    fn from(factory: Arc<dyn UdfFactory>) -> Self {
        Self(factory)
    }
}

impl PartialEq for UdfRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for UdfRef {}

impl fmt::Debug for UdfRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UdfRef").field(&self.name()).finish()
    }
}

/// Immutable stage configuration carried to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct StatefulStage {
    udf: UdfRef,
    fn_constructor_kwargs: Kwargs,
    map_batches_kwargs: Kwargs,
}

impl StatefulStage {
    #[must_use]
    pub const fn new(udf: UdfRef, fn_constructor_kwargs: Kwargs, map_batches_kwargs: Kwargs) -> Self {
        Self {
            udf,
            fn_constructor_kwargs,
            map_batches_kwargs,
        }
    }

    #[must_use]
    pub const fn udf(&self) -> &UdfRef {
        &self.udf
    }

    #[must_use]
    pub const fn fn_constructor_kwargs(&self) -> &Kwargs {
        &self.fn_constructor_kwargs
    }

    #[must_use]
    pub const fn map_batches_kwargs(&self) -> &Kwargs {
        &self.map_batches_kwargs
    }

    /// `batch_size` from the batch-execution arguments, if set to an unsigned integer.
    #[must_use]
    pub fn batch_size(&self) -> Option<usize> {
        self.map_batches_kwargs
            .get("batch_size")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
    }

    /// Batch-execution arguments as the orchestrator should pass them.
    ///
    /// Pins `batch_size` and nests the constructor arguments, with `data_column`
    /// set, under `fn_constructor_kwargs`.
    ///
    /// # Errors
    /// [`StageError::BatchSizeConflict`] if the stage already pins a different batch size.
    pub fn resolved_map_batches_kwargs(&self, batch_size: u64, data_column: &str) -> Result<Kwargs> {
        let mut kwargs = self.map_batches_kwargs.clone();
        if let Some(configured) = kwargs.get("batch_size").and_then(Value::as_u64) {
            if configured != batch_size {
                return Err(StageError::BatchSizeConflict {
                    configured,
                    requested: batch_size,
                });
            }
        }
        kwargs.insert("batch_size".into(), Value::from(batch_size));

        let mut ctor = self.fn_constructor_kwargs.clone();
        ctor.insert("data_column".into(), Value::from(data_column));
        kwargs.insert("fn_constructor_kwargs".into(), Value::Object(ctor));
        Ok(kwargs)
    }

    /// Build one replica: construct the UDF and wrap it in an engine.
    ///
    /// The factory receives the constructor arguments with `data_column` set to
    /// the engine's data column.
    pub fn instantiate(&self, config: StageConfig) -> Result<StageEngine<Box<dyn StageUdf>>> {
        let mut kwargs = self.fn_constructor_kwargs.clone();
        kwargs.insert("data_column".into(), Value::from(config.data_column.as_str()));
        let udf = self.udf.build(&kwargs).map_err(StageError::Instantiate)?;
        tracing::debug!(udf = self.udf.name(), data_column = %config.data_column, "instantiated stage replica");
        Ok(StageEngine::new(udf, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Row;
    use crate::udf::{RowStream, iter_stream};
    use serde_json::json;

    struct Nop;
    impl StageUdf for Nop {
        fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
            iter_stream(rows)
        }
    }

    fn kwargs(v: Value) -> Kwargs {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_identity_equality() {
        let a = UdfRef::from_fn(|_: &Kwargs| Ok(Nop));
        let b = UdfRef::from_fn(|_: &Kwargs| Ok(Nop));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_named_factory_reports_its_name() {
        let named = UdfRef::named("nop", |_: &Kwargs| Ok(Nop));
        assert_eq!(named.name(), "nop");
        assert_eq!(format!("{named:?}"), r#"UdfRef("nop")"#);
        assert!(named.build(&Kwargs::new()).is_ok());

        let anonymous = UdfRef::from_fn(|_: &Kwargs| Ok(Nop));
        assert!(anonymous.name().contains("closure"));
    }

    #[test]
    fn test_resolve_conflicting_batch_size() {
        let stage = StatefulStage::new(
            UdfRef::from_fn(|_: &Kwargs| Ok(Nop)),
            Kwargs::new(),
            kwargs(json!({"batch_size": 8})),
        );
        let err = stage.resolved_map_batches_kwargs(16, "__data").unwrap_err();
        assert!(matches!(
            err,
            StageError::BatchSizeConflict { configured: 8, requested: 16 }
        ));
    }

    #[test]
    fn test_resolve_injects_constructor_kwargs() {
        let stage = StatefulStage::new(
            UdfRef::from_fn(|_: &Kwargs| Ok(Nop)),
            kwargs(json!({"model": "m"})),
            kwargs(json!({"concurrency": 2})),
        );
        let resolved = stage.resolved_map_batches_kwargs(4, "D").unwrap();
        assert_eq!(
            Value::Object(resolved),
            json!({
                "concurrency": 2,
                "batch_size": 4,
                "fn_constructor_kwargs": {"model": "m", "data_column": "D"},
            })
        );
        // The descriptor itself is unchanged.
        assert_eq!(stage.fn_constructor_kwargs(), &kwargs(json!({"model": "m"})));
    }

    #[test]
    fn test_instantiate_failure_is_reported() {
        let stage = StatefulStage::new(
            UdfRef::from_fn(|_: &Kwargs| -> anyhow::Result<Nop> { anyhow::bail!("no model") }),
            Kwargs::new(),
            Kwargs::new(),
        );
        let err = stage.instantiate(StageConfig::default()).err().unwrap();
        assert!(matches!(err, StageError::Instantiate(_)));
    }
}
