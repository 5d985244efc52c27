//! Tests for the stage execution engine.

use anyhow::Result;
use batchstage::testing::*;
use batchstage::udf::iter_stream;
use batchstage::*;
use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[tokio::test]
async fn test_basic_processing_out_of_order() -> Result<()> {
    logging::init_tracing();
    let engine = StageEngine::with_data_column(DoublingUdf::default(), "__data");
    let batch: Batch = serde_json::from_value(json!({
        "__data": [{"value": 1, "extra": 10}, {"value": 2, "extra": 20}],
    }))?;

    let results: Vec<Batch> = engine.process(batch).try_collect().await?;
    assert_eq!(results.len(), 2);
    assert_all_single_row(&results);
    for data in collect_payloads(&results, "__data") {
        let val = data["value"].as_i64().unwrap();
        assert_eq!(data["processed"], json!(val * 2));
        assert_eq!(data["extra"], json!(10 * val));
        assert!(!data.contains_key(IDX_IN_BATCH_COLUMN));
    }
    Ok(())
}

#[tokio::test]
async fn test_emission_order_is_forwarded_as_is() -> Result<()> {
    let engine = StageEngine::with_data_column(DoublingUdf::default(), "D");
    let batch = BatchBuilder::new("D")
        .add_generated(5, |i| json!({"value": i}))
        .build();

    let indexed = collect_indexed(&engine, batch).await?;
    let order: Vec<usize> = indexed.iter().map(|(i, _)| *i).collect();
    assert_eq!(order, vec![4, 3, 2, 1, 0]);
    assert_positions_cover(&indexed, 5);

    let restored = sort_by_position(indexed);
    let values: Vec<_> = collect_payloads(&restored, "D")
        .into_iter()
        .map(|p| p["value"].clone())
        .collect();
    assert_eq!(values, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_sibling_columns_follow_their_row() -> Result<()> {
    let engine = StageEngine::with_data_column(DoublingUdf::default(), "D");
    let batch = BatchBuilder::new("D")
        .add_row(json!({"value": 1}), json!({"tag": "a", "n": 1}))
        .add_row(json!({"value": 2}), json!({"tag": "b", "n": 2}))
        .build();

    for (idx, out) in collect_indexed(&engine, batch).await? {
        let row = out.row(0).unwrap();
        let expected_tag = if idx == 0 { "a" } else { "b" };
        assert_eq!(row["tag"], json!(expected_tag));
        assert_eq!(row["n"], json!(idx + 1));
        assert_eq!(row["D"]["value"], json!(idx + 1));
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_data_column() {
    let engine = StageEngine::with_data_column(DoublingUdf::default(), "__data");
    let batch: Batch = serde_json::from_value(json!({"extra": ["a"]})).unwrap();

    let err = engine.process_collect(batch).await.unwrap_err();
    assert!(matches!(err, StageError::MissingDataColumn { ref column } if column == "__data"));
}

struct CountingUdf {
    calls: Arc<AtomicUsize>,
}

impl StageUdf for CountingUdf {
    fn expected_input_keys(&self) -> &[&str] {
        &["value"]
    }

    fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        iter_stream(rows)
    }
}

#[tokio::test]
async fn test_missing_required_key_fails_before_udf_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = StageEngine::with_data_column(
        CountingUdf {
            calls: Arc::clone(&calls),
        },
        "__data",
    );
    let batch = BatchBuilder::new("__data")
        .add_payload(json!({"value": 1}))
        .add_payload(json!({"wrong_key": 1}))
        .build();

    let err = engine.process_collect(batch).await.unwrap_err();
    assert!(matches!(
        err,
        StageError::MissingRequiredKey { row_index: 1, ref key } if key == "value"
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_object_payload_rejected() {
    let engine = StageEngine::with_data_column(ChannelUdf, "D");
    let batch: Batch = serde_json::from_value(json!({"D": [{}, 7]})).unwrap();
    let err = engine.process_collect(batch).await.unwrap_err();
    assert!(matches!(err, StageError::InvalidPayload { row_index: 1 }));
}

#[tokio::test]
async fn test_missing_idx_in_batch_column_aborts() {
    logging::init_tracing();
    let engine = StageEngine::with_data_column(DoublingUdf::without_tag(), "__data");
    let batch = BatchBuilder::new("__data")
        .add_payload(json!({"value": 1}))
        .add_payload(json!({"value": 2}))
        .build();

    let items: Vec<_> = engine.process(batch).collect().await;
    assert_eq!(items.len(), 1, "no result after the violation is forwarded");
    match &items[0] {
        Err(StageError::MissingIndexTag { partial }) => {
            assert_eq!(partial["processed"], json!(4));
        }
        other => panic!("expected MissingIndexTag, got {other:?}"),
    }
}

struct BadTagUdf;

impl StageUdf for BadTagUdf {
    fn udf(&self, rows: Vec<Row>) -> RowStream<'_> {
        iter_stream(rows.into_iter().map(|mut row| {
            row.insert(IDX_IN_BATCH_COLUMN.into(), json!("zero"));
            row
        }))
    }
}

#[tokio::test]
async fn test_non_integer_tag_rejected() {
    let engine = StageEngine::with_data_column(BadTagUdf, "D");
    let batch = BatchBuilder::new("D").add_payload(json!({})).build();
    let err = engine.process_collect(batch).await.unwrap_err();
    assert!(matches!(err, StageError::InvalidIndexTag { num_rows: 1, .. }));
}

#[tokio::test]
async fn test_udf_failure_keeps_earlier_forwards() {
    let engine = StageEngine::with_data_column(FailingUdf { succeed: 2 }, "D");
    let batch = BatchBuilder::new("D")
        .add_generated(4, |i| json!({"i": i}))
        .build();

    let items: Vec<_> = engine.process(batch).collect().await;
    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok());
    assert!(items[1].is_ok());
    assert!(matches!(items[2], Err(StageError::Udf(_))));
}

#[tokio::test]
async fn test_fan_out_and_filter_allowed_by_default() -> Result<()> {
    let batch = BatchBuilder::new("D")
        .add_generated(3, |i| json!({"i": i}))
        .build();

    let fan_out = StageEngine::with_data_column(FanOutUdf { copies: 2 }, "D");
    let outputs = fan_out.process_collect(batch.clone()).await?;
    assert_eq!(outputs.len(), 6);

    let filter = StageEngine::with_data_column(FanOutUdf { copies: 0 }, "D");
    assert!(filter.process_collect(batch).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_exactly_once_rejects_duplicates() {
    let config = StageConfig::default()
        .with_data_column("D")
        .with_output_cardinality(OutputCardinality::ExactlyOnce);
    let engine = StageEngine::new(FanOutUdf { copies: 2 }, config);
    let batch = BatchBuilder::new("D").add_payload(json!({})).build();

    let err = engine.process_collect(batch).await.unwrap_err();
    assert!(matches!(err, StageError::DuplicateOutput { row_index: 0 }));
}

#[tokio::test]
async fn test_exactly_once_reports_missing_rows() {
    let config = StageConfig::default()
        .with_data_column("D")
        .with_output_cardinality(OutputCardinality::ExactlyOnce);
    let engine = StageEngine::new(FailingUdf { succeed: 0 }, config.clone());
    let batch = BatchBuilder::new("D").add_payload(json!({})).build();
    assert!(matches!(
        engine.process_collect(batch.clone()).await.unwrap_err(),
        StageError::Udf(_)
    ));

    let engine = StageEngine::new(FanOutUdf { copies: 0 }, config);
    let err = engine.process_collect(batch).await.unwrap_err();
    assert!(matches!(err, StageError::MissingOutputs { ref rows } if rows == &[0]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_channel_udf_covers_every_row() -> Result<()> {
    let engine = StageEngine::with_data_column(ChannelUdf, "D");
    let batch = BatchBuilder::new("D")
        .add_generated(32, |i| json!({"i": i}))
        .build();

    let indexed = collect_indexed(&engine, batch).await?;
    assert_positions_cover(&indexed, 32);
    for (idx, out) in &indexed {
        let payload = &collect_payloads(std::slice::from_ref(out), "D")[0];
        assert_eq!(payload["i"], json!(idx));
        assert_eq!(payload["handled"], json!(true));
    }
    Ok(())
}

#[tokio::test]
async fn test_dropping_output_stream_cancels_producers() {
    let (emitter, results) = udf::channel(1);

    struct Handoff(std::sync::Mutex<Option<RowStream<'static>>>);
    impl StageUdf for Handoff {
        fn udf(&self, _rows: Vec<Row>) -> RowStream<'_> {
            self.0.lock().unwrap().take().expect("single invocation")
        }
    }

    let engine = StageEngine::with_data_column(Handoff(std::sync::Mutex::new(Some(results))), "D");
    let batch = BatchBuilder::new("D").add_payload(json!({})).build();
    let stream = engine.process(batch);
    drop(stream);
    assert!(emitter.is_closed());
}
