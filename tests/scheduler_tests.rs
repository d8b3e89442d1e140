//! Scheduler Integration Tests
//!
//! Runs the promotion scheduler on real (short) intervals:
//! - Automatic export from periodic ticks
//! - Concurrent dump requests never overlap
//! - Tick faults do not stop the scheduler

use std::time::Duration;

use tier_buffer::tier::{
    KeyValueStore, MemoryKvStore, MemorySink, Pipeline, PipelineConfig, PromotionScheduler,
    RandomSource,
};
use tier_buffer::types::Stream;

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn test_ticks_promote_and_auto_export() {
    let config = PipelineConfig {
        tick_interval_ms: 5,
        memory_buffer_capacity: 2,
        combined_persistent_threshold: 2,
        ..Default::default()
    };
    let sink = MemorySink::new();
    let pipeline = Pipeline::new(config, MemoryKvStore::new(), sink.clone()).unwrap();
    let (handle, task) = PromotionScheduler::new(pipeline, RandomSource::seeded(1)).spawn();

    assert!(wait_for(|| sink.export_count() >= 1).await);
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let (name, payload) = &sink.exports()[0];
    assert!(name.starts_with("dump_0_events_0_tsVals_2_ts_"), "{}", name);
    let payload: serde_json::Value = serde_json::from_slice(payload).unwrap();
    assert_eq!(payload["tsVals"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_dumps_are_serialized() {
    let config = PipelineConfig {
        tick_interval_ms: 60_000,
        ..Default::default()
    };
    let sink = MemorySink::new().with_delay(Duration::from_millis(20));
    let pipeline = Pipeline::new(config, MemoryKvStore::new(), sink.clone()).unwrap();
    let (handle, task) = PromotionScheduler::new(pipeline, || 1.0).spawn();

    handle.log_event("only").await.unwrap();

    let mut dumps = Vec::new();
    for _ in 0..3 {
        let handle = handle.clone();
        dumps.push(tokio::spawn(async move { handle.dump_now().await }));
    }

    let mut sequences = Vec::new();
    let mut event_counts = Vec::new();
    for dump in dumps {
        let manifest = dump.await.unwrap().unwrap();
        sequences.push(manifest.sequence_number);
        event_counts.push(manifest.event_count);
    }
    sequences.sort_unstable();
    event_counts.sort_unstable();

    assert_eq!(sequences, vec![0, 1, 2]);
    // The event is exported by exactly one of the dumps
    assert_eq!(event_counts, vec![0, 0, 1]);
    assert_eq!(sink.max_in_flight(), 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_tick_faults_do_not_stop_scheduler() {
    let config = PipelineConfig {
        tick_interval_ms: 5,
        memory_buffer_capacity: 1,
        ..Default::default()
    };
    // Every promotion is refused
    let store = MemoryKvStore::with_capacity(1);
    store.set("occupied", "x").unwrap();
    let pipeline = Pipeline::new(config, store, MemorySink::new()).unwrap();
    let (handle, task) = PromotionScheduler::new(pipeline, || 0.25).spawn();

    // Samples pile up in memory while ticks keep failing
    let mut buffered = 0;
    for _ in 0..400 {
        buffered = handle.stats().await.unwrap().samples_buffered;
        if buffered >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(buffered >= 3);

    handle.shutdown().await.unwrap();
    let pipeline = task.await.unwrap();
    assert_eq!(pipeline.count(Stream::TsVals).unwrap(), 0);
}
