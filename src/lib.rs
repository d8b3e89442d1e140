//! Tier Buffer
//!
//! A bounded, two-tier event buffering pipeline. Periodic samples collect in
//! memory, are promoted in batches to a local key-value store, and the store
//! is exported to an external sink and cleared once it crosses a threshold.
//!
//! # Features
//!
//! - **Dense keys**: entries live at `ts-<n>` / `event-<n>`, indexed by
//!   persisted per-stream counters
//! - **Ack-gated clearing**: nothing is removed until the sink acknowledges
//! - **Capacity probe**: writes are refused before the store overflows
//! - **Single writer**: one scheduler task serializes ticks, events and dumps
//!
//! # Modules
//!
//! - `types`: Records, streams and export manifests
//! - `tier`: Buffer, persistent tier, sinks, pipeline and scheduler
//! - `utils`: Atomic file writes and timestamps
//!
//! # Example
//!
//! ```no_run
//! use tier_buffer::tier::{
//!     MemoryKvStore, MemorySink, Pipeline, PipelineConfig, PromotionScheduler, RandomSource,
//! };
//!
//! #[tokio::main]
//! async fn main() -> tier_buffer::tier::TierResult<()> {
//!     let pipeline = Pipeline::new(PipelineConfig::default(), MemoryKvStore::new(), MemorySink::new())?;
//!     let (handle, task) = PromotionScheduler::new(pipeline, RandomSource::new()).spawn();
//!
//!     handle.log_event("started").await?;
//!     handle.dump_now().await?;
//!     handle.shutdown().await?;
//!     let _ = task.await;
//!     Ok(())
//! }
//! ```

pub mod tier;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use tier::{
    ExportSink, FileKvStore, FileSink, KeyValueStore, MemoryKvStore, MemorySink, Pipeline,
    PipelineConfig, PromotionScheduler, SchedulerHandle, TierError, TierResult,
};
pub use types::{Event, ExportManifest, Sample, Stream};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
