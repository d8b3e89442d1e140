//! Tiered buffering pipeline
//!
//! This module provides the promotion machinery:
//! - `MemoryBuffer`: samples awaiting promotion (tier 0)
//! - `PersistentTier` + `KeyedCounter`: indexed entries in a local
//!   key-value store (tier 1)
//! - `ExportSink`: the external destination (tier 2)
//! - `Pipeline`: the session object running the threshold cascade
//! - `PromotionScheduler`: periodic ticks and user commands on one task
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐ full  ┌────────────────┐ ≥ threshold ┌────────────┐
//! │  tick /  │──►│ MemoryBuffer │──────►│ PersistentTier │────────────►│ ExportSink │
//! │  sample  │   │  (samples)   │       │  ts-N, event-N │◄── clear ───│   (ack)    │
//! └──────────┘   └──────────────┘       └────────────────┘  on ack     └────────────┘
//!                                              ▲
//!                           log event ─────────┘
//! ```

mod buffer;
mod config;
mod counter;
mod error;
mod export;
mod pipeline;
mod scheduler;
mod store;

pub use buffer::MemoryBuffer;
pub use config::PipelineConfig;
pub use counter::KeyedCounter;
pub use error::{SinkError, StoreError, StoreResult, TierError, TierResult};
pub use export::{ExportSink, FileSink, MemorySink};
pub use pipeline::{EventOutcome, Pipeline, PipelineState, PipelineStats, TickOutcome};
pub use scheduler::{PromotionScheduler, RandomSource, SchedulerHandle, ValueSource};
pub use store::{FileKvStore, KeyValueStore, MemoryKvStore, PersistentTier};
