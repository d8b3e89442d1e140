//! Promotion pipeline session
//!
//! `Pipeline` owns every piece of mutable state: the memory buffer, the
//! persistent tier with its counters, the sink and the export sequence
//! number. Every mutating operation takes `&mut self`, so one
//! export-and-clear is ever in flight per pipeline and nothing observes the
//! tier between a write and its counter update.
//!
//! The state is derived from the tier on every read, so a dropped export
//! future leaves nothing stale behind.
//!
//! ```text
//! Idle ──sample──► Accumulating ──buffer full──► PersistedPartial
//!  ▲                                                   │ combined ≥ threshold
//!  └──────────── sink ack (clear + reset) ◄── ExportPending
//! ```

use serde::Serialize;

use crate::types::{Event, ExportManifest, ExportPayload, Sample, Stream};

use super::buffer::MemoryBuffer;
use super::config::PipelineConfig;
use super::error::{TierError, TierResult};
use super::export::ExportSink;
use super::store::{KeyValueStore, PersistentTier};

/// Where the pipeline currently sits in the promotion cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Accumulating,
    PersistedPartial,
    ExportPending,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Sample appended, buffer not yet full
    Buffered { buffered: usize },
    /// Buffer promoted to `ts-<index>`, combined count below threshold
    Promoted { index: u64 },
    /// Threshold crossed but automatic export is disabled
    ThresholdReached { combined: u64 },
    Exported(ExportManifest),
}

/// What logging one event did
#[derive(Debug, Clone, PartialEq)]
pub struct EventOutcome {
    /// Index the event was stored at (`event-<index>`)
    pub index: u64,
    pub threshold_reached: bool,
    pub export: Option<ExportManifest>,
    /// Set when a threshold export ran and failed; the event itself is stored
    pub export_error: Option<String>,
}

/// Counters for display, matching the tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub events_stored: u64,
    pub samples_buffered: usize,
    pub batches_stored: u64,
    pub dumps_completed: u64,
    pub state: PipelineState,
}

/// Session object for the two-tier buffering pipeline
pub struct Pipeline<S, E> {
    config: PipelineConfig,
    tier: PersistentTier<S>,
    buffer: MemoryBuffer,
    sink: E,
    sequence_number: u64,
    /// A post-export sweep failed and must run before the next export
    needs_reconcile: bool,
}

impl<S: KeyValueStore, E: ExportSink> Pipeline<S, E> {
    pub fn new(config: PipelineConfig, store: S, sink: E) -> TierResult<Self> {
        config.validate()?;
        let buffer = MemoryBuffer::new(config.memory_buffer_capacity);

        Ok(Self {
            config,
            tier: PersistentTier::new(store),
            buffer,
            sink,
            sequence_number: 0,
            needs_reconcile: false,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tier(&self) -> &PersistentTier<S> {
        &self.tier
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    /// Samples currently held in memory
    pub fn buffered(&self) -> usize {
        self.buffer.size()
    }

    /// Completed exports since this pipeline was created
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn count(&self, stream: Stream) -> TierResult<u64> {
        self.tier.counter().count(stream)
    }

    /// `ExportPending` means the tier holds at least the combined threshold
    /// and is waiting for an acknowledged export
    pub fn state(&self) -> TierResult<PipelineState> {
        let combined = self.tier.counter().combined()?;
        if combined >= self.config.combined_persistent_threshold {
            return Ok(PipelineState::ExportPending);
        }
        if combined > 0 {
            return Ok(PipelineState::PersistedPartial);
        }
        if !self.buffer.is_empty() {
            return Ok(PipelineState::Accumulating);
        }
        Ok(PipelineState::Idle)
    }

    pub fn stats(&self) -> TierResult<PipelineStats> {
        let counter = self.tier.counter();
        Ok(PipelineStats {
            events_stored: counter.count(Stream::Events)?,
            samples_buffered: self.buffer.size(),
            batches_stored: counter.count(Stream::TsVals)?,
            dumps_completed: self.sequence_number,
            state: self.state()?,
        })
    }

    /// Run one step of the threshold cascade for a sampled value
    pub async fn tick(&mut self, now_ms: i64, value: f64) -> TierResult<TickOutcome> {
        if !self.buffer.append(Sample::new(now_ms, value)) {
            return Ok(TickOutcome::Buffered {
                buffered: self.buffer.size(),
            });
        }

        let index = self.promote_buffer()?;

        let combined = self.tier.counter().combined()?;
        if combined < self.config.combined_persistent_threshold {
            return Ok(TickOutcome::Promoted { index });
        }

        if !self.config.auto_export_enabled {
            tracing::warn!(
                combined,
                threshold = self.config.combined_persistent_threshold,
                "persistent tier at threshold, automatic export disabled"
            );
            return Ok(TickOutcome::ThresholdReached { combined });
        }

        let manifest = self.export_and_clear(now_ms).await?;
        Ok(TickOutcome::Exported(manifest))
    }

    /// Move every buffered sample into one `ts-<index>` entry
    ///
    /// On failure the samples go back into the buffer, ahead of anything
    /// appended later.
    pub fn promote_buffer(&mut self) -> TierResult<u64> {
        let batch = self.buffer.drain();
        let samples = batch.len();

        let result = self.store_entry(Stream::TsVals, || batch.to_json());
        match result {
            Ok(index) => {
                tracing::info!(index, samples, "promoted sample batch to persistent tier");
                Ok(index)
            }
            Err(e) => {
                tracing::warn!(error = %e, samples, "promotion failed, samples kept in memory");
                self.buffer.restore(batch);
                Err(e)
            }
        }
    }

    /// Promote whatever is buffered, even below capacity
    pub fn flush(&mut self) -> TierResult<Option<u64>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        self.promote_buffer().map(Some)
    }

    /// Store one event as its own entry and check the event threshold
    pub async fn log_event(&mut self, now_ms: i64, value: String) -> TierResult<EventOutcome> {
        let event = Event::new(now_ms, value);
        let index = self.store_entry(Stream::Events, || event.to_json())?;
        tracing::debug!(index, "logged event");

        let events = self.count(Stream::Events)?;
        let threshold_reached = events >= self.config.event_threshold;
        let mut export = None;
        let mut export_error = None;

        // The event is already stored, so an export failure must not fail the call
        if threshold_reached {
            if self.config.export_on_event_threshold && self.config.auto_export_enabled {
                match self.export_and_clear(now_ms).await {
                    Ok(manifest) => export = Some(manifest),
                    Err(e) => {
                        tracing::error!(index, error = %e, "event stored, threshold export failed");
                        export_error = Some(e.to_string());
                    }
                }
            } else {
                tracing::warn!(
                    events,
                    threshold = self.config.event_threshold,
                    "stored events exceed threshold"
                );
            }
        }

        Ok(EventOutcome {
            index,
            threshold_reached,
            export,
            export_error,
        })
    }

    /// Export everything regardless of thresholds
    pub async fn dump(&mut self, now_ms: i64) -> TierResult<ExportManifest> {
        tracing::info!("manual dump requested");
        self.export_and_clear(now_ms).await
    }

    /// Read the whole tier, hand it to the sink, clear it on acknowledgment
    ///
    /// Nothing is removed unless every entry was read and the sink
    /// acknowledged. Once the sink has acknowledged, both counters are reset
    /// and the sequence number advances even when a removal or a reset
    /// fails; those failures are reported as `ClearIncomplete` after a
    /// `reconcile` sweep. A sweep that fails is retried before the next
    /// export.
    pub async fn export_and_clear(&mut self, now_ms: i64) -> TierResult<ExportManifest> {
        if self.needs_reconcile {
            self.reconcile()?;
        }

        let manifest = ExportManifest {
            sequence_number: self.sequence_number,
            event_count: self.count(Stream::Events)?,
            tsval_count: self.count(Stream::TsVals)?,
            timestamp: now_ms,
        };

        let payload = ExportPayload {
            events: self.read_stream(Stream::Events, manifest.event_count)?,
            ts_vals: self.read_stream(Stream::TsVals, manifest.tsval_count)?,
        };
        let bytes = payload.to_bytes(self.config.payload_encoding)?;
        let name = manifest.file_name();

        tracing::info!(
            name = %name,
            events = manifest.event_count,
            tsvals = manifest.tsval_count,
            bytes = bytes.len(),
            "exporting persistent tier"
        );

        if let Err(source) = self.sink.export(&name, bytes).await {
            tracing::error!(name = %name, error = %source, "export not acknowledged, tier left intact");
            return Err(TierError::Export { name, source });
        }

        let mut failed = 0;
        for (stream, count) in [
            (Stream::TsVals, manifest.tsval_count),
            (Stream::Events, manifest.event_count),
        ] {
            for index in 0..count {
                if let Err(e) = self.tier.remove(stream, index) {
                    tracing::warn!(error = %e, "failed to remove exported entry");
                    failed += 1;
                }
            }
        }
        for stream in [Stream::TsVals, Stream::Events] {
            if let Err(e) = self.tier.counter().reset(stream) {
                tracing::warn!(stream = %stream, error = %e, "failed to reset counter after export");
                failed += 1;
            }
        }
        self.sequence_number += 1;

        if failed > 0 {
            if let Err(e) = self.reconcile() {
                tracing::error!(error = %e, "sweep after incomplete clear failed, retrying before next export");
                self.needs_reconcile = true;
            }
            return Err(TierError::ClearIncomplete { name, failed });
        }

        tracing::info!(name = %name, sequence = self.sequence_number, "export acknowledged, tier cleared");
        Ok(manifest)
    }

    /// Restore key density: every stream holds exactly `0..count`
    ///
    /// Entries at or past the count are orphans from an interrupted
    /// write-then-increment or an incomplete clear, and are removed. Gaps
    /// below the count are closed by moving later entries down in order,
    /// then the counter is lowered to the number of entries present.
    /// Returns the number of entries removed or moved.
    pub fn reconcile(&mut self) -> TierResult<usize> {
        let mut repaired = 0;

        for stream in Stream::ALL {
            let count = self.count(stream)?;
            let (present, orphans): (Vec<u64>, Vec<u64>) = self
                .tier
                .indices(stream)?
                .into_iter()
                .partition(|&i| i < count);

            for index in orphans {
                self.tier.remove(stream, index)?;
                repaired += 1;
            }

            if (present.len() as u64) < count {
                tracing::warn!(
                    stream = %stream,
                    count,
                    present = present.len(),
                    "persistent tier has gaps below the counter, compacting"
                );
                for (target, index) in (0u64..).zip(present.iter().copied()) {
                    if target == index {
                        continue;
                    }
                    let value = self.tier.require(stream, index)?;
                    self.tier.set(stream, target, &value)?;
                    self.tier.remove(stream, index)?;
                    repaired += 1;
                }
                self.tier.counter().set(stream, present.len() as u64)?;
            }
        }

        self.needs_reconcile = false;
        if repaired > 0 {
            tracing::info!(repaired, "restored key density in persistent tier");
        }
        Ok(repaired)
    }

    /// Write an entry at the stream's next index, then count it
    fn store_entry<F>(&self, stream: Stream, serialize: F) -> TierResult<u64>
    where
        F: FnOnce() -> Result<String, serde_json::Error>,
    {
        let counter = self.tier.counter();
        let index = counter.count(stream)?;
        let value = serialize()?;

        self.tier.set(stream, index, &value)?;
        counter.increment(stream)?;
        Ok(index)
    }

    fn read_stream(&self, stream: Stream, count: u64) -> TierResult<Vec<String>> {
        (0..count).map(|i| self.tier.require(stream, i)).collect()
    }
}
