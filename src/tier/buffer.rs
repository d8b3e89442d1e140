//! In-memory sample buffer (tier 0)

use crate::types::{Sample, SampleBatch};

/// Ordered samples awaiting promotion as one batch
///
/// Reaching `capacity` is a hard trigger: the owner must drain and promote
/// as soon as `is_full` reports true.
#[derive(Debug)]
pub struct MemoryBuffer {
    samples: Vec<Sample>,
    capacity: usize,
}

impl MemoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample; returns true when the buffer is now full
    pub fn append(&mut self, sample: Sample) -> bool {
        self.samples.push(sample);
        self.is_full()
    }

    /// Take every buffered sample, leaving the buffer empty
    pub fn drain(&mut self) -> SampleBatch {
        SampleBatch::new(std::mem::take(&mut self.samples))
    }

    /// Put a drained batch back in front of anything appended since
    pub fn restore(&mut self, batch: SampleBatch) {
        let mut samples = batch.into_samples();
        samples.append(&mut self.samples);
        self.samples = samples;
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
