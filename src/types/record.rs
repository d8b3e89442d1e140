//! Record types held by the buffering tiers
//!
//! Samples and events share one shape: a millisecond timestamp plus a
//! payload. Samples are promoted in batches, events one entry at a time.

use serde::{Deserialize, Serialize};

/// A timestamped record, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<V> {
    /// Epoch milliseconds
    #[serde(rename = "ts")]
    pub timestamp: i64,
    pub value: V,
}

/// A periodic numeric measurement
pub type Sample = Record<f64>;

/// A user-triggered string event
pub type Event = Record<String>;

impl<V> Record<V> {
    pub fn new(timestamp: i64, value: V) -> Self {
        Self { timestamp, value }
    }
}

impl<V: Serialize> Record<V> {
    /// Serialize to the compact JSON stored in the persistent tier
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<V: for<'de> Deserialize<'de>> Record<V> {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A drained memory buffer, stored as a single persistent-tier entry
///
/// Serialized as `{"value":[{"ts":..,"value":..},..]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SampleBatch {
    pub value: Vec<Sample>,
}

impl SampleBatch {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { value: samples }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Give the samples back, e.g. to re-buffer after a failed promotion
    pub fn into_samples(self) -> Vec<Sample> {
        self.value
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
