//! Persisted per-stream entry counters
//!
//! Each stream's count lives in the store under a well-known key as a
//! decimal string. The count is the source of truth for which indices are
//! populated: entries `0..count` exist, nothing else does.
//!
//! Callers must write an entry before incrementing, and remove entries
//! before resetting, so an interrupted sequence under-counts.

use crate::types::Stream;

use super::error::{TierError, TierResult};
use super::store::KeyValueStore;

/// Borrowed view over the counters kept in a store
pub struct KeyedCounter<'a, S> {
    store: &'a S,
}

impl<'a, S: KeyValueStore> KeyedCounter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Current count; a missing or non-numeric value reads as zero
    pub fn count(&self, stream: Stream) -> TierResult<u64> {
        let key = stream.counter_key();
        let raw = self.store.get(key).map_err(|source| TierError::StoreRead {
            key: key.to_string(),
            source,
        })?;

        Ok(raw.as_deref().map(parse_count).unwrap_or(0))
    }

    /// Add one to the count and return the new value
    pub fn increment(&self, stream: Stream) -> TierResult<u64> {
        let next = self.count(stream)? + 1;
        self.set(stream, next)?;
        Ok(next)
    }

    pub fn reset(&self, stream: Stream) -> TierResult<()> {
        self.set(stream, 0)
    }

    /// Sum of both stream counts
    pub fn combined(&self) -> TierResult<u64> {
        Ok(self.count(Stream::Events)? + self.count(Stream::TsVals)?)
    }

    /// Overwrite the count
    pub fn set(&self, stream: Stream, value: u64) -> TierResult<()> {
        let key = stream.counter_key();
        self.store
            .set(key, &value.to_string())
            .map_err(|source| TierError::StoreWrite {
                key: key.to_string(),
                source,
            })
    }
}

/// Leading decimal digits after optional whitespace, like a lenient integer
/// parse; anything else counts as zero.
fn parse_count(raw: &str) -> u64 {
    let trimmed = raw.trim_start();
    let digits = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .map_or(trimmed, |end| &trimmed[..end]);

    if digits.is_empty() {
        tracing::debug!(raw, "non-numeric counter value, treating as zero");
        return 0;
    }
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::store::MemoryKvStore;

    #[test]
    fn test_missing_counter_is_zero() {
        let store = MemoryKvStore::new();
        let counter = KeyedCounter::new(&store);
        assert_eq!(counter.count(Stream::Events).unwrap(), 0);
        assert_eq!(counter.combined().unwrap(), 0);
    }

    #[test]
    fn test_increment_and_reset() {
        let store = MemoryKvStore::new();
        let counter = KeyedCounter::new(&store);

        assert_eq!(counter.increment(Stream::TsVals).unwrap(), 1);
        assert_eq!(counter.increment(Stream::TsVals).unwrap(), 2);
        assert_eq!(counter.increment(Stream::Events).unwrap(), 1);
        assert_eq!(store.get("tsValCount").unwrap().as_deref(), Some("2"));
        assert_eq!(counter.combined().unwrap(), 3);

        counter.reset(Stream::TsVals).unwrap();
        assert_eq!(counter.count(Stream::TsVals).unwrap(), 0);
        assert_eq!(store.get("tsValCount").unwrap().as_deref(), Some("0"));
        assert_eq!(counter.count(Stream::Events).unwrap(), 1);
    }

    #[test]
    fn test_corrupted_counter_reads_zero_then_increments_to_one() {
        let store = MemoryKvStore::new();
        store.set("eventCount", "garbage").unwrap();

        let counter = KeyedCounter::new(&store);
        assert_eq!(counter.count(Stream::Events).unwrap(), 0);
        assert_eq!(counter.increment(Stream::Events).unwrap(), 1);
        assert_eq!(store.get("eventCount").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("12"), 12);
        assert_eq!(parse_count(" 7"), 7);
        assert_eq!(parse_count("5abc"), 5);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("-3"), 0);
        assert_eq!(parse_count("NaN"), 0);
    }
}
