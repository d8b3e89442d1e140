//! Logical streams of the persistent tier

use serde::{Deserialize, Serialize};

/// One of the two data channels kept in the persistent tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    /// User-triggered events, one entry per event
    Events,
    /// Timestamped values, one entry per promoted batch
    TsVals,
}

impl Stream {
    /// Both streams, in export order of the payload fields
    pub const ALL: [Stream; 2] = [Stream::Events, Stream::TsVals];

    /// Key namespace for this stream's entries
    pub fn namespace(self) -> &'static str {
        match self {
            Stream::Events => "event",
            Stream::TsVals => "ts",
        }
    }

    /// Well-known key holding this stream's persisted count
    pub fn counter_key(self) -> &'static str {
        match self {
            Stream::Events => "eventCount",
            Stream::TsVals => "tsValCount",
        }
    }

    /// Key of the entry at `index`: `"<namespace>-<index>"`
    pub fn entry_key(self, index: u64) -> String {
        format!("{}-{}", self.namespace(), index)
    }

    /// Parse an entry key back into its index, if it belongs to this stream
    pub fn parse_entry_key(self, key: &str) -> Option<u64> {
        let rest = key.strip_prefix(self.namespace())?.strip_prefix('-')?;
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        rest.parse().ok()
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stream::Events => write!(f, "events"),
            Stream::TsVals => write!(f, "tsvals"),
        }
    }
}
