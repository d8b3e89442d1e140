//! Export manifest and payload types
//!
//! A manifest identifies one export-and-clear operation; the payload is the
//! snapshot of every persistent-tier entry handed to the sink.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of one export operation (never persisted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Completed exports before this one in the current process
    pub sequence_number: u64,
    pub event_count: u64,
    pub tsval_count: u64,
    /// Epoch milliseconds of the tick or action that triggered the export
    pub timestamp: i64,
}

impl ExportManifest {
    /// Destination name: `dump_<seq>_events_<n>_tsVals_<m>_ts_<t>.json`
    pub fn file_name(&self) -> String {
        format!(
            "dump_{}_events_{}_tsVals_{}_ts_{}.json",
            self.sequence_number, self.event_count, self.tsval_count, self.timestamp
        )
    }

    /// Total entries covered by this export
    pub fn total_entries(&self) -> u64 {
        self.event_count + self.tsval_count
    }
}

/// How stored entries are laid out in the exported JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    /// Each array element is the raw stored JSON string (double-encoded)
    #[default]
    Compat,
    /// Each array element is the stored entry parsed back into JSON
    Structured,
}

/// Raw persistent-tier entries, in index order per stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExportPayload {
    pub events: Vec<String>,
    #[serde(rename = "tsVals")]
    pub ts_vals: Vec<String>,
}

impl ExportPayload {
    /// Serialize to the bytes handed to the sink
    pub fn to_bytes(&self, encoding: PayloadEncoding) -> Result<Vec<u8>, serde_json::Error> {
        match encoding {
            PayloadEncoding::Compat => serde_json::to_vec(self),
            PayloadEncoding::Structured => {
                let events = parse_all(&self.events)?;
                let ts_vals = parse_all(&self.ts_vals)?;
                serde_json::to_vec(&serde_json::json!({
                    "events": events,
                    "tsVals": ts_vals,
                }))
            }
        }
    }
}

fn parse_all(entries: &[String]) -> Result<Vec<Value>, serde_json::Error> {
    entries.iter().map(|e| serde_json::from_str(e)).collect()
}
