//! Error types for the buffering tiers
//!
//! ## Error Categories
//!
//! - `StoreError`: a key-value backend refused or failed an operation
//! - `SinkError`: the export transport did not acknowledge
//! - `TierError`: pipeline-level faults, carrying the key or export name
//!   they concern
//!
//! Counter corruption has no variant: a non-numeric counter reads as zero.

use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub type TierResult<T> = std::result::Result<T, TierError>;

/// Failures reported by a `KeyValueStore` backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is full ({capacity} entries)")]
    Full { capacity: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Failures reported by an `ExportSink`
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export rejected: {0}")]
    Rejected(String),
}

/// Errors surfaced by the pipeline
#[derive(Debug, Error)]
pub enum TierError {
    /// The persistent tier rejected a write; the counter was not incremented
    #[error("store write failed for {key}: {source}")]
    StoreWrite {
        key: String,
        #[source]
        source: StoreError,
    },

    /// The capacity probe refused a write before it reached the backend
    #[error("store capacity of {capacity} entries reached, refusing write to {key}")]
    StoreFull { key: String, capacity: usize },

    #[error("store read failed for {key}: {source}")]
    StoreRead {
        key: String,
        #[source]
        source: StoreError,
    },

    /// An index below the stream counter has no entry
    #[error("missing entry at {key}")]
    MissingEntry { key: String },

    /// The sink did not acknowledge; the persistent tier is untouched
    #[error("export of {name} not acknowledged: {source}")]
    Export {
        name: String,
        #[source]
        source: SinkError,
    },

    /// The export was acknowledged but some entries could not be removed
    #[error("export {name} acknowledged but {failed} entries could not be removed")]
    ClearIncomplete { name: String, failed: usize },

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scheduler is not running")]
    SchedulerStopped,
}

impl TierError {
    /// True for faults caused by a full or failing persistent tier
    pub fn is_store_write(&self) -> bool {
        matches!(self, TierError::StoreWrite { .. } | TierError::StoreFull { .. })
    }

    /// True for missing or unreadable entries (data-integrity faults)
    pub fn is_store_read(&self) -> bool {
        matches!(self, TierError::StoreRead { .. } | TierError::MissingEntry { .. })
    }

    pub fn is_export(&self) -> bool {
        matches!(self, TierError::Export { .. })
    }
}
