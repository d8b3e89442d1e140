//! Pipeline configuration
//!
//! Defaults: 30 samples per batch, 30 stored entries before export, 500 ms
//! ticks. A JSON file may override any field using the camelCase names
//! below; `TIER_*` environment variables override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::PayloadEncoding;

use super::error::{TierError, TierResult};

/// Configuration for the promotion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Interval between scheduler ticks
    pub tick_interval_ms: u64,
    /// Samples buffered in memory before a batch is promoted
    pub memory_buffer_capacity: usize,
    /// Stored events at which a threshold warning is logged
    pub event_threshold: u64,
    /// Combined stored entries at which an automatic export runs
    pub combined_persistent_threshold: u64,
    pub auto_export_enabled: bool,
    /// Also export when the event threshold is crossed
    pub export_on_event_threshold: bool,
    pub payload_encoding: PayloadEncoding,
    /// Capacity for the bundled stores; `None` means unbounded
    pub max_store_entries: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            memory_buffer_capacity: 30,
            event_threshold: 30,
            combined_persistent_threshold: 30,
            auto_export_enabled: true,
            export_on_event_threshold: false,
            payload_encoding: PayloadEncoding::Compat,
            max_store_entries: None,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file; absent fields keep their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> TierResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TIER_*` overrides from the process environment
    pub fn with_env_overrides(self) -> TierResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `TIER_*` overrides from an arbitrary lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> TierResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TIER_TICK_INTERVAL_MS") {
            self.tick_interval_ms = parse_var("TIER_TICK_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("TIER_BUFFER_CAPACITY") {
            self.memory_buffer_capacity = parse_var("TIER_BUFFER_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("TIER_EVENT_THRESHOLD") {
            self.event_threshold = parse_var("TIER_EVENT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("TIER_COMBINED_THRESHOLD") {
            self.combined_persistent_threshold = parse_var("TIER_COMBINED_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("TIER_AUTO_EXPORT") {
            self.auto_export_enabled = parse_bool("TIER_AUTO_EXPORT", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings that would make the cascade meaningless
    pub fn validate(&self) -> TierResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(TierError::Config("tickIntervalMs must be at least 1".into()));
        }
        if self.memory_buffer_capacity == 0 {
            return Err(TierError::Config(
                "memoryBufferCapacity must be at least 1".into(),
            ));
        }
        if self.event_threshold == 0 {
            return Err(TierError::Config("eventThreshold must be at least 1".into()));
        }
        if self.combined_persistent_threshold == 0 {
            return Err(TierError::Config(
                "combinedPersistentThreshold must be at least 1".into(),
            ));
        }
        if self.max_store_entries == Some(0) {
            return Err(TierError::Config("maxStoreEntries must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> TierResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TierError::Config(format!("{} has invalid value {:?}", name, value)))
}

fn parse_bool(name: &str, value: &str) -> TierResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TierError::Config(format!(
            "{} has invalid value {:?}",
            name, value
        ))),
    }
}
