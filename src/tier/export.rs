//! Export sinks (tier 2)
//!
//! A sink receives the serialized persistent tier under a generated name and
//! acknowledges by returning `Ok`. The pipeline clears nothing until then.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::utils::atomic_write;

use super::error::SinkError;

/// External destination for exported payloads
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Deliver `payload` under `name`; `Ok` is the acknowledgment
    async fn export(&self, name: &str, payload: Vec<u8>) -> Result<(), SinkError>;
}

/// Writes each export as a file in a dump directory
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ExportSink for FileSink {
    async fn export(&self, name: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(SinkError::Rejected(format!("invalid dump name: {}", name)));
        }
        let path = self.dir.join(name);

        tokio::task::spawn_blocking(move || atomic_write(&path, &payload))
            .await
            .map_err(|e| SinkError::Rejected(format!("dump writer panicked: {}", e)))??;

        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemorySinkState {
    exports: Vec<(String, Vec<u8>)>,
    fail_next: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// Keeps exports in memory; clones share state
///
/// Can be told to reject the next N exports, and to take a fixed time per
/// export, which makes it useful for exercising failure and queuing paths.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
    delay: Option<Duration>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject the next `count` exports
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    /// Acknowledged exports as `(name, payload)`, oldest first
    pub fn exports(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().exports.clone()
    }

    pub fn export_count(&self) -> usize {
        self.state.lock().exports.len()
    }

    /// Most exports ever running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }
}

#[async_trait]
impl ExportSink for MemorySink {
    async fn export(&self, name: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        {
            let mut state = self.state.lock();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.in_flight -= 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SinkError::Rejected(format!("simulated failure for {}", name)));
        }
        state.exports.push((name.to_string(), payload));
        Ok(())
    }
}
