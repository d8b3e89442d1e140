//! Core data types
//!
//! This module contains the records, streams and export manifests shared by
//! every tier.

pub mod manifest;
pub mod record;
pub mod stream;

pub use manifest::{ExportManifest, ExportPayload, PayloadEncoding};
pub use record::{Event, Record, Sample, SampleBatch};
pub use stream::Stream;
