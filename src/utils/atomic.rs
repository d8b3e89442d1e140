//! Atomic file operations
//!
//! Stored entries and exported dumps are written with the same pattern:
//!
//! 1. Write to a temporary file (.tmp)
//! 2. Call sync_all() to flush to disk
//! 3. Rename temp file to final path (atomic on most filesystems)
//!
//! A reader therefore sees either the old file or the complete new one.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Atomically write bytes to a file, creating parent directories
///
/// # Example
///
/// ```ignore
/// atomic_write("dumps/dump_0_events_1_tsVals_0_ts_1.json", b"{}")?;
/// ```
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> io::Result<()> {
    let path = path.as_ref();
    let temp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Remove leftover temp files from interrupted writes
///
/// Returns the number of files removed.
pub fn cleanup_temp_files<P: AsRef<Path>>(dir: P) -> io::Result<usize> {
    let dir = dir.as_ref();
    let mut cleaned = 0;

    if !dir.exists() {
        return Ok(0);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.extension().map(|e| e == "tmp").unwrap_or(false) {
            fs::remove_file(&path)?;
            cleaned += 1;
        }
    }

    Ok(cleaned)
}
