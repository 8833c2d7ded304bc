//! Whole-file JSON persistence.
//!
//! Writers replace files atomically (temp file in the same directory, then
//! rename), so an unlocked reader sees either the old document or the new
//! one, never a torn write.

use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use synapse_notify_core::Result;

/// What a single read attempt found on disk.
#[derive(Debug)]
pub enum ReadOutcome<T> {
    Missing,
    Parsed(T),
    /// Present but not a valid document; carries the parse error text.
    Malformed(String),
}

/// Read and parse a JSON document without taking any lock.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<ReadOutcome<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ReadOutcome::Missing),
        Err(err) => return Err(err.into()),
    };
    Ok(match serde_json::from_slice::<T>(&bytes) {
        Ok(value) => ReadOutcome::Parsed(value),
        Err(err) => ReadOutcome::Malformed(err.to_string()),
    })
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// Creates parent directories as needed.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut content = serde_json::to_vec_pretty(value)?;
    content.push(b'\n');
    atomic_write_bytes(path, &content)
}

/// Write bytes to a file atomically via a temp file + rename.
///
/// The temp file is created in the same directory as the target so that
/// `fs::rename` stays on one filesystem.
fn atomic_write_bytes(path: &Path, data: &[u8]) -> Result<()> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        ".{}.tmp-{}-{seq}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        std::process::id(),
    );
    let tmp_path = parent.join(tmp_name);

    let written = (|| -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(data)?;
        f.sync_data()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
