//! Atomic file writes.
//!
//! Run configurations, environment snapshots, figures and the initial
//! configuration file are written to a hidden sibling first, then renamed
//! onto their target, so a reader never sees a half-written file.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Hidden sibling `path` is staged in before the rename.
///
/// Keeps the full file name so that `x.svg` and `x.json` never share one.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `data` as pretty-printed JSON and write it atomically.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Write `data` to `path` atomically, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let staging = staging_path(path);
    if let Err(e) = std::fs::write(&staging, data).and_then(|()| std::fs::rename(&staging, path)) {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }
    Ok(())
}
