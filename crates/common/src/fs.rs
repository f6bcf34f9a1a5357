//! JSON document persistence with atomic replacement.
//!
//! Readers of the data directory (the agent, the watcher) must never observe a
//! half-written document, so every write goes to a sibling temp file first and
//! is renamed over the target.

use std::path::{Path, PathBuf};

use {
    serde::{Serialize, de::DeserializeOwned},
    tokio::fs,
    tracing::debug,
};

use crate::Result;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read and parse a JSON document. Returns `Ok(None)` when the file is missing.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).await?;
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Serialize `value` and atomically replace `path` with it.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = temp_path(path);
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), "wrote json document");
    Ok(())
}

/// Create `path` holding `initial` unless it already exists.
pub async fn ensure_json_file(path: &Path, initial: &serde_json::Value) -> Result<()> {
    if fs::try_exists(path).await.unwrap_or(false) {
        return Ok(());
    }
    write_json_atomic(path, initial).await
}
