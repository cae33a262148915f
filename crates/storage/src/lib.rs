//! Local-filesystem-only atomic I/O primitives.
//!
//! This used to wrap `object_store` to give the workspace one abstraction
//! over local disk, S3, GCS and Azure. The table layer built on top of it
//! only ever targets a local hierarchical filesystem — distributed
//! filesystem support is explicitly out of scope — so the multi-backend
//! plumbing has been stripped down to the one thing every backend needed
//! anyway: writes that are either fully visible or not visible at all.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("destination already exists: {0}")]
    AlreadyExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, StorageError>;

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `bytes` to `path` such that readers never observe a partial file:
/// stage into a sibling temp file in the same directory, then rename into
/// place. A rename within one filesystem is atomic on every platform this
/// crate targets.
///
/// When `fail_if_exists` is set, the write fails with
/// [`StorageError::AlreadyExists`] if `path` is already present — used by
/// the log store so a caller accidentally re-writing a committed version is
/// caught rather than silently overwritten.
pub async fn atomic_write(path: &Path, bytes: &[u8], fail_if_exists: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(parent, e))?;
    }

    if fail_if_exists && fs::metadata(path).await.is_ok() {
        return Err(StorageError::AlreadyExists(path.to_path_buf()));
    }

    let tmp_path = sibling_temp_path(path);
    fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| io_err(&tmp_path, e))?;

    if fail_if_exists && fs::metadata(path).await.is_ok() {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StorageError::AlreadyExists(path.to_path_buf()));
    }

    match fs::rename(&tmp_path, path).await {
        Ok(()) => {
            debug!(path = %path.display(), "wrote file atomically");
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path).await;
            Err(io_err(path, e))
        }
    }
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp");
    let unique = format!(".{}.tmp-{}", file_name, std::process::id());
    match path.parent() {
        Some(parent) => parent.join(unique),
        None => PathBuf::from(unique),
    }
}

/// Reads the whole contents of `path`. Returns `Ok(None)` if the file does
/// not exist so callers can treat a missing commit/pointer file as "nothing
/// written yet" rather than an error.
pub async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Lists the file names (not full paths) directly inside `dir`. Returns an
/// empty list if the directory does not exist.
pub async fn list_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut read_dir = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(dir, e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(|e| io_err(dir, e))? {
        if let Ok(file_type) = entry.file_type().await {
            if !file_type.is_file() {
                continue;
            }
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
