// ABOUTME: Whole-file persistence of the store as pretty-printed JSON.
// ABOUTME: Writes go to a temp file that is fsynced and renamed over the target so a crash never leaves a torn file.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use readmark_core::Database;
use thiserror::Error;

/// Errors that can occur while writing the primary store file.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes the full store to its primary file.
///
/// The writer takes no lock of its own. Inside [`crate::RecordStore`] the only
/// way to reach a `&Database` is through the store's mutex guard, so every
/// write observes a completed mutation.
#[derive(Debug, Clone)]
pub struct PersistWriter {
    path: PathBuf,
}

impl PersistWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the primary store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `db` and replace the primary file with it. Returns the number of bytes written.
    pub fn write(&self, db: &Database) -> Result<usize, PersistError> {
        let json = serde_json::to_string_pretty(db)?;
        write_atomic(&self.path, json.as_bytes()).inspect_err(|e| {
            tracing::error!(path = %self.path.display(), "failed to save the database to disk: {}", e);
        })?;
        tracing::debug!(path = %self.path.display(), bytes = json.len(), "wrote database to disk");
        Ok(json.len())
    }
}

/// Write `data` to `path` via `<path>.tmp`, fsync, then rename.
/// Creates parent directories as needed. The file is only readable by its owner.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(path);
    let mut file = create_private(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;

    // Best-effort: make the rename itself durable.
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Like [`write_atomic`] but never replaces an existing file.
/// Fails with [`io::ErrorKind::AlreadyExists`] when `path` is taken.
pub(crate) fn write_new(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(path);
    let mut file = create_private(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    let linked = fs::hard_link(&tmp_path, path);
    let _ = fs::remove_file(&tmp_path);
    linked?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn create_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}
