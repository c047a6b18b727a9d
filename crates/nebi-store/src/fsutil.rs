//! Atomic file replacement and advisory locking.
//!
//! Writes go to a temp file in the target's directory, are fsynced, then
//! renamed over the target. A crash at any point leaves either the old or the
//! new contents on disk.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use fs2::FileExt as _;
use tempfile::NamedTempFile;

use crate::error::StoreError;

/// Mode for state files (`nebi.db`, manifests written by pull).
pub const STATE_FILE_MODE: u32 = 0o644;
/// Mode for the credentials file.
pub const SECRET_FILE_MODE: u32 = 0o600;
/// Mode for directories nebi creates.
pub const DIR_MODE: u32 = 0o755;

/// Replace `path` with `contents` atomically, applying `mode` on unix.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(contents)
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    set_mode(tmp.path(), mode)?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

/// `create_dir_all` with [`DIR_MODE`] on unix.
pub fn create_dir_all(dir: &Path) -> Result<(), StoreError> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt as _;
        builder.mode(DIR_MODE);
    }
    builder.create(dir).map_err(|e| StoreError::io(dir, e))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt as _;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| StoreError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// FileLock
// ---------------------------------------------------------------------------

/// An exclusive advisory lock, released on drop.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock at `path` is held by this process.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;
        file.lock_exclusive().map_err(|e| StoreError::io(path, e))?;
        tracing::trace!(lock = %path.display(), "acquired store lock");
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        tracing::trace!(lock = %self.path.display(), "released store lock");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
