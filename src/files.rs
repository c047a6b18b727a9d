//! `pixi.toml` / `pixi.lock` on disk.

use std::path::Path;

use nebi_store::fsutil::{self, STATE_FILE_MODE};
use nebi_store::{hash_lock, hash_manifest};
use tracing::debug;

use crate::error::NebiError;

pub const MANIFEST_FILE: &str = "pixi.toml";
pub const LOCK_FILE: &str = "pixi.lock";

/// The two files a pixi workspace is synced as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceFiles {
    pub manifest: String,
    pub lock: Option<String>,
}

impl WorkspaceFiles {
    #[must_use]
    pub fn new(manifest: impl Into<String>, lock: Option<String>) -> Self {
        Self {
            manifest: manifest.into(),
            lock,
        }
    }

    /// Read both files from `dir`. A missing lock file is not an error.
    pub fn read(dir: &Path) -> Result<Self, NebiError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = match std::fs::read_to_string(&manifest_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NebiError::MissingManifest {
                    dir: dir.to_path_buf(),
                });
            }
            Err(e) => return Err(NebiError::io("failed to read", manifest_path, e)),
        };
        Ok(Self {
            manifest,
            lock: read_lock(dir)?,
        })
    }

    /// Write both files into `dir` (created if needed). The lock file is
    /// written only when present; an existing one is left alone otherwise.
    pub fn write(&self, dir: &Path) -> Result<(), NebiError> {
        fsutil::create_dir_all(dir)?;
        fsutil::write_atomic(
            &dir.join(MANIFEST_FILE),
            self.manifest.as_bytes(),
            STATE_FILE_MODE,
        )?;
        if let Some(lock) = &self.lock {
            fsutil::write_atomic(&dir.join(LOCK_FILE), lock.as_bytes(), STATE_FILE_MODE)?;
        }
        debug!(dir = %dir.display(), lock = self.lock.is_some(), "wrote workspace files");
        Ok(())
    }

    #[must_use]
    pub fn manifest_hash(&self) -> String {
        hash_manifest(self.manifest.as_bytes())
    }

    #[must_use]
    pub fn lock_hash(&self) -> Option<String> {
        self.lock.as_deref().map(|l| hash_lock(l.as_bytes()))
    }
}

/// Read `pixi.lock` from `dir`, `None` when absent.
pub fn read_lock(dir: &Path) -> Result<Option<String>, NebiError> {
    let path = dir.join(LOCK_FILE);
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(NebiError::io("failed to read", path, e)),
    }
}

#[must_use]
pub fn has_manifest(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

/// `[workspace].name`, falling back to the older `[project].name`.
///
/// `None` when the manifest does not parse or has no name.
#[must_use]
pub fn manifest_name(manifest: &str) -> Option<String> {
    let table: toml::Table = manifest.parse().ok()?;
    ["workspace", "project"].iter().find_map(|section| {
        table
            .get(*section)?
            .get("name")?
            .as_str()
            .map(str::to_owned)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_requires_manifest() {
        let dir = tempdir().unwrap();
        let err = WorkspaceFiles::read(dir.path()).unwrap_err();
        assert!(matches!(err, NebiError::MissingManifest { .. }));
    }

    #[test]
    fn read_without_lock() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "[workspace]\nname = \"a\"\n").unwrap();
        let files = WorkspaceFiles::read(dir.path()).unwrap();
        assert!(files.lock.is_none());
        assert!(files.lock_hash().is_none());
    }

    #[test]
    fn write_creates_dir_and_keeps_bytes() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/ws");
        let files = WorkspaceFiles::new("[workspace]\nname = \"a\"\n", Some("version: 6\n".into()));
        files.write(&target).unwrap();
        assert_eq!(WorkspaceFiles::read(&target).unwrap(), files);
    }

    #[test]
    fn write_without_lock_leaves_existing_lock() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), "old").unwrap();
        WorkspaceFiles::new("x = 1\n", None).write(dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join(LOCK_FILE)).unwrap(), "old");
    }

    #[test]
    fn manifest_hash_ignores_formatting() {
        let a = WorkspaceFiles::new("[workspace]\nname = \"a\"\n", None);
        let b = WorkspaceFiles::new("# comment\n[workspace]\nname   =   \"a\"\n", None);
        assert_eq!(a.manifest_hash(), b.manifest_hash());
    }

    #[test]
    fn manifest_name_sections() {
        assert_eq!(
            manifest_name("[workspace]\nname = \"demo\"\n").as_deref(),
            Some("demo")
        );
        assert_eq!(
            manifest_name("[project]\nname = \"legacy\"\n").as_deref(),
            Some("legacy")
        );
        assert_eq!(manifest_name("[dependencies]\npython = \"*\"\n"), None);
        assert_eq!(manifest_name("not toml ["), None);
    }
}
