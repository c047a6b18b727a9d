//! The persistent workspace store (`nebi.db`).
//!
//! # Concurrency
//!
//! Mutations run through [`Store::update`]: take the advisory lock, re-read
//! the database, apply the change in memory, atomically replace the file,
//! release the lock. Readers skip the lock; because the file is only ever
//! replaced by rename, a reader sees either the state before or after any
//! mutation, never a mix.
//!
//! # Layout
//!
//! ```text
//! <data dir>/
//!   nebi.db              JSON: schema, server URL, tracked workspaces
//!   nebi.db.lock         advisory lock file
//!   workspaces/<id>/     bodies of global workspaces
//! ```

use std::path::{Path, PathBuf};

use rand::Rng as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::fsutil::{self, FileLock, STATE_FILE_MODE};
use crate::model::{Workspace, WorkspaceKind, normalize_server_url, unix_now, validate_name};
use crate::paths::normalize_path;

const DB_FILE: &str = "nebi.db";
const LOCK_FILE: &str = "nebi.db.lock";
const GLOBAL_DIR: &str = "workspaces";
const SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// StoreState
// ---------------------------------------------------------------------------

/// The full contents of `nebi.db`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default = "schema_version")]
    pub schema: u32,
    /// Normalized URL of the configured server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            schema: SCHEMA_VERSION,
            server_url: None,
            workspaces: Vec::new(),
        }
    }
}

const fn schema_version() -> u32 {
    SCHEMA_VERSION
}

impl StoreState {
    /// Entry whose path equals `normalized`.
    #[must_use]
    pub fn by_path(&self, normalized: &Path) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.path == normalized)
    }

    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.id == id)
    }

    pub fn by_id_mut(&mut self, id: &str) -> Option<&mut Workspace> {
        self.workspaces.iter_mut().find(|w| w.id == id)
    }

    /// Insert a new entry. Fails if its path is already tracked.
    pub fn insert(&mut self, workspace: Workspace) -> Result<(), StoreError> {
        validate_name(&workspace.name)?;
        if let Some(existing) = self.by_path(&workspace.path) {
            return Err(StoreError::AlreadyTracked {
                path: workspace.path,
                name: existing.name.clone(),
            });
        }
        self.workspaces.push(workspace);
        Ok(())
    }

    /// Replace the entry with the same id.
    pub fn replace(&mut self, workspace: Workspace) -> Result<(), StoreError> {
        validate_name(&workspace.name)?;
        if let Some(other) = self
            .workspaces
            .iter()
            .find(|w| w.path == workspace.path && w.id != workspace.id)
        {
            return Err(StoreError::AlreadyTracked {
                path: workspace.path,
                name: other.name.clone(),
            });
        }
        let slot = self
            .by_id_mut(&workspace.id)
            .ok_or_else(|| StoreError::UnknownId(workspace.id.clone()))?;
        *slot = workspace;
        Ok(())
    }

    /// Remove and return the entry with `id`.
    pub fn remove(&mut self, id: &str) -> Result<Workspace, StoreError> {
        let index = self
            .workspaces
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| StoreError::UnknownId(id.to_owned()))?;
        Ok(self.workspaces.remove(index))
    }
}

// ---------------------------------------------------------------------------
// NewWorkspace
// ---------------------------------------------------------------------------

/// Parameters for a new tracking entry.
#[derive(Clone, Debug)]
pub struct NewWorkspace {
    /// Pre-allocated id (global workspaces need it before the entry exists).
    pub id: Option<String>,
    pub path: PathBuf,
    pub name: String,
    pub kind: WorkspaceKind,
}

impl NewWorkspace {
    #[must_use]
    pub fn local(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            path: path.into(),
            name: name.into(),
            kind: WorkspaceKind::Local,
        }
    }

    /// Build the entry, normalizing the path against `cwd`.
    #[must_use]
    pub fn build(self, cwd: &Path) -> Workspace {
        Workspace {
            id: self.id.unwrap_or_else(new_id),
            name: self.name,
            path: normalize_path(&self.path, cwd),
            kind: self.kind,
            origins: std::collections::BTreeMap::new(),
            created_at: unix_now(),
        }
    }
}

/// A fresh opaque workspace id (16 lowercase hex chars).
#[must_use]
pub fn new_id() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the on-disk store. Cheap to clone; holds no open files.
#[derive(Clone, Debug)]
pub struct Store {
    data_dir: PathBuf,
    db_path: PathBuf,
    lock_path: PathBuf,
    cwd: PathBuf,
}

impl Store {
    /// Open the store rooted at `data_dir`, creating the directory if needed.
    ///
    /// `cwd` is the base for relative path normalization.
    pub fn open(data_dir: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fsutil::create_dir_all(&data_dir)?;
        Ok(Self {
            db_path: data_dir.join(DB_FILE),
            lock_path: data_dir.join(LOCK_FILE),
            data_dir,
            cwd: cwd.into(),
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Directory that holds the body of the global workspace `id`.
    #[must_use]
    pub fn global_workspace_dir(&self, id: &str) -> PathBuf {
        self.data_dir.join(GLOBAL_DIR).join(id)
    }

    /// Normalize `path` the way stored paths are normalized.
    #[must_use]
    pub fn normalize(&self, path: &Path) -> PathBuf {
        normalize_path(path, &self.cwd)
    }

    /// Read the current state without taking the lock.
    pub fn load(&self) -> Result<StoreState, StoreError> {
        match std::fs::read(&self.db_path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: self.db_path.clone(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreState::default()),
            Err(e) => Err(StoreError::io(&self.db_path, e)),
        }
    }

    /// Run a mutation under the store lock.
    ///
    /// The closure sees the freshest on-disk state. If it returns an error,
    /// nothing is written.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _lock = FileLock::acquire(&self.lock_path)?;
        let mut state = self.load()?;
        let out = f(&mut state)?;
        state.schema = SCHEMA_VERSION;
        let json = serde_json::to_vec_pretty(&state).map_err(|e| StoreError::Corrupt {
            path: self.db_path.clone(),
            message: e.to_string(),
        })?;
        fsutil::write_atomic(&self.db_path, &json, STATE_FILE_MODE)?;
        debug!(db = %self.db_path.display(), "store updated");
        Ok(out)
    }

    // -- queries ------------------------------------------------------------

    pub fn list_workspaces(&self) -> Result<Vec<Workspace>, StoreError> {
        Ok(self.load()?.workspaces)
    }

    pub fn find_by_path(&self, path: &Path) -> Result<Option<Workspace>, StoreError> {
        let normalized = self.normalize(path);
        Ok(self.load()?.by_path(&normalized).cloned())
    }

    pub fn find_by_name(&self, name: &str) -> Result<Vec<Workspace>, StoreError> {
        Ok(self
            .load()?
            .workspaces
            .into_iter()
            .filter(|w| w.name == name)
            .collect())
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Workspace>, StoreError> {
        Ok(self.load()?.by_id(id).cloned())
    }

    // -- mutations ----------------------------------------------------------

    /// Track `path` under `name`. Fails if the path is already tracked.
    pub fn create(&self, path: &Path, name: &str) -> Result<Workspace, StoreError> {
        self.create_with(NewWorkspace::local(path, name))
    }

    pub fn create_with(&self, new: NewWorkspace) -> Result<Workspace, StoreError> {
        let workspace = new.build(&self.cwd);
        self.update(|state| {
            state.insert(workspace.clone())?;
            Ok(())
        })?;
        info!(id = %workspace.id, name = %workspace.name, path = %workspace.path.display(), "tracking workspace");
        Ok(workspace)
    }

    /// Return the entry tracked at `new.path`, inserting `new` if there is
    /// none, and apply `edit` to it. Lookup, insert and edit happen under
    /// one lock, so concurrent callers for the same path share one entry.
    ///
    /// The flag is true when the entry was inserted by this call.
    pub fn find_or_create(
        &self,
        new: NewWorkspace,
        edit: impl FnOnce(&mut Workspace),
    ) -> Result<(Workspace, bool), StoreError> {
        let candidate = new.build(&self.cwd);
        let (workspace, created) = self.update(|state| {
            let created = state.by_path(&candidate.path).is_none();
            if created {
                state.insert(candidate.clone())?;
            }
            let entry = state
                .workspaces
                .iter_mut()
                .find(|w| w.path == candidate.path)
                .ok_or_else(|| StoreError::UnknownId(candidate.id.clone()))?;
            edit(entry);
            Ok((entry.clone(), created))
        })?;
        if created {
            info!(id = %workspace.id, name = %workspace.name, path = %workspace.path.display(), "tracking workspace");
        }
        Ok((workspace, created))
    }

    /// Replace the stored entry with the same id.
    pub fn save(&self, workspace: &Workspace) -> Result<(), StoreError> {
        let workspace = workspace.clone();
        self.update(|state| state.replace(workspace))
    }

    /// Remove the entry. Files on disk are not touched.
    pub fn delete(&self, id: &str) -> Result<Workspace, StoreError> {
        self.update(|state| state.remove(id))
    }

    /// Remove every entry whose directory no longer exists.
    pub fn prune(&self) -> Result<Vec<Workspace>, StoreError> {
        self.update(|state| {
            let (gone, kept): (Vec<_>, Vec<_>) =
                std::mem::take(&mut state.workspaces)
                    .into_iter()
                    .partition(|w| match std::fs::metadata(&w.path) {
                        Ok(_) => false,
                        Err(e) => e.kind() == std::io::ErrorKind::NotFound,
                    });
            state.workspaces = kept;
            Ok(gone)
        })
    }

    pub fn server_url(&self) -> Result<Option<String>, StoreError> {
        Ok(self.load()?.server_url)
    }

    pub fn set_server_url(&self, url: &str) -> Result<(), StoreError> {
        let url = normalize_server_url(url);
        self.update(|state| {
            state.server_url = Some(url);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
