//! Tracked-directory bookkeeping on top of the local store.
//!
//! Looking a directory up keeps its display name in step with the
//! manifest's `name` field. A manifest name that fails validation is
//! reported back as [`NameSync::Rejected`] and never stored.

use std::path::{Path, PathBuf};

use nebi_store::{
    NewWorkspace, Store, StoreError, Workspace, WorkspaceKind, new_id, validate_name,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::NebiError;
use crate::files::{self, MANIFEST_FILE};
use crate::refs::{is_path_like, resolve_path};

/// What happened to the display name during a lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum NameSync {
    Unchanged,
    Renamed { from: String, to: String },
    Rejected { manifest_name: String, reason: String },
}

impl NameSync {
    /// Warning text for the user, if any.
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Rejected {
                manifest_name,
                reason,
            } => Some(format!(
                "pixi.toml name '{manifest_name}' is not a valid workspace name ({reason}); keeping the tracked name"
            )),
            Self::Unchanged | Self::Renamed { .. } => None,
        }
    }
}

/// A tracked workspace plus the outcome of its name sync.
#[derive(Clone, Debug)]
pub struct Tracked {
    pub workspace: Workspace,
    pub name_sync: NameSync,
}

/// Find the workspace tracked at `dir` and sync its name from `pixi.toml`.
pub fn lookup(store: &Store, dir: &Path) -> Result<Option<Tracked>, NebiError> {
    let Some(mut workspace) = store.find_by_path(dir)? else {
        return Ok(None);
    };
    let manifest_name = match std::fs::read_to_string(workspace.path.join(MANIFEST_FILE)) {
        Ok(text) => files::manifest_name(&text),
        Err(_) => None,
    };
    let name_sync = match manifest_name {
        Some(name) if name != workspace.name => match validate_name(&name) {
            Ok(()) => {
                let id = workspace.id.clone();
                let renamed = name.clone();
                store.update(|state| {
                    let entry = state
                        .by_id_mut(&id)
                        .ok_or_else(|| StoreError::UnknownId(id.clone()))?;
                    entry.name = renamed;
                    Ok(())
                })?;
                info!(from = %workspace.name, to = %name, "workspace renamed from pixi.toml");
                let from = std::mem::replace(&mut workspace.name, name.clone());
                NameSync::Renamed { from, to: name }
            }
            Err(e) => {
                warn!(name = %name, reason = e.reason, "ignoring invalid manifest name");
                NameSync::Rejected {
                    manifest_name: name,
                    reason: e.reason.to_owned(),
                }
            }
        },
        _ => NameSync::Unchanged,
    };
    Ok(Some(Tracked {
        workspace,
        name_sync,
    }))
}

/// Like [`lookup`], but an untracked directory is an error.
pub fn require(store: &Store, dir: &Path) -> Result<Tracked, NebiError> {
    lookup(store, dir)?.ok_or_else(|| NebiError::NotTracked {
        path: store.normalize(dir),
    })
}

/// Name for a newly tracked directory: the manifest name when valid, else
/// the directory's base name.
#[must_use]
pub fn default_name(dir: &Path, manifest: Option<&str>) -> String {
    if let Some(name) = manifest.and_then(files::manifest_name)
        && validate_name(&name).is_ok()
    {
        return name;
    }
    let base = dir
        .file_name()
        .map(|n| n.to_string_lossy().replace(':', "-"))
        .unwrap_or_default();
    if validate_name(&base).is_ok() {
        base
    } else {
        "workspace".to_owned()
    }
}

/// Outcome of [`init`].
#[derive(Clone, Debug)]
pub enum InitOutcome {
    Created(Workspace),
    AlreadyTracked(Workspace),
}

/// Track `dir`. It must contain a `pixi.toml`.
pub fn init(store: &Store, dir: &Path) -> Result<InitOutcome, NebiError> {
    let dir = store.normalize(dir);
    let manifest = match std::fs::read_to_string(dir.join(MANIFEST_FILE)) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(NebiError::MissingManifest { dir });
        }
        Err(e) => return Err(NebiError::io("failed to read", dir.join(MANIFEST_FILE), e)),
    };
    if let Some(existing) = lookup(store, &dir)? {
        return Ok(InitOutcome::AlreadyTracked(existing.workspace));
    }
    let name = default_name(&dir, Some(&manifest));
    Ok(InitOutcome::Created(store.create(&dir, &name)?))
}

/// Return the entry tracked at `dir`, creating one if needed.
///
/// `fallback_name` is used when neither the manifest nor the directory
/// name yields a valid name.
pub fn ensure_tracked(
    store: &Store,
    dir: &Path,
    kind: WorkspaceKind,
    id: Option<String>,
    fallback_name: &str,
) -> Result<(Workspace, bool), NebiError> {
    ensure_tracked_with(store, dir, kind, id, fallback_name, |_| {})
}

/// [`ensure_tracked`], applying `edit` to the entry under the same store
/// lock as the lookup and insert.
pub fn ensure_tracked_with(
    store: &Store,
    dir: &Path,
    kind: WorkspaceKind,
    id: Option<String>,
    fallback_name: &str,
    edit: impl FnOnce(&mut Workspace),
) -> Result<(Workspace, bool), NebiError> {
    let manifest = std::fs::read_to_string(dir.join(MANIFEST_FILE)).ok();
    let name = match manifest.as_deref().and_then(files::manifest_name) {
        Some(name) if validate_name(&name).is_ok() => name,
        _ if kind == WorkspaceKind::Global => fallback_name.to_owned(),
        _ => default_name(dir, None),
    };
    let new = NewWorkspace {
        id,
        path: dir.to_path_buf(),
        name,
        kind,
    };
    Ok(store.find_or_create(new, edit)?)
}

/// Resolve `name`, a path, or `.` to one tracked workspace.
pub fn resolve_selector(store: &Store, cwd: &Path, selector: &str) -> Result<Workspace, NebiError> {
    if is_path_like(selector) {
        let path = resolve_path(selector, cwd);
        return store
            .find_by_path(&path)?
            .ok_or(NebiError::NotTracked { path });
    }
    let mut matches = store.find_by_name(selector)?;
    match matches.len() {
        0 => Err(NebiError::UnknownWorkspace(selector.to_owned())),
        1 => Ok(matches.remove(0)),
        _ => Err(NebiError::AmbiguousName {
            name: selector.to_owned(),
            paths: matches.into_iter().map(|w| w.path).collect(),
        }),
    }
}

/// Where a global pull materializes `name`: the existing global entry with
/// that name, or a fresh id under the data directory.
pub fn global_target(store: &Store, name: &str) -> Result<(PathBuf, Option<String>), NebiError> {
    let existing = store
        .find_by_name(name)?
        .into_iter()
        .find(|w| w.kind == WorkspaceKind::Global);
    Ok(match existing {
        Some(ws) => (ws.path, None),
        None => {
            let id = new_id();
            (store.global_workspace_dir(&id), Some(id))
        }
    })
}

/// Outcome of [`remove`].
#[derive(Clone, Debug)]
pub struct Removed {
    pub workspace: Workspace,
    /// True when a global workspace's directory was deleted.
    pub deleted_files: bool,
}

/// Stop tracking `workspace`. Only a global workspace's directory, which
/// lives inside the data dir, is deleted from disk.
pub fn remove(store: &Store, workspace: &Workspace) -> Result<Removed, NebiError> {
    let removed = store.delete(&workspace.id)?;
    let mut deleted_files = false;
    if removed.kind == WorkspaceKind::Global
        && removed.path.starts_with(store.normalize(store.data_dir()))
        && removed.path.exists()
    {
        std::fs::remove_dir_all(&removed.path)
            .map_err(|e| NebiError::io("failed to delete", &removed.path, e))?;
        deleted_files = true;
    }
    info!(id = %removed.id, name = %removed.name, deleted_files, "stopped tracking workspace");
    Ok(Removed {
        workspace: removed,
        deleted_files,
    })
}
