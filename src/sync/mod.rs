//! The sync engine: push, pull, status, diff, and OCI import.
//!
//! Every command follows the same shape: resolve a reference, transfer
//! bytes, then update the local store. Store writes only happen after the
//! remote side succeeded, so a failed transfer never leaves a fresh origin.

pub mod diff;
pub mod import;
pub mod pull;
pub mod push;
pub mod status;

use std::path::Path;
use std::time::Duration;

use nebi_remote::{ErrorKind, POLL_INTERVAL, READY_TIMEOUT, RemoteError, RemoteWorkspace, ServerApi};
use nebi_store::{Origin, Store, Workspace, WorkspaceKind};

use crate::error::NebiError;
use crate::tracking::{self, Tracked};

pub use diff::{DiffArgs, DiffPlan, DiffSide, plan_diff, run_diff};
pub use import::{ImportOutcome, ImportReport, import, parse_oci_reference};
pub use pull::{PullOutcome, PullPlan, PullReport};
pub use push::{PushOutcome, PushPlan};
pub use status::{FileState, OriginStatus, RemoteState, StatusReport, status};

/// Timing knobs for commands that create server workspaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            ready_timeout: READY_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// The tracked entry at `dir` and its origin for `server_url`.
pub fn origin_of(
    store: &Store,
    dir: &Path,
    server_url: Option<&str>,
) -> Result<(Option<Tracked>, Option<Origin>), NebiError> {
    let tracked = tracking::lookup(store, dir)?;
    let origin = match (&tracked, server_url) {
        (Some(t), Some(url)) => t.workspace.origin_for(url).cloned(),
        _ => None,
    };
    Ok((tracked, origin))
}

/// Find `name` on the server; absence is a `not-found` error.
pub fn find_remote(server: &dyn ServerApi, name: &str) -> Result<RemoteWorkspace, NebiError> {
    server.find_workspace(name)?.ok_or_else(|| {
        NebiError::Remote(RemoteError::new(
            ErrorKind::NotFound,
            format!("workspace '{name}' not found on {}", server.server_url()),
        ))
    })
}

/// The version `tag` points at.
pub fn tag_version(
    server: &dyn ServerApi,
    workspace: &RemoteWorkspace,
    tag: &str,
) -> Result<u64, NebiError> {
    server
        .list_tags(&workspace.id)?
        .into_iter()
        .find(|t| t.tag == tag)
        .map(|t| t.version_number)
        .ok_or_else(|| {
            NebiError::Remote(RemoteError::new(
                ErrorKind::NotFound,
                format!("tag '{tag}' not found in workspace '{}'", workspace.name),
            ))
        })
}

/// Track `dir` if needed and store `origin` on its entry.
///
/// Returns the updated entry and whether it was created.
pub(crate) fn record_origin(
    store: &Store,
    dir: &Path,
    kind: WorkspaceKind,
    id: Option<String>,
    fallback_name: &str,
    origin: Origin,
) -> Result<(Workspace, bool), NebiError> {
    tracking::ensure_tracked_with(store, dir, kind, id, fallback_name, |entry| {
        entry.set_origin(origin);
    })
}

pub(crate) fn missing_name(dir: &Path, what: &str, example: &str) -> NebiError {
    NebiError::NoOrigin {
        what: what.to_owned(),
        path: dir.to_path_buf(),
        hint: format!("name the workspace explicitly, e.g. '{example}'"),
    }
}
