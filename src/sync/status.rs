//! `status`: drift between the local files, the origin recorded at the
//! last sync, and the server's current content for the origin's tag.
//!
//! Server problems are folded into the report; only local failures
//! (untracked directory, unreadable store) are errors.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use nebi_remote::{ErrorKind, RemoteError, ServerApi};
use nebi_store::{Origin, Store, WorkspaceKind, hash_lock, hash_manifest};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::NebiError;
use crate::files::{self, MANIFEST_FILE};
use crate::tracking::{self, NameSync};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileState {
    Unchanged,
    Modified,
    /// Recorded at the last sync but gone locally.
    Missing,
    /// Present locally but not part of the last sync.
    Untracked,
    /// Neither recorded nor present.
    Absent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RemoteState {
    InSync,
    Changed,
    NotChecked { reason: String },
    Unreachable { message: String },
    NotFound { message: String },
    Error { message: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct OriginStatus {
    pub origin: Origin,
    pub manifest: FileState,
    pub lock: FileState,
    pub remote: RemoteState,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    pub id: String,
    pub name: String,
    pub kind: WorkspaceKind,
    pub path: PathBuf,
    pub server_url: Option<String>,
    pub name_sync: NameSync,
    /// The origin for the configured server.
    pub origin: Option<OriginStatus>,
    /// Origins recorded against other servers.
    pub other_origins: Vec<Origin>,
}

impl StatusReport {
    /// Any local modification, or server-side change since the last sync.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        self.origin.as_ref().is_some_and(|o| {
            o.manifest != FileState::Unchanged
                || !matches!(o.lock, FileState::Unchanged | FileState::Absent)
                || o.remote == RemoteState::Changed
        })
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Workspace: {}", self.name);
        let _ = writeln!(out, "Type:      {}", self.kind);
        let _ = writeln!(out, "Path:      {}", self.path.display());
        let _ = writeln!(
            out,
            "Server:    {}",
            self.server_url.as_deref().unwrap_or("(not configured)")
        );

        match &self.origin {
            None => {
                let _ = writeln!(out, "Origin: none for this server (push or pull to set one)");
            }
            Some(status) => {
                let o = &status.origin;
                let _ = writeln!(out, "Origin: {} ({})", o.reference(), o.action);
                let _ = writeln!(out, "  {}", file_line(MANIFEST_FILE, status.manifest));
                if status.lock != FileState::Absent {
                    let _ = writeln!(out, "  {}", file_line(files::LOCK_FILE, status.lock));
                }
                let _ = writeln!(out, "  {}", remote_line(o, &status.remote));
            }
        }

        if !self.other_origins.is_empty() {
            let _ = writeln!(out, "Other servers:");
            for o in &self.other_origins {
                let _ = writeln!(out, "  {}: {} ({})", o.server_url, o.reference(), o.action);
            }
        }
        out
    }
}

fn file_line(file: &str, state: FileState) -> String {
    match state {
        FileState::Unchanged => format!("{file} unchanged locally"),
        FileState::Modified => format!("{file} modified locally"),
        FileState::Missing => format!("{file} missing locally"),
        FileState::Untracked => format!("{file} not part of the last sync"),
        FileState::Absent => format!("{file} absent"),
    }
}

fn remote_line(origin: &Origin, remote: &RemoteState) -> String {
    let reference = origin.reference();
    match remote {
        RemoteState::InSync => format!("In sync with {reference}"),
        RemoteState::Changed => format!("{reference} has changed on server since last sync"),
        RemoteState::NotChecked { reason } => format!("Server not checked: {reason}"),
        RemoteState::Unreachable { message } => format!("Server not reachable: {message}"),
        RemoteState::NotFound { message } | RemoteState::Error { message } => message.clone(),
    }
}

/// Status of the workspace tracked at `dir`.
///
/// `server` is the authenticated client for `server_url`, `None` when the
/// user is not logged in.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn status(
    store: &Store,
    dir: &Path,
    server_url: Option<&str>,
    server: Option<&dyn ServerApi>,
) -> Result<StatusReport, NebiError> {
    let tracked = tracking::require(store, dir)?;
    let workspace = tracked.workspace;

    let origin = server_url.and_then(|url| workspace.origin_for(url).cloned());
    let other_origins = workspace
        .origins
        .values()
        .filter(|o| Some(o.server_url.as_str()) != origin.as_ref().map(|c| c.server_url.as_str()))
        .cloned()
        .collect();

    let origin = match origin {
        None => None,
        Some(origin) => {
            let (manifest, lock) = local_state(&workspace.path, &origin)?;
            let remote = match server {
                Some(server) => remote_state(server, &origin),
                None => RemoteState::NotChecked {
                    reason: "not logged in".to_owned(),
                },
            };
            Some(OriginStatus {
                origin,
                manifest,
                lock,
                remote,
            })
        }
    };

    Ok(StatusReport {
        id: workspace.id,
        name: workspace.name,
        kind: workspace.kind,
        path: workspace.path,
        server_url: server_url.map(str::to_owned),
        name_sync: tracked.name_sync,
        origin,
        other_origins,
    })
}

fn local_state(dir: &Path, origin: &Origin) -> Result<(FileState, FileState), NebiError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest = match std::fs::read(&manifest_path) {
        Ok(bytes) if hash_manifest(&bytes) == origin.manifest_hash => FileState::Unchanged,
        Ok(_) => FileState::Modified,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileState::Missing,
        Err(e) => return Err(NebiError::io("failed to read", manifest_path, e)),
    };
    let local_lock = files::read_lock(dir)?;
    let lock = match (&origin.lock_hash, local_lock) {
        (Some(recorded), Some(text)) if hash_lock(text.as_bytes()) == *recorded => {
            FileState::Unchanged
        }
        (Some(_), Some(_)) => FileState::Modified,
        (Some(_), None) => FileState::Missing,
        (None, Some(_)) => FileState::Untracked,
        (None, None) => FileState::Absent,
    };
    Ok((manifest, lock))
}

fn remote_state(server: &dyn ServerApi, origin: &Origin) -> RemoteState {
    let remote = match server.find_workspace(&origin.name) {
        Ok(Some(ws)) => ws,
        Ok(None) => {
            return RemoteState::NotFound {
                message: format!("Workspace '{}' not found on server", origin.name),
            };
        }
        Err(e) => return classify(&e),
    };
    match server.get_tag_content(&remote.id, &origin.tag) {
        Ok(content) => {
            if hash_manifest(content.manifest.as_bytes()) == origin.manifest_hash {
                RemoteState::InSync
            } else {
                RemoteState::Changed
            }
        }
        Err(e) if e.is(ErrorKind::NotFound) => RemoteState::NotFound {
            message: format!("Tag '{}' not found on server", origin.reference()),
        },
        Err(e) => classify(&e),
    }
}

fn classify(err: &RemoteError) -> RemoteState {
    debug!(kind = %err.kind, error = %err.message, "status check failed");
    match err.kind {
        ErrorKind::Unreachable | ErrorKind::Timeout => RemoteState::Unreachable {
            message: err.message.clone(),
        },
        ErrorKind::Unauthenticated => RemoteState::NotChecked {
            reason: "token rejected, run 'nebi login'".to_owned(),
        },
        _ => RemoteState::Error {
            message: format!("Server error: {}", err.message),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebi_store::SyncAction;
    use tempfile::tempdir;

    fn origin(manifest: &str, lock: Option<&str>) -> Origin {
        Origin {
            server_url: "https://s".into(),
            name: "demo".into(),
            tag: "v1".into(),
            action: SyncAction::Push,
            manifest_hash: hash_manifest(manifest.as_bytes()),
            lock_hash: lock.map(|l| hash_lock(l.as_bytes())),
            version_number: Some(1),
            synced_at: 0,
        }
    }

    #[test]
    fn local_state_tracks_both_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "x = 1\n").unwrap();
        std::fs::write(dir.path().join(files::LOCK_FILE), "lock").unwrap();

        let o = origin("x   =   1\n", Some("lock"));
        assert_eq!(
            local_state(dir.path(), &o).unwrap(),
            (FileState::Unchanged, FileState::Unchanged)
        );

        std::fs::write(dir.path().join(MANIFEST_FILE), "x = 2\n").unwrap();
        std::fs::remove_file(dir.path().join(files::LOCK_FILE)).unwrap();
        assert_eq!(
            local_state(dir.path(), &o).unwrap(),
            (FileState::Modified, FileState::Missing)
        );

        let no_lock = origin("x = 2\n", None);
        std::fs::write(dir.path().join(files::LOCK_FILE), "new").unwrap();
        assert_eq!(
            local_state(dir.path(), &no_lock).unwrap(),
            (FileState::Unchanged, FileState::Untracked)
        );
    }

    #[test]
    fn classify_maps_transport_errors_to_unreachable() {
        let err = RemoteError::new(ErrorKind::Unreachable, "connection refused");
        assert!(matches!(classify(&err), RemoteState::Unreachable { .. }));
        let err = RemoteError::from_status(500, "boom");
        assert!(matches!(classify(&err), RemoteState::Error { .. }));
    }

    #[test]
    fn render_mentions_origin_and_drift() {
        let report = StatusReport {
            id: "abc".into(),
            name: "demo".into(),
            kind: WorkspaceKind::Local,
            path: PathBuf::from("/w/demo"),
            server_url: Some("https://s".into()),
            name_sync: NameSync::Unchanged,
            origin: Some(OriginStatus {
                origin: origin("x = 1\n", None),
                manifest: FileState::Modified,
                lock: FileState::Absent,
                remote: RemoteState::InSync,
            }),
            other_origins: Vec::new(),
        };
        let text = report.render();
        assert!(text.contains("Origin: demo:v1 (push)"));
        assert!(text.contains("pixi.toml modified locally"));
        assert!(text.contains("In sync with demo:v1"));
        assert!(!text.contains("pixi.lock"));
        assert!(report.has_drift());
    }
}
