//! `pull [name][:tag]`: materialize a server version into a directory.

use std::path::{Path, PathBuf};

use nebi_remote::{ErrorKind, RemoteError, ServerApi, Tag};
use nebi_store::hash::is_content_tag;
use nebi_store::{Origin, Store, SyncAction, Workspace, WorkspaceKind, validate_name};
use serde::Serialize;
use tracing::{info, instrument};

use super::push::stamped;
use super::{find_remote, missing_name, origin_of, record_origin, tag_version};
use crate::error::NebiError;
use crate::files::{self, WorkspaceFiles};
use crate::prompt::Confirm;
use crate::refs::parse_ref;
use crate::tracking;

/// A pull with its reference and target directory resolved.
#[derive(Clone, Debug)]
pub struct PullPlan {
    pub name: String,
    /// `None` pulls the newest version.
    pub tag: Option<String>,
    pub target: PathBuf,
    pub kind: WorkspaceKind,
    /// Pre-allocated id for a new global workspace.
    global_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PullReport {
    pub name: String,
    pub tag: String,
    pub version_number: u64,
    pub target: PathBuf,
    pub wrote_lock: bool,
    pub newly_tracked: bool,
    #[serde(skip)]
    pub workspace: Workspace,
}

#[derive(Clone, Debug)]
pub enum PullOutcome {
    /// The overwrite prompt was declined; nothing was written.
    Aborted,
    Pulled(PullReport),
}

impl PullPlan {
    /// Resolve the reference from `arg` or the origin of `cwd`.
    ///
    /// The target is `output` when given, the data-dir body of a global
    /// workspace when `global`, else `cwd`.
    pub fn resolve(
        store: &Store,
        cwd: &Path,
        server_url: Option<&str>,
        arg: Option<&str>,
        output: Option<&Path>,
        global: bool,
    ) -> Result<Self, NebiError> {
        let cwd = store.normalize(cwd);
        let reference = arg.map(parse_ref).unwrap_or_default();
        let (name, tag) = match reference.name() {
            Some(name) => (name.to_owned(), reference.tag().map(str::to_owned)),
            None => {
                let (_, origin) = origin_of(store, &cwd, server_url)?;
                let Some(origin) = origin else {
                    let example = format!("nebi pull <name>{}", arg.unwrap_or_default());
                    return Err(missing_name(&cwd, "workspace name is required", &example));
                };
                // A bare `pull` re-pulls the recorded tag.
                let tag = reference.tag().map_or(origin.tag, str::to_owned);
                (origin.name, Some(tag))
            }
        };
        validate_name(&name)?;

        let (target, kind, global_id) = if global {
            let (dir, id) = tracking::global_target(store, &name)?;
            (dir, WorkspaceKind::Global, id)
        } else {
            let dir = output.map_or_else(|| cwd.clone(), |o| store.normalize(o));
            (dir, WorkspaceKind::Local, None)
        };
        Ok(Self {
            name,
            tag,
            target,
            kind,
            global_id,
        })
    }

    #[instrument(skip_all, fields(workspace = %self.name, target = %self.target.display()))]
    pub fn execute(
        self,
        store: &Store,
        server: &dyn ServerApi,
        force: bool,
        confirm: &dyn Confirm,
    ) -> Result<PullOutcome, NebiError> {
        let remote = find_remote(server, &self.name)?;
        let (version_number, tag) = match &self.tag {
            Some(tag) => (tag_version(server, &remote, tag)?, tag.clone()),
            None => {
                let latest = server
                    .list_versions(&remote.id)?
                    .into_iter()
                    .map(|v| v.version_number)
                    .max()
                    .ok_or_else(|| {
                        NebiError::Remote(RemoteError::new(
                            ErrorKind::NotFound,
                            format!("workspace '{}' has no versions", self.name),
                        ))
                    })?;
                let tags = server.list_tags(&remote.id)?;
                (latest, primary_tag(&tags, latest))
            }
        };
        let content = server.get_version_content(&remote.id, version_number)?;

        if !force && files::has_manifest(&self.target) {
            let prompt = format!("Overwrite pixi.toml in {}?", self.target.display());
            if !confirm.confirm(&prompt) {
                info!("overwrite declined");
                return Ok(PullOutcome::Aborted);
            }
        }

        let written = WorkspaceFiles::new(content.manifest, content.lock);
        written.write(&self.target)?;

        let origin = Origin {
            server_url: server.server_url().to_owned(),
            name: self.name.clone(),
            tag: tag.clone(),
            action: SyncAction::Pull,
            manifest_hash: written.manifest_hash(),
            lock_hash: written.lock_hash(),
            version_number: Some(version_number),
            synced_at: 0,
        };
        let (workspace, newly_tracked) = record_origin(
            store,
            &self.target,
            self.kind,
            self.global_id,
            &self.name,
            stamped(origin),
        )?;
        info!(version = version_number, tag = %tag, "pulled");

        Ok(PullOutcome::Pulled(PullReport {
            name: self.name,
            tag,
            version_number,
            target: self.target,
            wrote_lock: written.lock.is_some(),
            newly_tracked,
            workspace,
        }))
    }
}

/// The tag to record for `version`: the most recently updated user tag,
/// else `latest`, else its content tag, else `latest`.
#[must_use]
pub fn primary_tag(tags: &[Tag], version: u64) -> String {
    let pointing: Vec<&Tag> = tags.iter().filter(|t| t.version_number == version).collect();
    if let Some(user) = pointing
        .iter()
        .filter(|t| t.tag != "latest" && !is_content_tag(&t.tag))
        .max_by_key(|t| t.updated_at.clone().or_else(|| t.created_at.clone()))
    {
        return user.tag.clone();
    }
    if pointing.iter().any(|t| t.tag == "latest") {
        return "latest".to_owned();
    }
    pointing
        .iter()
        .find(|t| is_content_tag(&t.tag))
        .map_or_else(|| "latest".to_owned(), |t| t.tag.clone())
}
