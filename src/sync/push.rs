//! `push [name][:tag]`: upload the directory's files as a new (or
//! deduplicated) server version.

use std::path::{Path, PathBuf};

use nebi_remote::{PushRequest, ServerApi, wait_for_ready};
use nebi_store::hash::is_content_tag;
use nebi_store::{Origin, Store, SyncAction, Workspace, WorkspaceKind, content_tag, validate_name};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{SyncOptions, missing_name, origin_of, record_origin};
use crate::error::NebiError;
use crate::files::WorkspaceFiles;
use crate::refs::parse_ref;

/// A push with its name resolved and files read, before any network call.
#[derive(Clone, Debug)]
pub struct PushPlan {
    pub dir: PathBuf,
    pub name: String,
    /// User tag; `None` pushes under the content tag only.
    pub tag: Option<String>,
    pub files: WorkspaceFiles,
    /// Set when the manifest name could not be adopted.
    pub name_warning: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PushOutcome {
    pub name: String,
    /// Tag recorded in the origin.
    pub tag: String,
    pub version_number: u64,
    pub tags: Vec<String>,
    pub content_hash: String,
    pub deduplicated: bool,
    /// The server workspace was created by this push.
    pub created_remote: bool,
    /// The directory was not tracked before this push.
    pub newly_tracked: bool,
    pub lock_missing: bool,
    #[serde(skip)]
    pub workspace: Workspace,
}

impl PushPlan {
    /// Resolve the name from `arg` or the directory's origin for
    /// `server_url`, validate it, and read the files.
    pub fn resolve(
        store: &Store,
        dir: &Path,
        server_url: Option<&str>,
        arg: Option<&str>,
    ) -> Result<Self, NebiError> {
        let dir = store.normalize(dir);
        let reference = arg.map(parse_ref).unwrap_or_default();
        let (tracked, origin) = origin_of(store, &dir, server_url)?;
        let name_warning = tracked.as_ref().and_then(|t| t.name_sync.warning());

        let name = match (reference.name(), &origin) {
            (Some(name), _) => name.to_owned(),
            (None, Some(origin)) => origin.name.clone(),
            (None, None) => {
                let example = format!("nebi push <name>{}", arg.unwrap_or_default());
                return Err(missing_name(&dir, "workspace name is required", &example));
            }
        };
        validate_name(&name)?;
        let files = WorkspaceFiles::read(&dir)?;
        Ok(Self {
            dir,
            name,
            tag: reference.tag().map(str::to_owned),
            files,
            name_warning,
        })
    }

    #[instrument(skip_all, fields(workspace = %self.name, tag = self.tag.as_deref().unwrap_or("")))]
    pub fn execute(
        self,
        store: &Store,
        server: &dyn ServerApi,
        force: bool,
        options: SyncOptions,
    ) -> Result<PushOutcome, NebiError> {
        if self.files.lock.is_none() {
            warn!(dir = %self.dir.display(), "pushing without pixi.lock");
        }

        let (remote, created_remote) = match server.find_workspace(&self.name)? {
            Some(ws) => (ws, false),
            None => {
                info!("creating workspace on server");
                let created = server.create_workspace(&self.name, &self.files.manifest)?;
                let ready = wait_for_ready(
                    server,
                    &created.id,
                    options.ready_timeout,
                    options.poll_interval,
                )?;
                (ready, true)
            }
        };

        let request = PushRequest {
            tag: self.tag.clone().unwrap_or_default(),
            pixi_toml: self.files.manifest.clone(),
            pixi_lock: self.files.lock.clone(),
            force,
        };
        let response = server.push_version(&remote.id, &request)?;
        info!(
            version = response.version_number,
            deduplicated = response.deduplicated,
            "pushed"
        );

        let manifest_hash = self.files.manifest_hash();
        let tag = match &self.tag {
            Some(tag) => tag.clone(),
            None => response
                .tags
                .iter()
                .find(|t| is_content_tag(t))
                .cloned()
                .unwrap_or_else(|| {
                    if response.content_hash.is_empty() {
                        content_tag(&manifest_hash)
                    } else {
                        content_tag(&response.content_hash)
                    }
                }),
        };

        let origin = Origin {
            server_url: server.server_url().to_owned(),
            name: self.name.clone(),
            tag: tag.clone(),
            action: SyncAction::Push,
            manifest_hash,
            lock_hash: self.files.lock_hash(),
            version_number: Some(response.version_number),
            synced_at: 0,
        };
        let (workspace, newly_tracked) = record_origin(
            store,
            &self.dir,
            WorkspaceKind::Local,
            None,
            &self.name,
            stamped(origin),
        )?;

        Ok(PushOutcome {
            name: self.name,
            tag,
            version_number: response.version_number,
            tags: response.tags,
            content_hash: response.content_hash,
            deduplicated: response.deduplicated,
            created_remote,
            newly_tracked,
            lock_missing: self.files.lock.is_none(),
            workspace,
        })
    }
}

/// Fill in the sync time.
pub(crate) fn stamped(mut origin: Origin) -> Origin {
    origin.synced_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    origin
}
