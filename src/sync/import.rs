//! `import <host/repo:tag>`: materialize a published artifact from a public
//! OCI registry. No nebi server or credentials are involved, so no origin
//! is recorded.

use std::path::{Path, PathBuf};

use nebi_remote::{ArtifactSource, OciReference};
use nebi_store::{Store, Workspace, WorkspaceKind};
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::NebiError;
use crate::files::{self, WorkspaceFiles};
use crate::prompt::Confirm;
use crate::tracking;

#[derive(Clone, Debug, Serialize)]
pub struct ImportReport {
    pub reference: String,
    pub target: PathBuf,
    pub wrote_lock: bool,
    pub newly_tracked: bool,
    #[serde(skip)]
    pub workspace: Workspace,
}

#[derive(Clone, Debug)]
pub enum ImportOutcome {
    Aborted,
    Imported(ImportReport),
}

/// Parse an OCI reference as typed by the user.
pub fn parse_oci_reference(input: &str) -> Result<OciReference, NebiError> {
    input.parse().map_err(|e: nebi_remote::RemoteError| NebiError::BadReference {
        input: input.to_owned(),
        reason: e.message,
    })
}

/// Fetch `reference` and write it into `output` (default: `cwd`).
#[instrument(skip_all, fields(reference = %reference))]
pub fn import(
    store: &Store,
    cwd: &Path,
    source: &dyn ArtifactSource,
    reference: &OciReference,
    output: Option<&Path>,
    force: bool,
    confirm: &dyn Confirm,
) -> Result<ImportOutcome, NebiError> {
    let target = store.normalize(output.unwrap_or(cwd));

    let artifact = source
        .fetch_artifact(reference)
        .map_err(|source| NebiError::OciFetch {
            reference: reference.to_string(),
            source,
        })?;

    if !force && files::has_manifest(&target) {
        let prompt = format!("Overwrite pixi.toml in {}?", target.display());
        if !confirm.confirm(&prompt) {
            info!("overwrite declined");
            return Ok(ImportOutcome::Aborted);
        }
    }

    let written = WorkspaceFiles::new(artifact.manifest, artifact.lock);
    written.write(&target)?;

    let fallback = tracking::default_name(&target, Some(&written.manifest));
    let (workspace, newly_tracked) =
        tracking::ensure_tracked(store, &target, WorkspaceKind::Local, None, &fallback)?;
    info!(target = %target.display(), newly_tracked, "imported");

    Ok(ImportOutcome::Imported(ImportReport {
        reference: reference.to_string(),
        target,
        wrote_lock: written.lock.is_some(),
        newly_tracked,
        workspace,
    }))
}
