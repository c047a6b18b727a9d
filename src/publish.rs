//! `publish [name]`: ask the server to copy a workspace into an OCI
//! registry.
//!
//! The server proposes the registry, repository and next `v<N>` tag; flags
//! override any of them. The tag counter is never computed locally.

use std::path::Path;

use nebi_remote::{PublishRequest, Registry, ServerApi};
use nebi_store::{Store, validate_name};
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::NebiError;
use crate::sync::{find_remote, missing_name, origin_of};

/// Flag overrides.
#[derive(Clone, Debug, Default)]
pub struct PublishOverrides {
    /// Registry name or id.
    pub registry: Option<String>,
    pub repository: Option<String>,
    pub tag: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub workspace: String,
    pub registry_id: String,
    pub registry_name: String,
    pub repository: String,
    pub tag: String,
    pub digest: String,
}

/// The workspace to publish: `arg`, else the name from `cwd`'s origin.
pub fn resolve_name(
    store: &Store,
    cwd: &Path,
    server_url: Option<&str>,
    arg: Option<&str>,
) -> Result<String, NebiError> {
    let name = match arg.filter(|a| !a.is_empty()) {
        Some(name) => name.to_owned(),
        None => {
            let dir = store.normalize(cwd);
            let (_, origin) = origin_of(store, &dir, server_url)?;
            origin
                .map(|o| o.name)
                .ok_or_else(|| missing_name(&dir, "workspace name is required", "nebi publish <name>"))?
        }
    };
    validate_name(&name)?;
    Ok(name)
}

#[instrument(skip_all, fields(workspace = name))]
pub fn publish(
    server: &dyn ServerApi,
    name: &str,
    overrides: &PublishOverrides,
) -> Result<PublishOutcome, NebiError> {
    let remote = find_remote(server, name)?;
    let defaults = server.get_publish_defaults(&remote.id)?;

    let (registry_id, registry_name) = match &overrides.registry {
        Some(wanted) => {
            let registries = server.list_registries()?;
            let registry = find_registry(&registries, wanted)?;
            (registry.id.clone(), registry.name.clone())
        }
        None => (defaults.registry_id, defaults.registry_name),
    };
    let request = PublishRequest {
        registry_id: registry_id.clone(),
        repository: overrides.repository.clone().unwrap_or(defaults.repository),
        tag: overrides.tag.clone().unwrap_or(defaults.tag),
    };
    let response = server.publish(&remote.id, &request)?;
    info!(repository = %response.repository, tag = %response.tag, "published");

    Ok(PublishOutcome {
        workspace: name.to_owned(),
        registry_id,
        registry_name,
        repository: response.repository,
        tag: response.tag,
        digest: response.digest,
    })
}

/// Match a registry by exact name first, then by id.
pub fn find_registry<'a>(registries: &'a [Registry], wanted: &str) -> Result<&'a Registry, NebiError> {
    registries
        .iter()
        .find(|r| r.name == wanted)
        .or_else(|| registries.iter().find(|r| r.id == wanted))
        .ok_or_else(|| {
            let known: Vec<&str> = registries.iter().map(|r| r.name.as_str()).collect();
            NebiError::BadReference {
                input: wanted.to_owned(),
                reason: if known.is_empty() {
                    "no registries are configured on the server".to_owned()
                } else {
                    format!("unknown registry (known: {})", known.join(", "))
                },
            }
        })
}
