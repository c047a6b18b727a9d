//! The [`ServerApi`] trait: the boundary between the sync engine and the
//! nebi server.
//!
//! The trait is object-safe and `Send + Sync` so commands can hold a
//! `&dyn ServerApi` and fan out independent fetches on scoped threads.
//! [`HttpServer`](crate::HttpServer) is the production implementation; tests
//! substitute an in-memory double.

use crate::error::RemoteError;
use crate::types::{
    NewRegistry, PublishDefaults, PublishRequest, PublishResponse, PushRequest, PushResponse,
    Registry, RemoteWorkspace, Tag, Version, VersionContent,
};

pub trait ServerApi: Send + Sync {
    /// Normalized base URL of the server, used as the origin key.
    fn server_url(&self) -> &str;

    /// `GET /health`.
    fn health(&self) -> Result<(), RemoteError>;

    // -- workspaces ---------------------------------------------------------

    fn list_workspaces(&self) -> Result<Vec<RemoteWorkspace>, RemoteError>;

    fn get_workspace(&self, id: &str) -> Result<RemoteWorkspace, RemoteError>;

    /// Create a workspace. The server starts setup asynchronously, so the
    /// returned workspace is usually `pending`.
    fn create_workspace(&self, name: &str, manifest: &str)
    -> Result<RemoteWorkspace, RemoteError>;

    /// Request deletion. Completes asynchronously on the server.
    fn delete_workspace(&self, id: &str) -> Result<(), RemoteError>;

    /// Look a workspace up by name.
    fn find_workspace(&self, name: &str) -> Result<Option<RemoteWorkspace>, RemoteError> {
        Ok(self
            .list_workspaces()?
            .into_iter()
            .find(|ws| ws.name == name))
    }

    // -- versions & tags ----------------------------------------------------

    fn list_tags(&self, workspace_id: &str) -> Result<Vec<Tag>, RemoteError>;

    fn list_versions(&self, workspace_id: &str) -> Result<Vec<Version>, RemoteError>;

    /// Content of the version `tag` points at, resolved server-side.
    fn get_tag_content(&self, workspace_id: &str, tag: &str)
    -> Result<VersionContent, RemoteError>;

    fn get_version_content(
        &self,
        workspace_id: &str,
        version_number: u64,
    ) -> Result<VersionContent, RemoteError>;

    fn push_version(
        &self,
        workspace_id: &str,
        request: &PushRequest,
    ) -> Result<PushResponse, RemoteError>;

    // -- publishing ---------------------------------------------------------

    fn publish(
        &self,
        workspace_id: &str,
        request: &PublishRequest,
    ) -> Result<PublishResponse, RemoteError>;

    fn get_publish_defaults(&self, workspace_id: &str) -> Result<PublishDefaults, RemoteError>;

    fn list_registries(&self) -> Result<Vec<Registry>, RemoteError>;

    fn create_registry(&self, registry: &NewRegistry) -> Result<Registry, RemoteError>;

    fn delete_registry(&self, id: &str) -> Result<(), RemoteError>;
}
