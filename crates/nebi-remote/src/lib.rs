//! Remote collaborators of the nebi client: the nebi server REST API and
//! public OCI registries.
//!
//! - [`ServerApi`] is the typed server surface; [`HttpServer`] implements it
//!   over blocking `reqwest`.
//! - [`wait_for_ready`] polls a freshly created workspace.
//! - [`OciClient`] pulls `pixi.toml`/`pixi.lock` layers anonymously.
//!
//! Every failure is a [`RemoteError`] carrying an [`ErrorKind`] and, when
//! a response arrived, its HTTP status.

pub mod api;
pub mod client;
pub mod error;
pub mod oci;
pub mod poll;
pub mod types;

pub use api::ServerApi;
pub use client::{DEFAULT_TIMEOUT, HttpServer};
pub use error::{ErrorKind, RemoteError};
pub use oci::{ArtifactSource, DEFAULT_OCI_TIMEOUT, OciArtifact, OciClient, OciReference};
pub use poll::{POLL_INTERVAL, READY_TIMEOUT, poll_until_ready, wait_for_ready};
pub use types::{
    NewRegistry, Owner, PublishDefaults, PublishRequest, PublishResponse, PushRequest,
    PushResponse, Registry, RemoteWorkspace, Tag, Version, VersionContent, WorkspaceStatus,
};
