//! Local state for nebi: tracked workspaces, origins, credentials, and the
//! content hashes every other component compares against.
//!
//! All hashing goes through [`hash`] so the sync engine, `status`, and the
//! test doubles agree byte-for-byte.

pub mod credentials;
pub mod error;
pub mod fsutil;
pub mod hash;
pub mod model;
pub mod paths;
pub mod store;

pub use credentials::{Credential, CredentialStore};
pub use error::{InvalidName, StoreError};
pub use hash::{content_hash, content_tag, hash_lock, hash_manifest, toml_content_hash};
pub use model::{
    Origin, SyncAction, Workspace, WorkspaceKind, normalize_server_url, validate_name,
};
pub use store::{NewWorkspace, Store, StoreState, new_id};
