//! User-facing error type for nebi commands.
//!
//! Defines [`NebiError`]. Each variant states what went wrong and, where a
//! fix exists, ends with a `To fix:` line naming the command to run. Errors
//! from the store and the remote layer are wrapped rather than flattened so
//! callers can still match on the underlying kind.

use std::path::PathBuf;

use nebi_remote::{ErrorKind, RemoteError};
use nebi_store::{InvalidName, StoreError};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum NebiError {
    /// The directory is not in the local store.
    #[error("Not a tracked workspace: {}\n  To fix: run 'nebi init' in that directory", path.display())]
    NotTracked { path: PathBuf },

    /// A command needed an origin to fill in a missing part of a reference.
    #[error("{what}: no origin set for {}\n  To fix: {hint}", path.display())]
    NoOrigin {
        what: String,
        path: PathBuf,
        hint: String,
    },

    #[error("{0}\n  To fix: pick a name without '/', '\\' or ':'")]
    InvalidName(#[from] InvalidName),

    #[error("no pixi.toml in {}\n  To fix: run 'pixi init' there first", dir.display())]
    MissingManifest { dir: PathBuf },

    #[error("invalid reference '{input}': {reason}")]
    BadReference { input: String, reason: String },

    #[error("no tracked workspace named '{0}'\n  To fix: check 'nebi workspace list'")]
    UnknownWorkspace(String),

    #[error(
        "'{name}' matches {} tracked directories:\n{}\n  To fix: pass the directory path instead of the name",
        paths.len(),
        paths.iter().map(|p| format!("    {}", p.display())).collect::<Vec<_>>().join("\n")
    )]
    AmbiguousName { name: String, paths: Vec<PathBuf> },

    #[error("no server configured\n  To fix: nebi login <server-url>")]
    NoServer,

    #[error("not logged in to {server}\n  To fix: nebi login {server}")]
    NotLoggedIn { server: String },

    /// A remote call failed; the message depends on the kind.
    #[error("{}", describe_remote(.0))]
    Remote(RemoteError),

    #[error("failed to import {reference}: {}", .source.message)]
    OciFetch {
        reference: String,
        source: RemoteError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{context} {}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RemoteError> for NebiError {
    fn from(err: RemoteError) -> Self {
        Self::Remote(err)
    }
}

impl NebiError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// The remote error kind, if this wraps one.
    #[must_use]
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Remote(e) | Self::OciFetch { source: e, .. } => Some(e.kind),
            _ => None,
        }
    }
}

fn describe_remote(err: &RemoteError) -> String {
    match err.kind {
        ErrorKind::Unauthenticated => format!(
            "not logged in (the server rejected the token): {}\n  To fix: nebi login <server-url>",
            err.message
        ),
        ErrorKind::Forbidden => format!("forbidden: {}", err.message),
        ErrorKind::NotFound => format!("not found: {}", err.message),
        ErrorKind::Conflict => format!(
            "conflict: {}\n  To fix: re-run with --force to move the tag, or push under a new tag",
            err.message
        ),
        ErrorKind::Server => format!("server error: {}", err.message),
        ErrorKind::Unreachable => format!("server not reachable: {}", err.message),
        ErrorKind::Timeout => format!(
            "timed out: {}\n  The workspace may still finish setting up on the server",
            err.message
        ),
        ErrorKind::SetupFailed | ErrorKind::Protocol | ErrorKind::Oci => err.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_suggests_force() {
        let err = NebiError::from(RemoteError::from_status(409, "tag 'v1' exists"));
        let msg = err.to_string();
        assert!(msg.starts_with("conflict: tag 'v1' exists"));
        assert!(msg.contains("--force"));
        assert_eq!(err.remote_kind(), Some(ErrorKind::Conflict));
    }

    #[test]
    fn unauthenticated_suggests_login() {
        let err = NebiError::from(RemoteError::from_status(401, "bad token"));
        assert!(err.to_string().contains("nebi login"));
    }

    #[test]
    fn ambiguous_name_lists_paths() {
        let err = NebiError::AmbiguousName {
            name: "demo".into(),
            paths: vec![PathBuf::from("/a/demo"), PathBuf::from("/b/demo")],
        };
        let msg = err.to_string();
        assert!(msg.contains("matches 2 tracked directories"));
        assert!(msg.contains("/a/demo"));
        assert!(msg.contains("/b/demo"));
    }

    #[test]
    fn invalid_name_quotes_input() {
        let err = NebiError::from(nebi_store::validate_name("a/b").unwrap_err());
        assert!(err.to_string().contains("'a/b'"));
    }
}
