//! Error types for the local store.
//!
//! [`StoreError`] is returned by every [`Store`](crate::Store) and
//! [`CredentialStore`](crate::CredentialStore) operation. Variants carry the
//! path or identifier involved so callers can report them without parsing
//! messages.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by local store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("I/O error at {}", path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The database or credentials file exists but could not be decoded.
    #[error(
        "{} is corrupt: {message}\n  To fix: move the file aside and re-run the command to start fresh",
        path.display()
    )]
    Corrupt {
        /// The file that failed to decode.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// A workspace is already tracked at this path.
    #[error("{} is already tracked as workspace '{name}'", path.display())]
    AlreadyTracked {
        /// Normalized directory path.
        path: PathBuf,
        /// Name of the existing entry.
        name: String,
    },

    /// No workspace with this id exists in the store.
    #[error("no tracked workspace with id '{0}'")]
    UnknownId(String),

    /// The platform directory could not be determined and no override was set.
    #[error("could not determine the user {kind} directory\n  To fix: set {env_var} to an absolute path")]
    NoPlatformDir {
        /// `"data"` or `"config"`.
        kind: &'static str,
        /// The environment variable that overrides it.
        env_var: &'static str,
    },

    /// A workspace name failed validation.
    #[error(transparent)]
    InvalidName(#[from] InvalidName),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A workspace name that violates the naming rules.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid workspace name '{name}': {reason}")]
pub struct InvalidName {
    /// The rejected input, verbatim.
    pub name: String,
    /// Which rule it broke.
    pub reason: &'static str,
}
