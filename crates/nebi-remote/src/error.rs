//! Error type for server and registry calls.

use std::fmt;

use thiserror::Error;

/// Classification of a failed remote call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// HTTP 401.
    Unauthenticated,
    /// HTTP 403.
    Forbidden,
    /// HTTP 404.
    NotFound,
    /// HTTP 409.
    Conflict,
    /// HTTP 5xx.
    Server,
    /// Transport failure: DNS, connect, TLS, reset.
    Unreachable,
    /// A deadline passed (request timeout or `wait_for_ready`).
    Timeout,
    /// The server reported the workspace setup as failed.
    SetupFailed,
    /// Any other HTTP status, or a response body that did not decode.
    Protocol,
    /// The registry returned something that is not a usable pixi artifact.
    Oci,
}

impl ErrorKind {
    /// Map an HTTP status code onto a kind.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthenticated,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            408 => Self::Timeout,
            500..=599 => Self::Server,
            _ => Self::Protocol,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::Server => "server",
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::SetupFailed => "setup-failed",
            Self::Protocol => "protocol",
            Self::Oci => "oci",
        };
        f.write_str(s)
    }
}

/// A failed call against the nebi server or an OCI registry.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
}

impl RemoteError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Build from an HTTP status and the server's error text.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::from_status(status),
            message: message.into(),
            status: Some(status),
        }
    }

    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub(crate) fn transport(context: &str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_decode() {
            ErrorKind::Protocol
        } else {
            ErrorKind::Unreachable
        };
        Self::new(kind, format!("{context}: {err}"))
    }
}
