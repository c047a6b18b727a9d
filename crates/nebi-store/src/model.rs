//! Tracked workspace and origin records.
//!
//! These are the types persisted in `nebi.db`. Every field added after the
//! first schema carries `#[serde(default)]` so older databases keep loading.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::InvalidName;

// ---------------------------------------------------------------------------
// WorkspaceKind
// ---------------------------------------------------------------------------

/// Who owns the directory of a tracked workspace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceKind {
    /// A directory the user manages.
    #[default]
    Local,
    /// A directory nebi manages under its data dir.
    Global,
}

impl fmt::Display for WorkspaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Global => write!(f, "global"),
        }
    }
}

// ---------------------------------------------------------------------------
// Origin
// ---------------------------------------------------------------------------

/// The transfer that produced an origin record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Push,
    Pull,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// Last successful push or pull of a directory against one server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Normalized server URL this record belongs to.
    pub server_url: String,
    /// Remote workspace name.
    pub name: String,
    /// Tag used for the transfer (the content tag when none was given).
    pub tag: String,
    pub action: SyncAction,
    /// Canonical manifest hash at sync time.
    pub manifest_hash: String,
    /// Raw lock hash at sync time; `None` when no lock was transferred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_hash: Option<String>,
    /// Server-side version number, when the server reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_number: Option<u64>,
    /// Unix seconds.
    #[serde(default)]
    pub synced_at: u64,
}

impl Origin {
    /// `name:tag` as the user would type it.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// A tracked directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Opaque, assigned on creation, never reused.
    pub id: String,
    /// Display name. Not unique across the store.
    pub name: String,
    /// Absolute, symlink-resolved directory. Unique across the store.
    pub path: PathBuf,
    #[serde(default)]
    pub kind: WorkspaceKind,
    /// Origins keyed by normalized server URL.
    #[serde(default)]
    pub origins: BTreeMap<String, Origin>,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: u64,
}

impl Workspace {
    /// The origin recorded against `server_url`, if any.
    #[must_use]
    pub fn origin_for(&self, server_url: &str) -> Option<&Origin> {
        self.origins.get(&normalize_server_url(server_url))
    }

    /// Insert or overwrite the origin for the record's server.
    pub fn set_origin(&mut self, mut origin: Origin) {
        origin.server_url = normalize_server_url(&origin.server_url);
        self.origins.insert(origin.server_url.clone(), origin);
    }
}

// ---------------------------------------------------------------------------
// Validation & normalization
// ---------------------------------------------------------------------------

/// Check a workspace name against the naming rules.
///
/// Names must be non-empty, must not be `.` or `..`, and must not contain
/// `/`, `\` or `:` (the reference separator).
pub fn validate_name(name: &str) -> Result<(), InvalidName> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if name == "." || name == ".." {
        Some("name must not be '.' or '..'")
    } else if name.contains('/') || name.contains('\\') {
        Some("name must not contain path separators")
    } else if name.contains(':') {
        Some("name must not contain ':' (it separates name and tag)")
    } else if name.chars().any(char::is_control) {
        Some("name must not contain control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(InvalidName {
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Normalize a server URL for use as a map key.
///
/// Trims whitespace, lowercases the scheme and strips trailing slashes.
#[must_use]
pub fn normalize_server_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    match trimmed.split_once("://") {
        Some((scheme, rest)) => format!("{}://{rest}", scheme.to_ascii_lowercase()),
        None => trimmed.to_owned(),
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
