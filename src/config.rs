//! Client configuration (`<config dir>/config.toml`).
//!
//! Every setting is optional; a missing file means all defaults.
//!
//! ```toml
//! [server]
//! timeout_secs = 30
//!
//! [oci]
//! timeout_secs = 10
//!
//! [sync]
//! ready_timeout_secs = 60
//! poll_interval_ms = 500
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// File name inside the config directory.
pub const CONFIG_FILE: &str = "config.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub oci: OciConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Settings for requests to the nebi server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Per-request timeout (default: 30).
    #[serde(default = "default_server_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_server_timeout(),
        }
    }
}

const fn default_server_timeout() -> u64 {
    30
}

/// Settings for anonymous OCI registry pulls.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OciConfig {
    /// Per-request timeout (default: 10).
    #[serde(default = "default_oci_timeout")]
    pub timeout_secs: u64,
}

impl Default for OciConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_oci_timeout(),
        }
    }
}

const fn default_oci_timeout() -> u64 {
    10
}

/// Readiness polling after the server creates a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: default_ready_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

const fn default_ready_timeout() -> u64 {
    60
}

const fn default_poll_interval() -> u64 {
    500
}

impl ClientConfig {
    #[must_use]
    pub const fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    #[must_use]
    pub const fn oci_timeout(&self) -> Duration {
        Duration::from_secs(self.oci.timeout_secs)
    }

    #[must_use]
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.ready_timeout_secs)
    }

    /// Never zero, so a misconfigured file cannot spin the poller.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync.poll_interval_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading `config.toml`.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "invalid config {}: {}", p.display(), self.message)
        } else {
            write!(f, "invalid config: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl ClientConfig {
    /// Load `config.toml` from `config_dir`. A missing file is all defaults.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path);
            e
        })
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
