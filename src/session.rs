//! Per-invocation context: directories, store, credentials, config, and
//! the clients built from them.

use std::path::{Path, PathBuf};

use nebi_remote::{HttpServer, OciClient};
use nebi_store::{CredentialStore, Store, normalize_server_url, paths};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::NebiError;
use crate::sync::SyncOptions;

/// Overrides the configured server URL.
pub const SERVER_ENV: &str = "NEBI_SERVER";
/// Overrides the stored token for whichever server is in use.
pub const TOKEN_ENV: &str = "NEBI_TOKEN";

pub struct Session {
    pub cwd: PathBuf,
    pub store: Store,
    pub credentials: CredentialStore,
    pub config: ClientConfig,
    server_override: Option<String>,
    token_override: Option<String>,
}

impl Session {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self, NebiError> {
        let cwd = std::env::current_dir()
            .map_err(|e| NebiError::io("cannot read current directory", ".", e))?;
        let mut session = Self::open(&paths::data_dir()?, &paths::config_dir()?, &cwd)?;
        session.server_override = non_empty_env(SERVER_ENV);
        session.token_override = non_empty_env(TOKEN_ENV);
        Ok(session)
    }

    /// Build from explicit directories, ignoring the environment.
    pub fn open(data_dir: &Path, config_dir: &Path, cwd: &Path) -> Result<Self, NebiError> {
        let store = Store::open(data_dir, cwd)?;
        let config = ClientConfig::load(config_dir)?;
        debug!(data_dir = %data_dir.display(), config_dir = %config_dir.display(), "session opened");
        Ok(Self {
            cwd: cwd.to_path_buf(),
            store,
            credentials: CredentialStore::new(config_dir),
            config,
            server_override: None,
            token_override: None,
        })
    }

    /// The server in use, if any is configured.
    pub fn server_url(&self) -> Result<Option<String>, NebiError> {
        if let Some(url) = &self.server_override {
            return Ok(Some(normalize_server_url(url)));
        }
        Ok(self.store.server_url()?)
    }

    pub fn require_server_url(&self) -> Result<String, NebiError> {
        self.server_url()?.ok_or(NebiError::NoServer)
    }

    pub fn token_for(&self, server_url: &str) -> Result<Option<String>, NebiError> {
        if let Some(token) = &self.token_override {
            return Ok(Some(token.clone()));
        }
        Ok(self.credentials.get(server_url)?.map(|c| c.token))
    }

    /// An authenticated client for the configured server.
    pub fn connect(&self) -> Result<HttpServer, NebiError> {
        let server_url = self.require_server_url()?;
        self.try_connect_to(&server_url)?
            .ok_or(NebiError::NotLoggedIn { server: server_url })
    }

    /// A client for `server_url`, or `None` without credentials for it.
    pub fn try_connect_to(&self, server_url: &str) -> Result<Option<HttpServer>, NebiError> {
        let Some(token) = self.token_for(server_url)? else {
            return Ok(None);
        };
        Ok(Some(self.anonymous_client(server_url, Some(token))?))
    }

    pub fn anonymous_client(
        &self,
        server_url: &str,
        token: Option<String>,
    ) -> Result<HttpServer, NebiError> {
        Ok(HttpServer::new(
            server_url,
            token,
            self.config.server_timeout(),
        )?)
    }

    pub fn oci_client(&self) -> Result<OciClient, NebiError> {
        Ok(OciClient::new(self.config.oci_timeout())?)
    }

    #[must_use]
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            ready_timeout: self.config.ready_timeout(),
            poll_interval: self.config.poll_interval(),
        }
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
