//! Per-server bearer tokens in `credentials.json` (mode 0600).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::fsutil::{self, FileLock, SECRET_FILE_MODE};
use crate::model::normalize_server_url;

const CREDENTIALS_FILE: &str = "credentials.json";

/// A stored login for one server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    servers: BTreeMap<String, Credential>,
}

/// Reads and writes the credentials file under the config dir.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl CredentialStore {
    #[must_use]
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(CREDENTIALS_FILE),
            lock_path: config_dir.join(format!("{CREDENTIALS_FILE}.lock")),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The credential for `server_url`, if one was stored.
    pub fn get(&self, server_url: &str) -> Result<Option<Credential>, StoreError> {
        let file = self.read()?;
        Ok(file.servers.get(&normalize_server_url(server_url)).cloned())
    }

    pub fn set(&self, server_url: &str, credential: Credential) -> Result<(), StoreError> {
        let _lock = FileLock::acquire(&self.lock_path)?;
        let mut file = self.read()?;
        file.servers
            .insert(normalize_server_url(server_url), credential);
        self.write(&file)
    }

    /// Forget `server_url`. Returns whether anything was removed.
    pub fn remove(&self, server_url: &str) -> Result<bool, StoreError> {
        let _lock = FileLock::acquire(&self.lock_path)?;
        let mut file = self.read()?;
        let removed = file
            .servers
            .remove(&normalize_server_url(server_url))
            .is_some();
        if removed {
            self.write(&file)?;
        }
        Ok(removed)
    }

    fn read(&self) -> Result<CredentialFile, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CredentialFile::default()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    fn write(&self, file: &CredentialFile) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(file).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        fsutil::write_atomic(&self.path, &json, SECRET_FILE_MODE)
    }
}
