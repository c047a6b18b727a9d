//! Data/config directory resolution and path normalization.

use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;

/// Overrides the data directory (store database, global workspaces).
pub const DATA_DIR_ENV: &str = "NEBI_DATA_DIR";
/// Overrides the config directory (`config.toml`, credentials).
pub const CONFIG_DIR_ENV: &str = "NEBI_CONFIG_DIR";

/// `$NEBI_DATA_DIR`, else `<platform data dir>/nebi`.
pub fn data_dir() -> Result<PathBuf, StoreError> {
    resolve_dir(DATA_DIR_ENV, dirs::data_dir(), "data")
}

/// `$NEBI_CONFIG_DIR`, else `<platform config dir>/nebi`.
pub fn config_dir() -> Result<PathBuf, StoreError> {
    resolve_dir(CONFIG_DIR_ENV, dirs::config_dir(), "config")
}

fn resolve_dir(
    env_var: &'static str,
    platform: Option<PathBuf>,
    kind: &'static str,
) -> Result<PathBuf, StoreError> {
    if let Some(dir) = std::env::var_os(env_var).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    platform
        .map(|p| p.join("nebi"))
        .ok_or(StoreError::NoPlatformDir { kind, env_var })
}

/// Expand a leading `~` to the home directory.
#[must_use]
pub fn expand_tilde(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

/// Absolute, symlink-resolved form of `path`.
///
/// Relative paths are joined onto `base`. When the path (or a suffix of it)
/// does not exist, the longest existing ancestor is resolved and the rest is
/// appended lexically, so removed directories still normalize the same way
/// they did when they were tracked.
#[must_use]
pub fn normalize_path(path: &Path, base: &Path) -> PathBuf {
    let expanded = expand_tilde(path);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    let lexical = lexical_clean(&absolute);

    let mut existing = lexical.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(resolved) = std::fs::canonicalize(existing) {
            let mut out = resolved;
            for part in missing.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}

/// Remove `.` and resolve `..` without touching the filesystem.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
