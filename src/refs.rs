//! Command-line reference tokens.
//!
//! A token is either a filesystem path or a server reference
//! `[name][:tag]`. Path detection runs first, so `./demo:v1` is a path.

use std::fmt;
use std::path::{Path, PathBuf};

use nebi_store::paths::normalize_path;

/// A `name:tag` server reference. Either part may be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub tag: String,
}

impl Reference {
    #[must_use]
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        (!self.name.is_empty()).then_some(self.name.as_str())
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        (!self.tag.is_empty()).then_some(self.tag.as_str())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.name, self.tag)
        }
    }
}

/// Split on the last `:`. No colon means the whole token is the name.
#[must_use]
pub fn parse_ref(token: &str) -> Reference {
    match token.rsplit_once(':') {
        Some((name, tag)) => Reference::new(name, tag),
        None => Reference::new(token, ""),
    }
}

/// Path-like: `.`, `..`, a leading `~`, or any path separator.
///
/// Names may not contain separators, so this never swallows a valid name.
#[must_use]
pub fn is_path_like(token: &str) -> bool {
    token == "." || token == ".." || token.starts_with('~') || token.contains(['/', '\\'])
}

/// Expand `~` and make `token` an absolute, normalized path.
#[must_use]
pub fn resolve_path(token: &str, cwd: &Path) -> PathBuf {
    normalize_path(Path::new(token), cwd)
}

/// A classified command-line token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Path(PathBuf),
    Ref(Reference),
}

#[must_use]
pub fn classify(token: &str, cwd: &Path) -> Target {
    if is_path_like(token) {
        Target::Path(resolve_path(token, cwd))
    } else {
        Target::Ref(parse_ref(token))
    }
}
