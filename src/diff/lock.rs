//! Package-level summary of two `pixi.lock` files.
//!
//! Only the top-level `packages:` list is read. A package that appears for
//! several platforms collapses into one entry whose versions are the sorted
//! distinct versions seen.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use serde_yaml::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Conda,
    Pypi,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conda => write!(f, "conda"),
            Self::Pypi => write!(f, "pypi"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Package {
    pub kind: PackageKind,
    pub name: String,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VersionChange {
    pub kind: PackageKind,
    pub name: String,
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LockSummary {
    pub added: Vec<Package>,
    pub removed: Vec<Package>,
    pub changed: Vec<VersionChange>,
}

impl LockSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

type PackageIndex = BTreeMap<(PackageKind, String), BTreeSet<String>>;

/// Compare two locks. A missing side counts as an empty lock.
pub fn summarize_locks(old: Option<&str>, new: Option<&str>) -> Result<LockSummary, String> {
    let old = old.map(index_packages).transpose()?.unwrap_or_default();
    let new = new.map(index_packages).transpose()?.unwrap_or_default();

    let mut summary = LockSummary::default();
    for ((kind, name), versions) in &new {
        match old.get(&(*kind, name.clone())) {
            None => summary.added.push(Package {
                kind: *kind,
                name: name.clone(),
                version: join(versions),
            }),
            Some(before) if before != versions => summary.changed.push(VersionChange {
                kind: *kind,
                name: name.clone(),
                from: join(before),
                to: join(versions),
            }),
            Some(_) => {}
        }
    }
    for ((kind, name), versions) in &old {
        if !new.contains_key(&(*kind, name.clone())) {
            summary.removed.push(Package {
                kind: *kind,
                name: name.clone(),
                version: join(versions),
            });
        }
    }
    Ok(summary)
}

fn join(versions: &BTreeSet<String>) -> String {
    versions.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn index_packages(text: &str) -> Result<PackageIndex, String> {
    let doc: Value = serde_yaml::from_str(text).map_err(|e| format!("invalid pixi.lock: {e}"))?;
    let mut index = PackageIndex::new();
    let Some(packages) = doc.get("packages").and_then(Value::as_sequence) else {
        return Ok(index);
    };
    for entry in packages {
        if let Some((kind, name, version)) = describe(entry) {
            index.entry((kind, name)).or_default().insert(version);
        }
    }
    Ok(index)
}

/// `(kind, name, version)` for one `packages:` entry.
fn describe(entry: &Value) -> Option<(PackageKind, String, String)> {
    let field = |key: &str| entry.get(key).and_then(Value::as_str);

    // v6 keys the URL by kind; older locks carry `kind:` and `url:`.
    let (kind, location) = if let Some(url) = field("conda") {
        (PackageKind::Conda, Some(url))
    } else if let Some(url) = field("pypi") {
        (PackageKind::Pypi, Some(url))
    } else {
        let kind = match field("kind")? {
            "conda" => PackageKind::Conda,
            "pypi" => PackageKind::Pypi,
            _ => return None,
        };
        (kind, field("url"))
    };

    let from_file = location.and_then(|url| {
        let file = url.rsplit('/').next()?;
        match kind {
            PackageKind::Conda => parse_conda_filename(file),
            PackageKind::Pypi => parse_python_filename(file),
        }
    });
    let name = field("name")
        .map(str::to_owned)
        .or_else(|| from_file.as_ref().map(|(n, _)| n.clone()))?;
    let version = version_string(entry.get("version"))
        .or_else(|| from_file.map(|(_, v)| v))
        .unwrap_or_default();
    Some((kind, name, version))
}

fn version_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `<name>-<version>-<build>.conda` or `.tar.bz2`.
fn parse_conda_filename(file: &str) -> Option<(String, String)> {
    let stem = file
        .strip_suffix(".conda")
        .or_else(|| file.strip_suffix(".tar.bz2"))?;
    let (rest, _build) = stem.rsplit_once('-')?;
    let (name, version) = rest.rsplit_once('-')?;
    (!name.is_empty() && !version.is_empty()).then(|| (name.to_owned(), version.to_owned()))
}

/// Wheel (`name-version-...whl`) or sdist (`name-version.tar.gz`/`.zip`).
fn parse_python_filename(file: &str) -> Option<(String, String)> {
    let (name, version) = if let Some(stem) = file.strip_suffix(".whl") {
        let mut parts = stem.split('-');
        (parts.next()?, parts.next()?)
    } else {
        let stem = file
            .strip_suffix(".tar.gz")
            .or_else(|| file.strip_suffix(".zip"))?;
        stem.rsplit_once('-')?
    };
    Some((name.replace('_', "-").to_lowercase(), version.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const V6_OLD: &str = r"
version: 6
environments:
  default:
    packages:
      linux-64:
      - conda: https://conda.anaconda.org/conda-forge/linux-64/python-3.12.1-hab00c5b_1_cpython.conda
packages:
- conda: https://conda.anaconda.org/conda-forge/linux-64/python-3.12.1-hab00c5b_1_cpython.conda
  sha256: abc
- conda: https://conda.anaconda.org/conda-forge/noarch/tzdata-2024a-h0c530f3_0.conda
- pypi: https://files.pythonhosted.org/packages/x/requests-2.31.0-py3-none-any.whl
  name: requests
  version: 2.31.0
";

    const V6_NEW: &str = r"
version: 6
packages:
- conda: https://conda.anaconda.org/conda-forge/linux-64/python-3.12.2-hab00c5b_0_cpython.conda
- conda: https://conda.anaconda.org/conda-forge/linux-64/numpy-2.0.0-py312h1234_0.conda
- pypi: https://files.pythonhosted.org/packages/x/requests-2.31.0-py3-none-any.whl
  name: requests
  version: 2.31.0
";

    #[test]
    fn v6_summary() {
        let summary = summarize_locks(Some(V6_OLD), Some(V6_NEW)).unwrap();
        assert_eq!(
            summary.added,
            vec![Package {
                kind: PackageKind::Conda,
                name: "numpy".into(),
                version: "2.0.0".into()
            }]
        );
        assert_eq!(summary.removed.len(), 1);
        assert_eq!(summary.removed[0].name, "tzdata");
        assert_eq!(
            summary.changed,
            vec![VersionChange {
                kind: PackageKind::Conda,
                name: "python".into(),
                from: "3.12.1".into(),
                to: "3.12.2".into()
            }]
        );
    }

    #[test]
    fn legacy_kind_field() {
        let old = "packages:\n- kind: conda\n  name: zlib\n  version: 1.2.13\n  url: https://x/zlib-1.2.13-h0_0.conda\n";
        let new = "packages:\n- kind: conda\n  name: zlib\n  version: 1.3.1\n  url: https://x/zlib-1.3.1-h0_0.conda\n";
        let summary = summarize_locks(Some(old), Some(new)).unwrap();
        assert_eq!(summary.changed[0].from, "1.2.13");
        assert_eq!(summary.changed[0].to, "1.3.1");
    }

    #[test]
    fn missing_side_counts_as_empty() {
        let summary = summarize_locks(None, Some(V6_NEW)).unwrap();
        assert_eq!(summary.added.len(), 3);
        assert!(summarize_locks(None, None).unwrap().is_empty());
    }

    #[test]
    fn unparseable_lock_is_an_error() {
        assert!(summarize_locks(Some("packages: [unclosed"), None).is_err());
    }

    #[test]
    fn filename_parsing() {
        assert_eq!(
            parse_conda_filename("libgcc-ng-13.2.0-h77fa898_7.tar.bz2"),
            Some(("libgcc-ng".into(), "13.2.0".into()))
        );
        assert_eq!(
            parse_python_filename("Typing_Extensions-4.9.0-py3-none-any.whl"),
            Some(("typing-extensions".into(), "4.9.0".into()))
        );
        assert_eq!(
            parse_python_filename("my-pkg-0.1.tar.gz"),
            Some(("my-pkg".into(), "0.1".into()))
        );
    }
}
