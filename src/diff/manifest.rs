//! Semantic `pixi.toml` comparison: leaf values by dotted key path.

use serde::Serialize;
use toml::{Table, Value};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "lowercase")]
pub enum ManifestChange {
    Added { key: String, value: String },
    Removed { key: String, value: String },
    Changed { key: String, from: String, to: String },
}

impl ManifestChange {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Removed { key, .. } | Self::Changed { key, .. } => key,
        }
    }
}

/// Why a semantic comparison could not be made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseFailure {
    pub side: &'static str,
    pub message: String,
}

/// Changes from `old` to `new`, ordered by key path.
pub fn diff_manifests(old: &str, new: &str) -> Result<Vec<ManifestChange>, ParseFailure> {
    let parse = |side, text: &str| {
        text.parse::<Table>().map_err(|e| ParseFailure {
            side,
            message: e.message().to_owned(),
        })
    };
    let old = parse("source", old)?;
    let new = parse("target", new)?;
    let mut changes = Vec::new();
    diff_tables(&mut Vec::new(), &old, &new, &mut changes);
    Ok(changes)
}

fn diff_tables<'a>(
    path: &mut Vec<&'a str>,
    old: &'a Table,
    new: &'a Table,
    out: &mut Vec<ManifestChange>,
) {
    let mut keys: Vec<&str> = old.keys().chain(new.keys()).map(String::as_str).collect();
    keys.sort_unstable();
    keys.dedup();
    for key in keys {
        path.push(key);
        match (old.get(key), new.get(key)) {
            (Some(Value::Table(a)), Some(Value::Table(b))) => diff_tables(path, a, b, out),
            (Some(a), Some(b)) if a != b => out.push(ManifestChange::Changed {
                key: dotted(path),
                from: inline(a),
                to: inline(b),
            }),
            (Some(a), None) => leaves(path, a, out, |key, value| ManifestChange::Removed {
                key,
                value,
            }),
            (None, Some(b)) => leaves(path, b, out, |key, value| ManifestChange::Added {
                key,
                value,
            }),
            _ => {}
        }
        path.pop();
    }
}

/// A whole added/removed table is reported leaf by leaf.
fn leaves<'a>(
    path: &mut Vec<&'a str>,
    value: &'a Value,
    out: &mut Vec<ManifestChange>,
    make: fn(String, String) -> ManifestChange,
) {
    match value {
        Value::Table(table) if !table.is_empty() => {
            for (key, child) in table {
                path.push(key);
                leaves(path, child, out, make);
                path.pop();
            }
        }
        other => out.push(make(dotted(path), inline(other))),
    }
}

fn dotted(path: &[&str]) -> String {
    path.iter()
        .map(|segment| {
            if !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                (*segment).to_owned()
            } else {
                format!("{segment:?}")
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn inline(value: &Value) -> String {
    value.to_string()
}
