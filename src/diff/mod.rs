//! Comparison of two workspace snapshots.
//!
//! [`compare`] produces a [`DiffReport`] holding every view at once: the
//! line diff of `pixi.toml`, its semantic key-level changes, and the lock
//! package summary. Renderers pick the view the user asked for.

pub mod lock;
pub mod manifest;
pub mod unified;

use std::fmt::Write as _;

use serde::Serialize;

use crate::files::WorkspaceFiles;
pub use lock::{LockSummary, summarize_locks};
pub use manifest::{ManifestChange, diff_manifests};
pub use unified::{DEFAULT_CONTEXT, Hunk, unified_diff};

/// One side of a comparison.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Shown in headers: a path or `name:tag`.
    pub label: String,
    pub files: WorkspaceFiles,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum LockDiff {
    Unchanged,
    Changed { summary: LockSummary },
    /// Bytes differ but at least one side is not a readable lock.
    Unreadable { reason: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct DiffReport {
    pub source: String,
    pub target: String,
    /// Line diff of `pixi.toml`.
    pub hunks: Vec<Hunk>,
    /// Key-level `pixi.toml` changes; `None` when a side does not parse.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_changes: Option<Vec<ManifestChange>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_parse_error: Option<String>,
    pub lock: LockDiff,
}

impl DiffReport {
    #[must_use]
    pub fn manifest_differs(&self) -> bool {
        !self.hunks.is_empty()
    }

    #[must_use]
    pub fn lock_differs(&self) -> bool {
        self.lock != LockDiff::Unchanged
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.manifest_differs() || self.lock_differs()
    }
}

#[must_use]
pub fn compare(source: &Snapshot, target: &Snapshot, context: usize) -> DiffReport {
    let hunks = unified_diff(&source.files.manifest, &target.files.manifest, context);
    let (manifest_changes, manifest_parse_error) =
        match diff_manifests(&source.files.manifest, &target.files.manifest) {
            Ok(changes) => (Some(changes), None),
            Err(e) => (None, Some(format!("{} pixi.toml: {}", e.side, e.message))),
        };
    let lock = if source.files.lock == target.files.lock {
        LockDiff::Unchanged
    } else {
        match summarize_locks(source.files.lock.as_deref(), target.files.lock.as_deref()) {
            Ok(summary) => LockDiff::Changed { summary },
            Err(reason) => LockDiff::Unreadable { reason },
        }
    };
    DiffReport {
        source: source.label.clone(),
        target: target.label.clone(),
        hunks,
        manifest_changes,
        manifest_parse_error,
        lock,
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Unified diff of `pixi.toml`.
#[must_use]
pub fn render_unified(report: &DiffReport) -> String {
    unified::render(
        &report.hunks,
        &format!("pixi.toml ({})", report.source),
        &format!("pixi.toml ({})", report.target),
    )
}

/// One line per changed key.
#[must_use]
pub fn render_toml(report: &DiffReport) -> String {
    let mut out = String::new();
    if let Some(err) = &report.manifest_parse_error {
        let _ = writeln!(out, "cannot compare semantically: {err}");
        return out;
    }
    for change in report.manifest_changes.iter().flatten() {
        let _ = match change {
            ManifestChange::Added { key, value } => writeln!(out, "+ {key} = {value}"),
            ManifestChange::Removed { key, value } => writeln!(out, "- {key} = {value}"),
            ManifestChange::Changed { key, from, to } => writeln!(out, "~ {key}: {from} -> {to}"),
        };
    }
    out
}

/// Package-level lock summary.
#[must_use]
pub fn render_lock(report: &DiffReport) -> String {
    let mut out = String::new();
    match &report.lock {
        LockDiff::Unchanged => {}
        LockDiff::Unreadable { reason } => {
            let _ = writeln!(out, "pixi.lock differs ({reason})");
        }
        LockDiff::Changed { summary } if summary.is_empty() => {
            let _ = writeln!(out, "pixi.lock differs (no package changes)");
        }
        LockDiff::Changed { summary } => {
            for p in &summary.added {
                let _ = writeln!(out, "+ {} {} ({})", p.name, p.version, p.kind);
            }
            for p in &summary.removed {
                let _ = writeln!(out, "- {} {} ({})", p.name, p.version, p.kind);
            }
            for c in &summary.changed {
                let _ = writeln!(out, "~ {} {} -> {} ({})", c.name, c.from, c.to, c.kind);
            }
            let _ = writeln!(
                out,
                "{} added, {} removed, {} changed",
                summary.added.len(),
                summary.removed.len(),
                summary.changed.len()
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(label: &str, manifest: &str, lock: Option<&str>) -> Snapshot {
        Snapshot {
            label: label.into(),
            files: WorkspaceFiles::new(manifest, lock.map(str::to_owned)),
        }
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let a = snap("a", "[workspace]\nname = \"x\"\n", Some("version: 6\n"));
        let report = compare(&a, &a.clone(), DEFAULT_CONTEXT);
        assert!(!report.has_changes());
        assert_eq!(render_unified(&report), "");
        assert_eq!(render_lock(&report), "");
    }

    #[test]
    fn manifest_change_renders_both_views() {
        let a = snap("demo:v1", "[dependencies]\npython = \"*\"\n", None);
        let b = snap("demo:v2", "[dependencies]\npython = \"*\"\nnumpy = \"*\"\n", None);
        let report = compare(&a, &b, DEFAULT_CONTEXT);
        assert!(report.manifest_differs());
        assert!(!report.lock_differs());
        let text = render_unified(&report);
        assert!(text.starts_with("--- pixi.toml (demo:v1)\n+++ pixi.toml (demo:v2)\n"));
        assert!(text.contains("+numpy = \"*\""));
        assert_eq!(render_toml(&report), "+ dependencies.numpy = \"*\"\n");
    }

    #[test]
    fn lock_only_change_is_detected() {
        let lock_a = "packages:\n- conda: https://x/zlib-1.2.13-h0_0.conda\n";
        let lock_b = "packages:\n- conda: https://x/zlib-1.3.1-h0_0.conda\n";
        let a = snap("a", "x = 1\n", Some(lock_a));
        let b = snap("b", "x = 1\n", Some(lock_b));
        let report = compare(&a, &b, DEFAULT_CONTEXT);
        assert!(!report.manifest_differs());
        assert!(report.has_changes());
        assert!(render_lock(&report).contains("~ zlib 1.2.13 -> 1.3.1"));
    }

    #[test]
    fn json_shape_is_tagged() {
        let report = compare(&snap("a", "x = 1\n", None), &snap("b", "x = 2\n", None), 3);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["lock"]["status"], "unchanged");
        assert_eq!(json["manifest_changes"][0]["change"], "changed");
        assert_eq!(json["hunks"][0]["lines"][0]["op"], "removed");
    }
}
