//! Line-level unified diff (LCS based).

use std::fmt::Write as _;

use serde::Serialize;

/// Lines of context around each change.
pub const DEFAULT_CONTEXT: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Keep,
    Remove,
    Add,
}

#[derive(Clone, Copy, Debug)]
struct Edit<'a> {
    op: Op,
    line: &'a str,
    /// Old/new line indices before this edit is applied.
    old: usize,
    new: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "text", rename_all = "lowercase")]
pub enum HunkLine {
    Context(String),
    Removed(String),
    Added(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Hunk {
    /// 1-based; 0 only when `old_len` is 0 at the top of the file.
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    fn header(&self) -> String {
        format!(
            "@@ -{} +{} @@",
            range(self.old_start, self.old_len),
            range(self.new_start, self.new_len)
        )
    }
}

fn range(start: usize, len: usize) -> String {
    if len == 1 {
        start.to_string()
    } else {
        format!("{start},{len}")
    }
}

/// Hunks turning `old` into `new`. Empty when the texts have equal lines.
#[must_use]
pub fn unified_diff(old: &str, new: &str, context: usize) -> Vec<Hunk> {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let edits = edit_script(&old_lines, &new_lines);
    group_hunks(&edits, context)
}

/// Render hunks with `---`/`+++` headers. Empty input renders as "".
#[must_use]
pub fn render(hunks: &[Hunk], old_label: &str, new_label: &str) -> String {
    if hunks.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    let _ = writeln!(out, "--- {old_label}");
    let _ = writeln!(out, "+++ {new_label}");
    for hunk in hunks {
        let _ = writeln!(out, "{}", hunk.header());
        for line in &hunk.lines {
            let _ = match line {
                HunkLine::Context(text) => writeln!(out, " {text}"),
                HunkLine::Removed(text) => writeln!(out, "-{text}"),
                HunkLine::Added(text) => writeln!(out, "+{text}"),
            };
        }
    }
    out
}

/// Common prefix and suffix are kept out of the LCS table.
fn edit_script<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Edit<'a>> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops: Vec<(Op, &'a str)> = old[..prefix].iter().map(|l| (Op::Keep, *l)).collect();
    let table = lcs_table(old_mid, new_mid);
    ops.extend(backtrack(&table, old_mid, new_mid));
    ops.extend(old[old.len() - suffix..].iter().map(|l| (Op::Keep, *l)));

    let (mut i, mut j) = (0, 0);
    ops.into_iter()
        .map(|(op, line)| {
            let edit = Edit {
                op,
                line,
                old: i,
                new: j,
            };
            match op {
                Op::Keep => {
                    i += 1;
                    j += 1;
                }
                Op::Remove => i += 1,
                Op::Add => j += 1,
            }
            edit
        })
        .collect()
}

fn lcs_table(old: &[&str], new: &[&str]) -> Vec<Vec<u32>> {
    let mut table = vec![vec![0u32; new.len() + 1]; old.len() + 1];
    for i in 1..=old.len() {
        for j in 1..=new.len() {
            table[i][j] = if old[i - 1] == new[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }
    table
}

/// Removals come before additions within a changed run.
fn backtrack<'a>(table: &[Vec<u32>], old: &[&'a str], new: &[&'a str]) -> Vec<(Op, &'a str)> {
    let mut edits = Vec::new();
    let (mut i, mut j) = (old.len(), new.len());
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old[i - 1] == new[j - 1] {
            edits.push((Op::Keep, old[i - 1]));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[i][j - 1] >= table[i - 1][j]) {
            edits.push((Op::Add, new[j - 1]));
            j -= 1;
        } else {
            edits.push((Op::Remove, old[i - 1]));
            i -= 1;
        }
    }
    edits.reverse();
    edits
}

fn group_hunks(edits: &[Edit<'_>], context: usize) -> Vec<Hunk> {
    let changes: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, e)| e.op != Op::Keep)
        .map(|(i, _)| i)
        .collect();
    let Some(&first) = changes.first() else {
        return Vec::new();
    };

    let mut spans = Vec::new();
    let mut start = first.saturating_sub(context);
    let mut end = (first + context + 1).min(edits.len());
    for &idx in &changes[1..] {
        if idx.saturating_sub(context) <= end {
            end = (idx + context + 1).min(edits.len());
        } else {
            spans.push((start, end));
            start = idx.saturating_sub(context);
            end = (idx + context + 1).min(edits.len());
        }
    }
    spans.push((start, end));

    spans
        .into_iter()
        .map(|(start, end)| {
            let slice = &edits[start..end];
            let old_len = slice.iter().filter(|e| e.op != Op::Add).count();
            let new_len = slice.iter().filter(|e| e.op != Op::Remove).count();
            let first = slice[0];
            Hunk {
                old_start: if old_len == 0 { first.old } else { first.old + 1 },
                old_len,
                new_start: if new_len == 0 { first.new } else { first.new + 1 },
                new_len,
                lines: slice
                    .iter()
                    .map(|e| match e.op {
                        Op::Keep => HunkLine::Context(e.line.to_owned()),
                        Op::Remove => HunkLine::Removed(e.line.to_owned()),
                        Op::Add => HunkLine::Added(e.line.to_owned()),
                    })
                    .collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_have_no_hunks() {
        assert!(unified_diff("a\nb\n", "a\nb\n", 3).is_empty());
        assert_eq!(render(&[], "a", "b"), "");
    }

    #[test]
    fn single_addition_with_context() {
        let old = "[dependencies]\npython = \"3.12\"\n";
        let new = "[dependencies]\npython = \"3.12\"\nnumpy = \"*\"\n";
        let hunks = unified_diff(old, new, 3);
        assert_eq!(hunks.len(), 1);
        let text = render(&hunks, "a/pixi.toml", "b/pixi.toml");
        assert_eq!(
            text,
            "--- a/pixi.toml\n+++ b/pixi.toml\n@@ -1,2 +1,3 @@\n [dependencies]\n python = \"3.12\"\n+numpy = \"*\"\n"
        );
    }

    #[test]
    fn replacement_lists_removal_first() {
        let hunks = unified_diff("a\nb\nc\n", "a\nx\nc\n", 0);
        assert_eq!(
            hunks[0].lines,
            vec![HunkLine::Removed("b".into()), HunkLine::Added("x".into())]
        );
        assert_eq!(hunks[0].header(), "@@ -2 +2 @@");
    }

    #[test]
    fn distant_changes_split_into_hunks() {
        let old: String = (0..20).map(|i| format!("line{i}\n")).collect();
        let new = old.replace("line2\n", "two\n").replace("line17\n", "seventeen\n");
        let hunks = unified_diff(&old, &new, 2);
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].old_start, 1);
        assert_eq!(hunks[1].old_start, 16);
    }

    #[test]
    fn insertion_into_empty_file() {
        let hunks = unified_diff("", "a\n", 3);
        assert_eq!(hunks[0].header(), "@@ -0,0 +1 @@");
    }
}
