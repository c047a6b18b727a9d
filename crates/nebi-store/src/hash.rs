//! Content hashing for manifests and locks.
//!
//! Every hash is `sha-` followed by the lowercase hex SHA-256 digest.
//!
//! - [`hash_manifest`] hashes the *canonical* form of the parsed TOML so
//!   manifests that differ only in whitespace, comments, quoting or key order
//!   deduplicate. Bytes that do not parse as TOML are hashed raw.
//! - [`hash_lock`] hashes raw bytes. Lock files are machine-generated and
//!   byte-stable.
//!
//! # Canonical form
//!
//! One line per leaf value, `<key path> = <value>\n`, emitted depth-first
//! with keys sorted lexicographically inside each table:
//!
//! ```text
//! "dependencies"."numpy" = ">=1.26"
//! "workspace"."channels" = ["conda-forge"]
//! "workspace"."name" = "demo"
//! ```
//!
//! Key segments and strings are double-quoted with JSON-style escapes.
//! Arrays keep their order; inline tables inside arrays are written as
//! `{"k" = v, ...}` with sorted keys. Empty tables are written as `{}`.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use toml::Value;

/// Prefix shared by every content hash and content tag.
pub const HASH_PREFIX: &str = "sha-";

/// Number of hex characters kept in a content-addressed tag.
pub const CONTENT_TAG_HEX_LEN: usize = 12;

/// `sha-<hex>` over raw bytes.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{HASH_PREFIX}{}", hex::encode(digest))
}

/// Canonical manifest hash. Falls back to [`content_hash`] when the bytes
/// are not valid UTF-8 TOML.
#[must_use]
pub fn hash_manifest(bytes: &[u8]) -> String {
    match canonical_manifest(bytes) {
        Some(canonical) => content_hash(canonical.as_bytes()),
        None => content_hash(bytes),
    }
}

/// Raw lock hash.
#[must_use]
pub fn hash_lock(bytes: &[u8]) -> String {
    content_hash(bytes)
}

/// String form of [`hash_manifest`].
#[must_use]
pub fn toml_content_hash(text: &str) -> String {
    hash_manifest(text.as_bytes())
}

/// The content-addressed tag for a hash: `sha-` plus the first 12 hex chars.
///
/// Accepts the hash with or without its `sha-` prefix.
#[must_use]
pub fn content_tag(hash: &str) -> String {
    let hex = hash.strip_prefix(HASH_PREFIX).unwrap_or(hash);
    let end = hex
        .char_indices()
        .nth(CONTENT_TAG_HEX_LEN)
        .map_or(hex.len(), |(i, _)| i);
    format!("{HASH_PREFIX}{}", &hex[..end])
}

/// Whether `tag` looks like a content-addressed tag.
#[must_use]
pub fn is_content_tag(tag: &str) -> bool {
    tag.strip_prefix(HASH_PREFIX).is_some_and(|hex| {
        hex.len() == CONTENT_TAG_HEX_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit())
    })
}

/// The canonical text of a manifest, or `None` if it does not parse.
#[must_use]
pub fn canonical_manifest(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    let table: toml::Table = toml::from_str(text).ok()?;
    let mut out = String::new();
    let mut path = Vec::new();
    emit_table(&mut out, &mut path, &table);
    Some(out)
}

// ---------------------------------------------------------------------------
// Canonical emitter
// ---------------------------------------------------------------------------

fn emit_table(out: &mut String, path: &mut Vec<String>, table: &toml::Table) {
    if table.is_empty() && !path.is_empty() {
        out.push_str(&path.join("."));
        out.push_str(" = {}\n");
        return;
    }
    for key in sorted_keys(table) {
        let value = &table[key];
        path.push(quote(key));
        match value {
            Value::Table(inner) => emit_table(out, path, inner),
            leaf => {
                out.push_str(&path.join("."));
                out.push_str(" = ");
                emit_inline(out, leaf);
                out.push('\n');
            }
        }
        path.pop();
    }
}

fn emit_inline(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(&quote(s)),
        Value::Integer(i) => {
            let _ = write!(out, "{i}");
        }
        Value::Float(f) => out.push_str(&format_float(*f)),
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Datetime(dt) => {
            let _ = write!(out, "{dt}");
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                emit_inline(out, item);
            }
            out.push(']');
        }
        Value::Table(table) => {
            out.push('{');
            for (i, key) in sorted_keys(table).into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&quote(key));
                out.push_str(" = ");
                emit_inline(out, &table[key]);
            }
            out.push('}');
        }
    }
}

fn sorted_keys(table: &toml::Table) -> Vec<&String> {
    let mut keys: Vec<&String> = table.keys().collect();
    keys.sort();
    keys
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let s = format!("{f}");
    if s.contains(['.', 'e', 'E']) {
        s
    } else {
        format!("{s}.0")
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MANIFEST: &str = r#"
[workspace]
name = "demo"
channels = ["conda-forge"]
platforms = ["linux-64", "osx-arm64"]

[dependencies]
python = ">=3.11"
numpy = "*"
"#;

    #[test]
    fn hash_has_prefix_and_full_digest() {
        let h = content_hash(b"hello");
        assert!(h.starts_with("sha-"));
        assert_eq!(h.len(), 4 + 64);
        assert_eq!(
            h,
            "sha-2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn manifest_hash_ignores_whitespace_comments_and_key_order() {
        let reordered = r#"
# a comment that should not matter
[dependencies]
numpy    = '*'
python = ">=3.11"

[workspace]
platforms = [ "linux-64",
              "osx-arm64" ]
channels = ["conda-forge"]   # trailing comment
name = "demo"
"#;
        assert_eq!(hash_manifest(MANIFEST.as_bytes()), hash_manifest(reordered.as_bytes()));
    }

    #[test]
    fn manifest_hash_ignores_dotted_vs_table_syntax() {
        let a = "[dependencies]\nnumpy = \"*\"\n";
        let b = "dependencies.numpy = \"*\"\n";
        assert_eq!(hash_manifest(a.as_bytes()), hash_manifest(b.as_bytes()));
    }

    #[test]
    fn manifest_hash_sees_array_order_and_values() {
        let a = "platforms = [\"linux-64\", \"osx-arm64\"]\n";
        let b = "platforms = [\"osx-arm64\", \"linux-64\"]\n";
        let c = "platforms = [\"linux-64\"]\n";
        assert_ne!(hash_manifest(a.as_bytes()), hash_manifest(b.as_bytes()));
        assert_ne!(hash_manifest(a.as_bytes()), hash_manifest(c.as_bytes()));
    }

    #[test]
    fn unparseable_manifest_hashes_raw_bytes() {
        let junk = b"[workspace\nname = ";
        assert_eq!(hash_manifest(junk), content_hash(junk));
    }

    #[test]
    fn lock_hash_is_byte_sensitive() {
        assert_ne!(hash_lock(b"version: 6\n"), hash_lock(b"version: 6\n\n"));
    }

    #[test]
    fn canonical_form_shape() {
        let canonical = canonical_manifest(
            b"[tasks]\nstart = { cmd = \"python app.py\", cwd = \"src\" }\n[empty]\n[w]\nf = 1.0\ni = 3\n",
        )
        .unwrap();
        assert_eq!(
            canonical,
            "\"empty\" = {}\n\"tasks\".\"start\".\"cmd\" = \"python app.py\"\n\"tasks\".\"start\".\"cwd\" = \"src\"\n\"w\".\"f\" = 1.0\n\"w\".\"i\" = 3\n"
        );
    }

    #[test]
    fn arrays_of_tables_are_inline_and_sorted() {
        let canonical =
            canonical_manifest(b"[[feature]]\nz = 1\na = \"x\"\n[[feature]]\nb = true\n").unwrap();
        assert_eq!(
            canonical,
            "\"feature\" = [{\"a\" = \"x\", \"z\" = 1}, {\"b\" = true}]\n"
        );
    }

    #[test]
    fn content_tag_truncates_digest() {
        let h = content_hash(b"demo");
        let tag = content_tag(&h);
        assert_eq!(tag.len(), 4 + 12);
        assert!(h.starts_with(&tag));
        assert!(is_content_tag(&tag));
        assert_eq!(content_tag("abcdef0123456789"), "sha-abcdef012345");
        assert!(!is_content_tag("v1"));
        assert!(!is_content_tag("sha-xyz"));
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_float(f64::NAN), "nan");
    }

    proptest! {
        #[test]
        fn key_order_never_changes_hash(
            entries in proptest::collection::btree_map("[a-z][a-z0-9_-]{0,8}", "[ -~]{0,12}", 1..8)
        ) {
            let forward: String = entries
                .iter()
                .map(|(k, v)| format!("{k} = {}\n", quote(v)))
                .collect();
            let backward: String = entries
                .iter()
                .rev()
                .map(|(k, v)| format!("{k}    =    {}   \n\n", quote(v)))
                .collect();
            let a = format!("[dependencies]\n{forward}");
            let b = format!("\n# reordered\n[dependencies]\n{backward}");
            prop_assert_eq!(hash_manifest(a.as_bytes()), hash_manifest(b.as_bytes()));
        }
    }
}
