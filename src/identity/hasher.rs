//! Content hashing over a canonical serialization of a document.
//!
//! The canonical form sorts object keys at every level, prints numbers in one
//! fixed representation and drops the fields that must not influence identity.

use std::fmt;

use serde_json::{Number, Value};

use crate::ExportResult;
use crate::core::CanonicalDocument;

/// Largest integer an f64 represents exactly (2^53).
const MAX_EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// Options controlling which volatile fields are left out of the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashOptions {
    pub exclude_processing_timestamp: bool,
}

impl Default for HashOptions {
    fn default() -> Self {
        HashOptions {
            exclude_processing_timestamp: true,
        }
    }
}

/// Lowercase hex SHA-256 digest of a document's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashDigest(String);

impl HashDigest {
    /// Wrap an existing hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        HashDigest(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `n` hex characters (the whole digest if shorter).
    pub fn prefix(&self, n: usize) -> &str {
        let end = n.min(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a document's semantic content.
///
/// `metadata.document_id` never takes part; `metadata.processing_timestamp`
/// is dropped unless `options` asks to keep it.
pub fn content_hash(
    document: &CanonicalDocument,
    options: HashOptions,
) -> ExportResult<HashDigest> {
    let mut value = serde_json::to_value(document)?;
    strip_excluded(&mut value, options);
    let canonical = canonical_string(&value);
    Ok(HashDigest(sha256::digest(canonical.as_bytes())))
}

fn strip_excluded(value: &mut Value, options: HashOptions) {
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove("document_id");
        if options.exclude_processing_timestamp {
            meta.remove("processing_timestamp");
        }
    }
}

/// Serialize `value` in canonical form.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&normalize_number(n)),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // serializing a str cannot fail
    out.push_str(&serde_json::to_string(s).unwrap_or_default());
}

/// Integral values print as integers so `8` and `8.0` hash alike.
fn normalize_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_F64_INT => {
            format!("{}", f as i64)
        }
        Some(f) => format!("{f}"),
        None => n.to_string(),
    }
}
