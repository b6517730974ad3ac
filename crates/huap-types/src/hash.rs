use sha2::{Digest, Sha256};
use serde_json::Value;

use crate::event::EPHEMERAL_FIELDS;

/// Truncated length of a content hash: a 16-hex-character fingerprint.
pub const HASH_LEN: usize = 16;

/// Canonicalises a JSON value for hashing: sorts object keys, drops fields in
/// the ephemeral set at every nesting level, and leaves numbers/strings as-is
/// (serde_json already renders floats stably for our purposes).
///
/// Mirrors `assay-core::fingerprint`'s join-then-hash approach, generalised to
/// recurse into nested maps/arrays so structurally-equal payloads hash equal
/// regardless of key order or ephemeral timing fields.
pub fn canonicalize_for_hash(value: &Value) -> Value {
    canonicalize_inner(value, EPHEMERAL_FIELDS)
}

fn canonicalize_inner(value: &Value, ephemeral: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                if ephemeral.contains(&k.as_str()) {
                    continue;
                }
                out.insert(k.clone(), canonicalize_inner(v, ephemeral));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| canonicalize_inner(v, ephemeral)).collect())
        }
        other => other.clone(),
    }
}

/// SHA-256 of the canonical JSON representation of `value`, truncated to
/// [`HASH_LEN`] hex characters.
pub fn content_hash(value: &Value) -> String {
    let canonical = canonicalize_for_hash(value);
    let bytes = serde_json::to_vec(&canonical).expect("json values always serialize");
    sha256_hex_truncated(&bytes)
}

fn sha256_hex_truncated(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)[..HASH_LEN].to_string()
}

/// Full (untruncated) SHA-256 hex digest, used where the caller needs a
/// collision-resistant identity rather than a short fingerprint (e.g. memory
/// ingest dedup, secret redaction previews).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_invariant_under_key_reordering() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_ignores_ephemeral_fields() {
        let a = json!({"tool": "x", "ts": "2026-01-01T00:00:00Z"});
        let b = json!({"tool": "x", "ts": "2099-12-31T23:59:59Z"});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_changes_with_real_content() {
        let a = json!({"tool": "x"});
        let b = json!({"tool": "y"});
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_is_truncated_to_16_chars() {
        assert_eq!(content_hash(&json!({"a": 1})).len(), HASH_LEN);
    }

    #[test]
    fn nested_ephemeral_fields_are_stripped() {
        let a = json!({"usage": {"duration_ms": 12, "tokens": 5}});
        let b = json!({"usage": {"duration_ms": 9999, "tokens": 5}});
        assert_eq!(content_hash(&a), content_hash(&b));
    }
}
