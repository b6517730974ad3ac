use huap_types::sha256_hex;
use serde_json::{Map, Value};

/// Case-insensitive key fragments that mark a value as sensitive.
const SENSITIVE_KEYS: &[&str] = &[
    "api_key",
    "apikey",
    "token",
    "password",
    "authorization",
    "cookie",
    "secret",
    "credential",
    "private_key",
];

/// Values larger than this, once serialised, are truncated to a preview +
/// hash + key list rather than stored whole.
pub const DEFAULT_SIZE_CAP_BYTES: usize = 64 * 1024;

fn key_is_sensitive(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|needle| lower.contains(needle))
}

/// Recursively walks `value`, replacing any object value whose key matches a
/// sensitive-key fragment with `"[REDACTED]"`, then caps the overall
/// serialised size.
pub fn sanitize_input(value: &Value) -> Value {
    let redacted = redact_keys(value);
    cap_size(redacted, DEFAULT_SIZE_CAP_BYTES)
}

fn redact_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if key_is_sensitive(k) {
                    out.insert(k.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(k.clone(), redact_keys(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_keys).collect()),
        other => other.clone(),
    }
}

fn cap_size(value: Value, cap: usize) -> Value {
    let serialized = match serde_json::to_vec(&value) {
        Ok(bytes) => bytes,
        Err(_) => return value,
    };
    if serialized.len() <= cap {
        return value;
    }
    let preview: String = String::from_utf8_lossy(&serialized[..cap.min(serialized.len())])
        .chars()
        .take(256)
        .collect();
    let keys = match &value {
        Value::Object(map) => map.keys().cloned().collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    serde_json::json!({
        "truncated": true,
        "preview": preview,
        "sha256": sha256_hex(&serialized),
        "original_size": serialized.len(),
        "keys": keys,
    })
}

/// Replaces `messages[].content` and `text` with `[REDACTED]` plus a content
/// hash and length, preserving what replay matching needs without storing the
/// live payload.
pub fn redact_llm_payload(data: &mut Map<String, Value>) {
    if let Some(Value::Array(messages)) = data.get_mut("messages") {
        for message in messages {
            if let Some(obj) = message.as_object_mut() {
                redact_text_field(obj, "content");
            }
        }
    }
    redact_text_field(data, "text");
}

fn redact_text_field(obj: &mut Map<String, Value>, field: &str) {
    let Some(Value::String(text)) = obj.get(field) else {
        return;
    };
    let hash = sha256_hex(text.as_bytes());
    let len = text.len();
    obj.insert(field.to_string(), Value::String("[REDACTED]".to_string()));
    obj.insert(format!("{field}_sha256"), Value::String(hash));
    obj.insert(format!("{field}_len"), Value::from(len));
}
