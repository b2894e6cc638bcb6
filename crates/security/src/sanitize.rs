//! Redaction of sensitive tool arguments before they reach the audit trail.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Placeholder written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_MARKERS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "credential",
    "authorization",
];

/// Whether an argument key names a credential-like value (case-insensitive substring match).
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Return a copy of `value` with every sensitive key's value replaced, at any depth.
pub fn sanitize_arguments(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    let cleaned = if is_sensitive_key(key) {
                        Value::String(REDACTED.into())
                    } else {
                        sanitize_arguments(v)
                    };
                    (key.clone(), cleaned)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_arguments).collect()),
        other => other.clone(),
    }
}

/// Hex SHA-256 of the compact JSON encoding of `value`.
///
/// Lets auditors correlate identical calls without storing secrets.
pub fn fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
