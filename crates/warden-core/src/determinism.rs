//! Canonical JSON for deterministic hashing.
//!
//! Input hashes and the policy entity identifier are computed over a
//! canonical rendering of a JSON value: object keys sorted lexicographically,
//! no whitespace between tokens, minimal string escaping. The same logical
//! value always canonicalizes to the same bytes regardless of the key order
//! the caller supplied.
//!
//! Audit records themselves are NOT canonicalized this way: their on-disk
//! serialization follows a fixed field-order contract and the chain hashes
//! the exact line bytes as written. Canonical JSON is only for open-ended
//! inputs (tool parameter bags, policy configs) where no field-order
//! contract exists.

use serde_json::Value;

/// Renders a JSON value in canonical form: sorted keys, no whitespace.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Route the key through Value so escaping matches string values.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(child) = map.get(*key) {
                    write_canonical(child, out);
                }
            }
            out.push('}');
        }
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
        // Scalars already render compactly and deterministically.
        other => out.push_str(&other.to_string()),
    }
}
