// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dedup fingerprints for inbound events.
//!
//! A fingerprint is the hex SHA-256 of the event type, ticket id and the
//! payload in canonical form (object keys sorted, no insignificant
//! whitespace). Two redeliveries of the same logical event hash equal even
//! when the sender reorders JSON keys.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::EventType;

/// Compute the fingerprint for `(event_type, ticket_id, payload)`.
pub fn compute(event_type: EventType, ticket_id: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_type.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(ticket_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize(payload).as_bytes());
    hex::encode(hasher.finalize())
}

/// Render `value` as compact JSON with object keys in sorted order.
pub fn normalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
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
        scalar => out.push_str(&scalar.to_string()),
    }
}
