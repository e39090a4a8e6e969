//! Request fingerprints for idempotent replay detection.
//!
//! Algorithm:
//!   1. Canonicalise parameters to JSON with object keys sorted at every depth
//!      (absent parameters hash the same as `{}`)
//!   2. Emit `service_id`, `plan_id`, then any extra named parts, one per line
//!   3. Hash: SHA-256 of ("v1:" + canonical text), hex-encoded
//!
//! Two requests with the same fingerprint describe the same configuration.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Current fingerprint version prefix.
pub const FINGERPRINT_VERSION: &str = "v1";

/// A named, optional component folded into a fingerprint after the ids.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintPart<'a> {
    pub name: &'a str,
    pub value: Option<&'a str>,
}

impl<'a> FingerprintPart<'a> {
    pub fn new(name: &'a str, value: Option<&'a str>) -> Self {
        Self { name, value }
    }
}

pub fn request_fingerprint(
    service_id: &str,
    plan_id: &str,
    parameters: Option<&Map<String, Value>>,
    parts: &[FingerprintPart<'_>],
) -> String {
    let params = match parameters {
        Some(map) => canonical_json(&Value::Object(map.clone())),
        None => "{}".to_string(),
    };

    let mut hasher = Sha256::new();
    hasher.update(format!("{}:", FINGERPRINT_VERSION).as_bytes());
    hasher.update(b"service_id=");
    hasher.update(service_id.as_bytes());
    hasher.update(b"\nplan_id=");
    hasher.update(plan_id.as_bytes());
    hasher.update(b"\nparameters=");
    hasher.update(params.as_bytes());
    for part in parts {
        hasher.update(b"\n");
        hasher.update(part.name.as_bytes());
        match part.value {
            // Distinguish an absent part from an empty string.
            Some(v) => {
                hasher.update(b"=");
                hasher.update(v.as_bytes());
            }
            None => hasher.update(b"~"),
        }
    }

    hex::encode(hasher.finalize())
}

/// Serialise a JSON value with object keys in lexicographic order at every
/// depth, independent of how the map was built.
pub fn canonical_json(value: &Value) -> String {
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
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
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
