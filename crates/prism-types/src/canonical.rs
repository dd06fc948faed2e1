//! Canonical serialization and checksums.
//!
//! Determinism checks compare bytes, so every value that is hashed goes
//! through [`canonical_json`] first: the value is converted to a JSON tree,
//! every object is rebuilt with its keys in sorted order, and the tree is
//! printed without whitespace. The checksum is the lowercase hex SHA-256 of
//! those bytes.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize `value` as compact JSON with every object's keys sorted.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if the value cannot be serialized.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    serde_json::to_string(&sort_keys(tree))
}

/// Lowercase hex SHA-256 of the canonical JSON of `value`.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if the value cannot be serialized.
pub fn checksum<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    canonical_json(value).map(|json| sha256_hex(json.as_bytes()))
}

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len().saturating_mul(2));
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, item)| (key, sort_keys(item)))
                    .collect(),
            )
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::frame::{EntityState, Frame, Vec2};

    #[derive(Serialize)]
    struct Unordered {
        zeta: u8,
        alpha: u8,
    }

    #[test]
    fn struct_fields_are_emitted_sorted() {
        let json = canonical_json(&Unordered { zeta: 1, alpha: 2 }).unwrap();
        assert_eq!(json, r#"{"alpha":2,"zeta":1}"#);
    }

    #[test]
    fn sha256_of_empty_input_matches_reference() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn frame_checksum_ignores_entity_creation_order() {
        let a = EntityState {
            id: "a".to_owned(),
            kind: "player".to_owned(),
            position: Vec2::new(1.0, 2.0),
            tick: 0,
        };
        let b = EntityState {
            id: "b".to_owned(),
            ..a.clone()
        };
        let first = Frame::new(0, vec![a.clone(), b.clone()]).unwrap();
        let second = Frame::new(0, vec![b, a]).unwrap();
        assert_eq!(checksum(&first).unwrap(), checksum(&second).unwrap());
        assert_eq!(checksum(&first).unwrap().len(), 64);
    }
}
