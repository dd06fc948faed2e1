//! Deterministic values exchanged between the host and lenses.
//!
//! A [`LensValue`] is the only shape a lens may hand back from `decode` or
//! `render`, and the only shape an input payload may carry. It is recursively
//! one of null, bool, finite number, string, array, or a string-keyed map.
//! Maps are [`BTreeMap`]s, so iteration and serialization order is always
//! sorted by key and two equal values always serialize to the same bytes.
//!
//! Rust cannot express functions or `undefined` inside this enum, so the
//! single representable violation is a non-finite number. [`LensValue::validate`]
//! rejects those and reports where in the tree they sit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A value that failed the determinism check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// A number inside the value is `NaN` or infinite.
    #[error("non-finite number at {path}")]
    NonFiniteNumber {
        /// JSON-path style location of the offending number (e.g. `$.pos.x`).
        path: String,
    },
}

/// A deterministic value: null, bool, finite number, string, array or map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LensValue {
    /// The null value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. Must be finite to pass validation.
    Number(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered list of values.
    Array(Vec<LensValue>),
    /// A string-keyed map, always iterated in key order.
    Map(BTreeMap<String, LensValue>),
}

impl LensValue {
    /// Build a map value from `(key, value)` pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// An empty map value.
    pub const fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Check that every number in the tree is finite.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::NonFiniteNumber`] naming the first offending
    /// location in key order.
    pub fn validate(&self) -> Result<(), ValueError> {
        self.validate_at("$")
    }

    /// Whether [`validate`](Self::validate) would succeed.
    pub fn is_deterministic(&self) -> bool {
        self.validate().is_ok()
    }

    fn validate_at(&self, path: &str) -> Result<(), ValueError> {
        match self {
            Self::Null | Self::Bool(_) | Self::String(_) => Ok(()),
            Self::Number(n) if n.is_finite() => Ok(()),
            Self::Number(_) => Err(ValueError::NonFiniteNumber {
                path: path.to_owned(),
            }),
            Self::Array(items) => items
                .iter()
                .enumerate()
                .try_for_each(|(i, item)| item.validate_at(&format!("{path}[{i}]"))),
            Self::Map(entries) => entries
                .iter()
                .try_for_each(|(key, item)| item.validate_at(&format!("{path}.{key}"))),
        }
    }

    /// Look up a key if this value is a map.
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// The number held by this value, if it is one.
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string held by this value, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value is [`LensValue::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for LensValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for LensValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for LensValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for LensValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Self>> for LensValue {
    fn from(value: Vec<Self>) -> Self {
        Self::Array(value)
    }
}

impl From<BTreeMap<String, Self>> for LensValue {
    fn from(value: BTreeMap<String, Self>) -> Self {
        Self::Map(value)
    }
}

impl From<serde_json::Value> for LensValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            // serde_json numbers are always finite; `as_f64` only fails for
            // arbitrary-precision numbers, which we never enable.
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(entries) => {
                Self::Map(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn nested_finite_values_are_deterministic() {
        let value = LensValue::from(serde_json::json!({
            "pos": {"x": 1.5, "y": -2},
            "tags": ["a", "b"],
            "alive": true,
            "target": null
        }));
        assert!(value.validate().is_ok());
    }

    #[test]
    fn nan_reports_its_path() {
        let value = LensValue::map([(
            "pos",
            LensValue::map([("x", LensValue::Number(1.0)), ("y", LensValue::Number(f64::NAN))]),
        )]);
        assert_eq!(
            value.validate(),
            Err(ValueError::NonFiniteNumber {
                path: "$.pos.y".to_owned()
            })
        );
    }

    #[test]
    fn infinity_inside_array_is_rejected() {
        let value = LensValue::Array(vec![
            LensValue::Number(0.0),
            LensValue::Number(f64::INFINITY),
        ]);
        assert!(!value.is_deterministic());
        assert_eq!(
            value.validate().unwrap_err().to_string(),
            "non-finite number at $[1]"
        );
    }

    #[test]
    fn map_keys_serialize_sorted() {
        let value = LensValue::map([
            ("zeta", LensValue::Bool(true)),
            ("alpha", LensValue::Null),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"alpha":null,"zeta":true}"#);
    }

    #[test]
    fn integers_deserialize_as_numbers() {
        let value: LensValue = serde_json::from_str(r#"{"x": 3, "y": -1}"#).unwrap();
        assert_eq!(value.get("x").and_then(LensValue::as_f64), Some(3.0));
        assert_eq!(value.get("y").and_then(LensValue::as_f64), Some(-1.0));
    }
}
