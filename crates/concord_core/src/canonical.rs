//! Canonical JSON encoding for cross-implementation reproducibility.
//!
//! The rules are fixed so that two coordinators, in any language, hash the
//! same logical state to the same checksum:
//!
//! - compact output, no insignificant whitespace
//! - object keys sorted by the byte order of their UTF-8 encoding, at every
//!   nesting level
//! - strings escaped exactly as `serde_json` escapes them
//! - integers in plain decimal, floats in shortest round-trip form
//! - `null`, `true`, `false` as literals
//!
//! Containers nested deeper than [`MAX_DEPTH`] are rejected rather than
//! recursed into.

use crate::error::{CoreError, CoreResult};
use crate::hash::Hash;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Maximum container nesting accepted by the encoder
pub const MAX_DEPTH: usize = 128;

/// Encode any serializable value to its canonical JSON string
///
/// # Errors
///
/// Returns error if the value cannot be represented as JSON or nests deeper
/// than [`MAX_DEPTH`]
pub fn encode<T: Serialize + ?Sized>(value: &T) -> CoreResult<String> {
    let value = serde_json::to_value(value)?;
    encode_value(&value)
}

/// Encode a JSON value to its canonical string
///
/// # Errors
///
/// Returns error if the value nests deeper than [`MAX_DEPTH`]
pub fn encode_value(value: &Value) -> CoreResult<String> {
    let mut out = String::new();
    write_value(&mut out, value, 0)?;
    Ok(out)
}

/// Hash the canonical encoding of a value
///
/// # Errors
///
/// Returns error if the value cannot be canonically encoded
pub fn hash<T: Serialize + ?Sized>(value: &T) -> CoreResult<Hash> {
    Ok(Hash::compute(encode(value)?.as_bytes()))
}

fn write_value(out: &mut String, value: &Value, depth: usize) -> CoreResult<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s)?,
        Value::Array(items) => {
            check_depth(depth)?;
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, depth + 1)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            check_depth(depth)?;
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key)?;
                out.push(':');
                write_value(out, &map[key], depth + 1)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) -> CoreResult<()> {
    out.push_str(&serde_json::to_string(s)?);
    Ok(())
}

fn check_depth(depth: usize) -> CoreResult<()> {
    if depth >= MAX_DEPTH {
        return Err(CoreError::NestingTooDeep { limit: MAX_DEPTH });
    }
    Ok(())
}

/// Trait for canonical serialization and hashing
pub trait CanonicalEncode: Serialize {
    /// Encode to the canonical JSON string
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be canonically encoded
    fn canonical_string(&self) -> CoreResult<String> {
        encode(self)
    }

    /// SHA-256 of the canonical encoding
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be canonically encoded
    fn canonical_hash(&self) -> CoreResult<Hash> {
        hash(self)
    }
}

// Types opt in explicitly; there is no blanket impl over `Serialize`.
impl CanonicalEncode for Value {
    fn canonical_string(&self) -> CoreResult<String> {
        encode_value(self)
    }
}

impl<V: Serialize> CanonicalEncode for BTreeMap<String, V> {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_recursively() {
        let value = json!({"b": {"z": 1, "a": 2}, "a": [3, {"y": null, "x": true}]});
        assert_eq!(
            encode_value(&value).unwrap(),
            r#"{"a":[3,{"x":true,"y":null}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn test_number_and_string_formatting() {
        let value = json!({"f": 1.5, "i": -7, "big": 18446744073709551615u64, "s": "q\"\n"});
        assert_eq!(
            encode_value(&value).unwrap(),
            r#"{"big":18446744073709551615,"f":1.5,"i":-7,"s":"q\"\n"}"#
        );
    }

    #[test]
    fn test_byte_order_key_sort() {
        // Upper-case sorts before lower-case by byte value.
        let value = json!({"b": 1, "B": 2, "a": 3});
        assert_eq!(encode_value(&value).unwrap(), r#"{"B":2,"a":3,"b":1}"#);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut first = BTreeMap::new();
        first.insert("a".to_string(), json!(1));
        first.insert("b".to_string(), json!(2));
        let second = json!({"b": 2, "a": 1});
        assert_eq!(first.canonical_hash().unwrap(), second.canonical_hash().unwrap());
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!(0);
        for _ in 0..MAX_DEPTH {
            value = json!([value]);
        }
        assert!(encode_value(&value).is_ok());

        let too_deep = json!([value]);
        assert_eq!(
            encode_value(&too_deep),
            Err(CoreError::NestingTooDeep { limit: MAX_DEPTH })
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_hash_independent_of_insertion_order(
            entries in proptest::collection::vec(("[a-z]{1,6}", proptest::num::i64::ANY), 0..12)
        ) {
            let mut forward = serde_json::Map::new();
            for (k, v) in &entries {
                forward.insert(k.clone(), json!(v));
            }
            let mut reverse = serde_json::Map::new();
            for (k, v) in entries.iter().rev() {
                if !reverse.contains_key(k) {
                    reverse.insert(k.clone(), forward[k].clone());
                }
            }
            proptest::prop_assert_eq!(
                Value::Object(forward).canonical_hash().unwrap(),
                Value::Object(reverse).canonical_hash().unwrap()
            );
        }
    }
}
