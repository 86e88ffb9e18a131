//! Canonical JSON form and digests.
//!
//! The canonical form of a JSON value sorts object keys lexicographically at
//! every depth, rounds non-integral numbers to 6 decimal places (integral
//! values are emitted as integers) and serializes without whitespace. Two
//! values that differ only in key order or sub-micro float noise produce the
//! same canonical string and therefore the same digest.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Decimal places kept for numeric leaves.
pub const NUMBER_SCALE: u32 = 6;

/// Return the canonical form of a JSON value.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => Value::Number(canonical_number(n)),
        other => other.clone(),
    }
}

/// Canonical string of a JSON value.
pub fn canonical_string(value: &Value) -> String {
    // Serializing a `Value` cannot fail.
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Canonical string of any serializable value.
pub fn to_canonical_string<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(canonical_string(&value))
}

/// Hex-encoded SHA-256 of a byte string.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

fn canonical_number(n: &Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n.clone();
    }

    let Some(f) = n.as_f64() else {
        return n.clone();
    };

    let Some(d) = Decimal::from_f64(f) else {
        return n.clone();
    };

    let rounded = d
        .round_dp_with_strategy(NUMBER_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize();

    if rounded.fract().is_zero() {
        if let Some(i) = rounded.to_i64() {
            return Number::from(i);
        }
    }

    rounded
        .to_f64()
        .and_then(Number::from_f64)
        .unwrap_or_else(|| n.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_invariance() {
        let a = json!({"b": 1, "a": {"z": [1, {"y": 2, "x": 3}], "c": "s"}});
        let b = json!({"a": {"c": "s", "z": [1, {"x": 3, "y": 2}]}, "b": 1});
        assert_eq!(canonical_string(&a), canonical_string(&b));
        assert_eq!(
            canonical_string(&a),
            r#"{"a":{"c":"s","z":[1,{"x":3,"y":2}]},"b":1}"#
        );
    }

    #[test]
    fn test_numbers_rounded_to_six_places() {
        let drifted = json!({"v": 0.1 + 0.2});
        let exact = json!({"v": 0.3});
        assert_eq!(canonical_string(&drifted), canonical_string(&exact));
        assert_eq!(canonical_string(&json!(1.23456789)), "1.234568");
    }

    #[test]
    fn test_integral_floats_become_integers() {
        assert_eq!(canonical_string(&json!(500.0)), "500");
        assert_eq!(canonical_string(&json!(-2.0000001)), "-2");
        assert_eq!(canonical_string(&json!(42)), "42");
    }

    #[test]
    fn test_array_order_preserved() {
        assert_eq!(canonical_string(&json!([3, 1, 2])), "[3,1,2]");
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(sha256_hex("abc").len(), 64);
    }

    #[test]
    fn test_key_order_invariance_randomised() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(7);
        let keys: Vec<String> = (0..12).map(|i| format!("k{i:02}")).collect();

        for _ in 0..50 {
            let mut shuffled = keys.clone();
            shuffled.shuffle(&mut rng);

            let mut forward = Map::new();
            for (i, k) in keys.iter().enumerate() {
                forward.insert(k.clone(), json!({"n": i, "nested": {"b": i, "a": k}}));
            }
            let mut backward = Map::new();
            for k in &shuffled {
                let i = keys.iter().position(|x| x == k).unwrap();
                backward.insert(k.clone(), json!({"nested": {"a": k, "b": i}, "n": i}));
            }

            assert_eq!(
                canonical_string(&Value::Object(forward)),
                canonical_string(&Value::Object(backward))
            );
        }
    }
}
