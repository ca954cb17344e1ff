//! # Canonical Serialization
//!
//! `CanonicalBytes` is the only input accepted by the digest functions.
//! Step payload idempotency, risk snapshot digests and credential content
//! hashes are all computed over it.
//!
//! ## Security Invariant
//!
//! The inner buffer is private and produced by RFC 8785 (JCS) serialization
//! after rejecting floats. Two payloads that differ only in key order or
//! whitespace produce identical bytes, so an idempotent resubmission is
//! recognized regardless of how the caller encoded it. Scores are carried as
//! integer basis points wherever they enter a digest.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization with float rejection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if the value contains a non-integer number,
    /// `SerializationFailed` if serde cannot represent it.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(reject_floats),
        Value::Object(map) => map.values().try_for_each(reject_floats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_sorted_and_compact() {
        let data = serde_json::json!({"step": 2, "doc": {"b": 1, "a": "x"}});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"doc":{"a":"x","b":1},"step":2}"#
        );
    }

    #[test]
    fn key_order_does_not_change_bytes() {
        let a = serde_json::json!({"selfie": "s3://a", "frames": ["f1", "f2"]});
        let b = serde_json::json!({"frames": ["f1", "f2"], "selfie": "s3://a"});
        assert_eq!(
            CanonicalBytes::new(&a).unwrap(),
            CanonicalBytes::new(&b).unwrap()
        );
    }

    #[test]
    fn nested_float_is_rejected() {
        let data = serde_json::json!({"scores": [{"liveness": 91.5}]});
        match CanonicalBytes::new(&data) {
            Err(CanonicalizationError::FloatRejected(f)) => assert_eq!(f, 91.5),
            other => panic!("expected FloatRejected, got {other:?}"),
        }
    }

    #[test]
    fn basis_points_are_accepted() {
        let data = serde_json::json!({"aggregate_bp": 9080, "delta": -2500});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert!(!cb.is_empty());
        assert_eq!(cb.as_bytes(), br#"{"aggregate_bp":9080,"delta":-2500}"#);
    }
}
