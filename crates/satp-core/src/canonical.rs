//! # Canonical Serialization
//!
//! `CanonicalBytes` is the only input accepted by the signing and hashing
//! paths. Two gateways written independently must produce byte-identical
//! encodings of the same envelope, otherwise every signature check and every
//! `hashPreviousMessage` comparison between them fails.
//!
//! ## Rules
//!
//! 1. **No floats.** Amounts and counters are integers or strings. Float
//!    formatting differs across JSON encoders.
//! 2. **RFC 8785 (JCS).** Object keys sorted by code point, compact
//!    separators, no insignificant whitespace. Serialization goes through
//!    `serde_jcs`.
//! 3. **Timestamps** reach this layer already normalized by
//!    [`Timestamp`](crate::Timestamp): UTC, `Z` suffix, whole seconds.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced by JCS canonicalization of a float-free JSON value.
///
/// The inner buffer is private; `CanonicalBytes::new()` is the only
/// constructor, so any function that takes `&CanonicalBytes` is guaranteed
/// to see canonical input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if any number in the value tree is a non-integer
    /// float, `SerializationFailed` if the value cannot be rendered as JSON.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let rendered = serde_jcs::to_string(&value)?;
        Ok(Self(rendered.into_bytes()))
    }

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
            if n.is_f64() {
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
