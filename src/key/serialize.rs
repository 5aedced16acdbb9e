//! Key Serialization Module
//!
//! Turns argument sequences into stable strings. The same encoding doubles as
//! the hashing primitive the identity eviction policy tracks recency with.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::Key;

/// User-supplied serializer from the argument sequence to a single string.
pub type SerializeFn = Arc<dyn Fn(&[Value]) -> String + Send + Sync>;

// == Key Hash ==
/// Content hash of a normalized key.
///
/// Two keys that are structurally equal always produce the same hash, so
/// recency bookkeeping survives reordering of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct KeyHash(String);

impl KeyHash {
    /// Returns the encoded form of the hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Default Serializer ==
/// Encodes an argument sequence as a compact JSON array string.
pub fn default_serializer(args: &[Value]) -> String {
    Value::Array(args.to_vec()).to_string()
}

/// Hashes a normalized key with the default serializer.
pub fn hash_key(key: &[Value]) -> KeyHash {
    KeyHash(default_serializer(key))
}

// == Serializer Stage ==
/// Pipeline stage collapsing the argument sequence into a one-element key.
#[derive(Clone)]
pub struct Serializer {
    encode: SerializeFn,
}

impl Serializer {
    /// Creates a serializer stage using the default JSON encoding.
    pub fn new() -> Self {
        Self {
            encode: Arc::new(default_serializer),
        }
    }

    /// Creates a serializer stage using a custom encoding.
    pub fn with(encode: SerializeFn) -> Self {
        Self { encode }
    }

    /// Applies the stage.
    pub fn apply(&self, args: &[Value]) -> Key {
        vec![Value::String((self.encode)(args))]
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer").finish_non_exhaustive()
    }
}

/// Compares two serialized keys by their single encoded element.
pub fn serialized_keys_equal(cache_key: &[Value], key: &[Value]) -> bool {
    match (cache_key.first(), key.first()) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    }
}
