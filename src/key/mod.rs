//! Key Module
//!
//! Derives normalized cache keys from raw call arguments.

mod identity;
mod pipeline;
mod serialize;

// Re-export public types
pub use identity::{compare_identities, sort_identities, ExtractFn, IdentityField};
pub use pipeline::{KeyPipeline, TransformFn};
pub use serialize::{
    default_serializer, hash_key, serialized_keys_equal, KeyHash, SerializeFn, Serializer,
};

/// A normalized cache key: the transformed argument sequence.
pub type Key = Vec<serde_json::Value>;
