//! Key Transform Pipeline
//!
//! Composes the enabled key stages in their fixed order:
//! serializer, custom transform, identity extraction, argument-count limiter.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{IdentityField, Key, Serializer};

/// User-supplied transform from arguments to arguments.
pub type TransformFn = Arc<dyn Fn(Key) -> Key + Send + Sync>;

// == Key Pipeline ==
/// Normalizes raw call arguments into the key used for lookup and storage.
///
/// Stages that are not configured are skipped. The original arguments are
/// never mutated; every stage works on an owned copy.
#[derive(Clone, Default)]
pub struct KeyPipeline {
    serializer: Option<Serializer>,
    transform: Option<TransformFn>,
    identity: Option<IdentityField>,
    max_args: Option<usize>,
}

impl KeyPipeline {
    // == Constructor ==
    /// Creates a pipeline with no stages enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the serializer stage.
    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Enables the custom transform stage.
    pub fn with_transform(mut self, transform: TransformFn) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Enables identity extraction on the first argument.
    pub fn with_identity(mut self, identity: IdentityField) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Limits the key to the first `max_args` arguments.
    pub fn with_max_args(mut self, max_args: usize) -> Self {
        self.max_args = Some(max_args);
        self
    }

    /// Returns true when identity extraction is configured.
    pub fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    /// Returns true when the serializer stage is configured.
    pub fn is_serialized(&self) -> bool {
        self.serializer.is_some()
    }

    // == Transform ==
    /// Runs every enabled stage left to right.
    pub fn transform(&self, args: &[Value]) -> Key {
        let mut key = match &self.serializer {
            Some(serializer) => serializer.apply(args),
            None => args.to_vec(),
        };

        if let Some(transform) = &self.transform {
            key = transform(key);
        }

        if let Some(identity) = &self.identity {
            key = identity.apply(key);
        }

        if let Some(max_args) = self.max_args {
            key.truncate(max_args);
        }

        key
    }
}

impl fmt::Debug for KeyPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPipeline")
            .field("serializer", &self.serializer.is_some())
            .field("transform", &self.transform.is_some())
            .field("identity", &self.identity)
            .field("max_args", &self.max_args)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_pipeline_copies_arguments() {
        let args = vec![json!(1), json!("two")];
        assert_eq!(KeyPipeline::new().transform(&args), args);
    }

    #[test]
    fn test_max_args_truncates() {
        let pipeline = KeyPipeline::new().with_max_args(1);
        assert_eq!(pipeline.transform(&[json!(1), json!(2), json!(3)]), vec![json!(1)]);
        assert_eq!(pipeline.transform(&[]), Vec::<Value>::new());
    }

    #[test]
    fn test_transform_runs_before_identity() {
        let pipeline = KeyPipeline::new()
            .with_transform(Arc::new(|key: Key| key.into_iter().rev().collect()))
            .with_identity(IdentityField::field("id"));

        let key = pipeline.transform(&[json!("tail"), json!([{"id": "b"}, {"id": "a"}])]);
        assert_eq!(key, vec![json!(["a", "b"]), json!("tail")]);
    }

    #[test]
    fn test_identity_then_max_args() {
        let pipeline = KeyPipeline::new()
            .with_identity(IdentityField::field("id"))
            .with_max_args(1);

        let key = pipeline.transform(&[json!([{"id": 2}, {"id": 1}]), json!("ignored")]);
        assert_eq!(key, vec![json!([1, 2])]);
    }

    #[test]
    fn test_serializer_makes_identity_a_no_op() {
        let pipeline = KeyPipeline::new()
            .with_serializer(Serializer::new())
            .with_identity(IdentityField::field("id"));

        let key = pipeline.transform(&[json!([{"id": "b"}, {"id": "a"}])]);
        assert_eq!(key.len(), 1);
        assert!(key[0].is_string());
    }

    #[test]
    fn test_transform_does_not_mutate_input() {
        let pipeline = KeyPipeline::new().with_identity(IdentityField::field("id"));
        let args = vec![json!([{"id": "b"}, {"id": "a"}])];
        let before = args.clone();
        let _ = pipeline.transform(&args);
        assert_eq!(args, before);
    }
}
