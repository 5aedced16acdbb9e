//! Memoize Options Module
//!
//! Builder for everything a memoized function can be configured with.
//! Precedence between overlapping options is resolved once, at build time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;

use crate::cache::{CacheEvent, CacheHook, FnHook, StatsRegistry, StoreSnapshot, DEFAULT_MAX_SIZE};
use crate::config::Config;
use crate::equality::{ArgEqualFn, KeyMatchFn};
use crate::error::PolicyError;
use crate::key::{IdentityField, Key, SerializeFn, Serializer, TransformFn};
use crate::memoize::Memoized;
use crate::policy::{ExpireDecision, OnExpireFn};

/// Decides, from the raw arguments, whether a cached value must be recomputed.
pub type UpdateWhenFn = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

// == Memoize Options ==
/// Configuration of one memoized function.
pub struct MemoizeOptions<R> {
    pub(crate) identity: Option<IdentityField>,
    pub(crate) time_to_live: Option<Duration>,
    pub(crate) renew_on_access: bool,
    pub(crate) on_expire: Option<OnExpireFn>,
    pub(crate) arg_equality: Option<ArgEqualFn>,
    pub(crate) deep_equality: bool,
    pub(crate) shallow_equality: bool,
    pub(crate) key_matcher: Option<KeyMatchFn>,
    pub(crate) serializer: Option<Serializer>,
    pub(crate) transform_args: Option<TransformFn>,
    pub(crate) max_args: Option<usize>,
    pub(crate) max_size: Option<usize>,
    pub(crate) default_max_size: usize,
    pub(crate) profile_name: Option<String>,
    pub(crate) stats: Option<StatsRegistry>,
    pub(crate) update_when: Option<UpdateWhenFn>,
    pub(crate) hooks: Vec<Box<dyn CacheHook<R>>>,
    pub(crate) runtime: Option<Handle>,
}

impl<R> Default for MemoizeOptions<R> {
    fn default() -> Self {
        Self {
            identity: None,
            time_to_live: None,
            renew_on_access: false,
            on_expire: None,
            arg_equality: None,
            deep_equality: false,
            shallow_equality: false,
            key_matcher: None,
            serializer: None,
            transform_args: None,
            max_args: None,
            max_size: None,
            default_max_size: DEFAULT_MAX_SIZE,
            profile_name: None,
            stats: None,
            update_when: None,
            hooks: Vec::new(),
            runtime: None,
        }
    }
}

impl<R: Clone + Send + 'static> MemoizeOptions<R> {
    // == Constructors ==
    /// Options with every feature off: identity equality, one entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options seeded from the process configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut options = Self {
            default_max_size: config.default_max_size.max(1),
            ..Self::default()
        };
        if config.default_ttl_ms > 0 {
            options.time_to_live = Some(Duration::from_millis(config.default_ttl_ms));
        }
        options
    }

    // == Key Derivation ==
    /// Keys the first argument by the identities of its elements.
    pub fn identity_field(mut self, identity: impl Into<IdentityField>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Keys the first argument by identities computed with `extract`.
    pub fn identity_with<F>(self, extract: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.identity_field(IdentityField::extractor(extract))
    }

    /// Serializes all arguments into a single string key.
    pub fn serialize(mut self) -> Self {
        self.serializer = Some(Serializer::new());
        self
    }

    /// Serializes all arguments with a custom encoder.
    pub fn serializer<F>(mut self, encode: F) -> Self
    where
        F: Fn(&[Value]) -> String + Send + Sync + 'static,
    {
        let encode: SerializeFn = Arc::new(encode);
        self.serializer = Some(Serializer::with(encode));
        self
    }

    /// Rewrites the arguments before they are used as a key.
    pub fn transform_args<F>(mut self, transform: F) -> Self
    where
        F: Fn(Key) -> Key + Send + Sync + 'static,
    {
        self.transform_args = Some(Arc::new(transform));
        self
    }

    /// Only the first `count` arguments take part in the key.
    pub fn max_arg_count(mut self, count: usize) -> Self {
        self.max_args = Some(count);
        self
    }

    // == Equality ==
    /// Compares arguments with a custom function.
    pub fn arg_equality<F>(mut self, equals: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.arg_equality = Some(Arc::new(equals));
        self
    }

    /// Compares arguments structurally, at any depth.
    pub fn deep_equality(mut self) -> Self {
        self.deep_equality = true;
        self
    }

    /// Compares arguments structurally, one level deep.
    pub fn shallow_equality(mut self) -> Self {
        self.shallow_equality = true;
        self
    }

    /// Compares whole keys with a custom function.
    pub fn key_matcher<F>(mut self, matches: F) -> Self
    where
        F: Fn(&[Value], &[Value]) -> bool + Send + Sync + 'static,
    {
        self.key_matcher = Some(Arc::new(matches));
        self
    }

    // == Size & Lifetime ==
    /// Maximum number of cached entries.
    ///
    /// In identity mode this becomes the identity eviction bound and the
    /// store itself is left unbounded.
    pub fn capacity_bound(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Removes the size bound entirely.
    pub fn unbounded(mut self) -> Self {
        self.max_size = None;
        self.default_max_size = usize::MAX;
        self
    }

    /// Entries expire `ttl` after insertion.
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Hits restart the expiration timer.
    pub fn renew_on_access(mut self, renew: bool) -> Self {
        self.renew_on_access = renew;
        self
    }

    /// Called with the key of every expired entry.
    pub fn on_expire<F>(mut self, on_expire: F) -> Self
    where
        F: Fn(&Key) -> anyhow::Result<ExpireDecision> + Send + Sync + 'static,
    {
        self.on_expire = Some(Arc::new(on_expire));
        self
    }

    /// Recompute the value of a cached key whenever `predicate` accepts the arguments.
    pub fn update_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        self.update_when = Some(Arc::new(predicate));
        self
    }

    /// Spawns expiration timers on `runtime` instead of the ambient one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    // == Statistics ==
    /// Name the statistics of this function are recorded under.
    pub fn profile_name(mut self, name: impl Into<String>) -> Self {
        self.profile_name = Some(name.into());
        self
    }

    /// Records calls and hits into `registry`.
    pub fn stats(mut self, registry: StatsRegistry) -> Self {
        self.stats = Some(registry);
        self
    }

    // == Hooks ==
    /// Appends a lifecycle handler. User handlers run before the built-in ones.
    pub fn hook(mut self, hook: impl CacheHook<R> + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Observes every insertion.
    pub fn on_cache_add<F>(self, callback: F) -> Self
    where
        F: FnMut(StoreSnapshot<'_, R>) + Send + 'static,
    {
        self.hook(FnHook::new(CacheEvent::Add, callback))
    }

    /// Observes every hit.
    pub fn on_cache_hit<F>(self, callback: F) -> Self
    where
        F: FnMut(StoreSnapshot<'_, R>) + Send + 'static,
    {
        self.hook(FnHook::new(CacheEvent::Hit, callback))
    }

    /// Observes every change of contents or order.
    pub fn on_cache_change<F>(self, callback: F) -> Self
    where
        F: FnMut(StoreSnapshot<'_, R>) + Send + 'static,
    {
        self.hook(FnHook::new(CacheEvent::Change, callback))
    }

    // == Validation ==
    /// Lists the option combinations that will be normalized at build time.
    pub fn validate(&self) -> Vec<PolicyError> {
        let mut problems = Vec::new();

        if self.max_size == Some(0) {
            problems.push(PolicyError::InvalidOption(
                "capacity bound of 0 ignored, using the default".to_string(),
            ));
        }
        if self.identity.is_some() && self.serializer.is_some() {
            problems.push(PolicyError::InvalidOption(
                "identity field has no effect on serialized keys".to_string(),
            ));
        }
        if self.time_to_live.is_none() && (self.renew_on_access || self.on_expire.is_some()) {
            problems.push(PolicyError::InvalidOption(
                "renew_on_access and on_expire require a time-to-live".to_string(),
            ));
        }
        if self.deep_equality && self.shallow_equality {
            problems.push(PolicyError::InvalidOption(
                "both deep and shallow equality requested, deep wins".to_string(),
            ));
        }

        problems
    }

    // == Build ==
    /// Wraps `func` into a memoized function.
    pub fn build<F>(self, func: F) -> Memoized<R>
    where
        F: Fn(&[Value]) -> R + Send + Sync + 'static,
    {
        Memoized::with_options(func, self)
    }
}

impl<R> fmt::Debug for MemoizeOptions<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizeOptions")
            .field("identity", &self.identity)
            .field("time_to_live", &self.time_to_live)
            .field("renew_on_access", &self.renew_on_access)
            .field("deep_equality", &self.deep_equality)
            .field("shallow_equality", &self.shallow_equality)
            .field("serialized", &self.serializer.is_some())
            .field("max_args", &self.max_args)
            .field("max_size", &self.max_size)
            .field("profile_name", &self.profile_name)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        let options: MemoizeOptions<u32> = MemoizeOptions::new();
        assert!(options.validate().is_empty());
        assert_eq!(options.default_max_size, DEFAULT_MAX_SIZE);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let options: MemoizeOptions<u32> = MemoizeOptions::new()
            .capacity_bound(0)
            .identity_field("id")
            .serialize()
            .renew_on_access(true)
            .deep_equality()
            .shallow_equality();

        let problems = options.validate();
        assert_eq!(problems.len(), 4);
        assert!(problems
            .iter()
            .all(|p| matches!(p, PolicyError::InvalidOption(_))));
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            stats_enabled: true,
            default_max_size: 5,
            default_ttl_ms: 250,
        };
        let options: MemoizeOptions<u32> = MemoizeOptions::from_config(&config);
        assert_eq!(options.default_max_size, 5);
        assert_eq!(options.time_to_live, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_identity_field_from_str() {
        let options: MemoizeOptions<u32> = MemoizeOptions::new().identity_field("id");
        assert!(matches!(options.identity, Some(IdentityField::Field(ref f)) if f == "id"));
    }
}
