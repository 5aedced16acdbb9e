//! Memoized Function Module
//!
//! Wires the key pipeline, equality resolution, expiration, identity eviction
//! and statistics around a base store, and exposes the result as a callable.
//!
//! # Call flow
//! 1. Arguments go through the key pipeline
//! 2. In identity mode the key is hashed and its recency staged
//! 3. On a hit the entry is promoted and the hit handlers run
//! 4. On a miss the function runs without the lock held, the value is
//!    inserted and the add handlers run
//! 5. Removals requested by handlers are applied last, each one cancelling
//!    the timer attached to the removed key

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::cache::{
    CacheEvent, CacheHook, CacheStore, Capacity, HookAction, HookContext, ProfileStats,
    StatsHook, StatsRegistry,
};
use crate::equality::{resolve_arg_equality, resolve_key_matching, EqualityOptions};
use crate::error::PolicyError;
use crate::key::{Key, KeyPipeline};
use crate::memoize::{MemoizeOptions, UpdateWhenFn};
use crate::policy::{
    ExpirationInfo, ExpirationManager, ExpireDecision, IdentityEviction, KeyAccess, OnExpireFn,
};

type MemoizedFn<R> = Arc<dyn Fn(&[Value]) -> R + Send + Sync>;

// == Hook Chain ==
/// Lifecycle handlers in their fixed invocation order.
struct HookChain<R> {
    user: Vec<Box<dyn CacheHook<R>>>,
    expiration: Option<ExpirationManager>,
    stats: Option<StatsHook>,
    eviction: Option<IdentityEviction>,
}

impl<R> HookChain<R> {
    fn each(&mut self, mut visit: impl FnMut(&mut dyn CacheHook<R>)) {
        for hook in self.user.iter_mut() {
            visit(hook.as_mut());
        }
        if let Some(expiration) = self.expiration.as_mut() {
            visit(expiration);
        }
        if let Some(stats) = self.stats.as_mut() {
            visit(stats);
        }
        if let Some(eviction) = self.eviction.as_mut() {
            visit(eviction);
        }
    }
}

// == Inner State ==
/// Everything guarded by the per-function lock.
struct Inner<R> {
    store: CacheStore<R>,
    hooks: HookChain<R>,
    on_expire: Option<OnExpireFn>,
}

impl<R: Clone> Inner<R> {
    fn stage(&self, key: &Key) -> Option<KeyAccess> {
        self.hooks.eviction.as_ref().map(|eviction| eviction.stage(key))
    }

    /// Runs the add or hit handlers for the entry at `index`.
    fn dispatch(&mut self, event: CacheEvent, index: usize, access: Option<&KeyAccess>) {
        let Inner { store, hooks, .. } = self;
        let ctx = HookContext {
            snapshot: store.snapshot(),
            index,
            access,
        };

        let mut evict = Vec::new();
        hooks.each(|hook| {
            let action = match event {
                CacheEvent::Add => hook.on_add(&ctx),
                CacheEvent::Hit => hook.on_hit(&ctx),
                CacheEvent::Change => {
                    hook.on_change(ctx.snapshot);
                    HookAction::Keep
                }
            };
            if let HookAction::Evict(indices) = action {
                evict.extend(indices);
            }
        });

        self.evict(evict);
    }

    fn notify_change(&mut self) {
        self.dispatch(CacheEvent::Change, 0, None);
    }

    /// Removes snapshot indices, highest first.
    fn evict(&mut self, mut indices: Vec<usize>) {
        if indices.is_empty() {
            return;
        }
        indices.sort_unstable();
        indices.dedup();

        for index in indices.into_iter().rev() {
            if let Some((key, _)) = self.store.remove_at(index) {
                self.removed(&key);
                self.notify_change();
            }
        }
    }

    /// Tells every handler that `key` left the store.
    fn removed(&mut self, key: &Key) {
        self.hooks.each(|hook| hook.on_remove(key));
    }

    /// Serves a hit on the entry at `index`.
    fn hit(&mut self, index: usize, access: Option<&KeyAccess>) -> Option<R> {
        let reordered = self.store.promote(index);
        let value = self.store.value(0).cloned()?;

        self.dispatch(CacheEvent::Hit, 0, access);
        if reordered {
            self.notify_change();
        }
        Some(value)
    }

    /// Stores a freshly computed value for `key`.
    fn store_value(&mut self, key: Key, value: R, access: Option<&KeyAccess>) {
        match self.store.find(&key) {
            Some(index) => {
                self.store.replace(index, value);
                self.store.promote(index);
            }
            None => {
                for trimmed in self.store.insert(key, value) {
                    self.removed(&trimmed);
                }
            }
        }

        self.dispatch(CacheEvent::Add, 0, access);
        self.notify_change();
    }

    fn clear(&mut self) {
        self.store.clear();
        self.hooks.each(|hook| hook.on_clear());
        self.notify_change();
    }
}

// == Expiry Path ==
/// Handles an elapsed timer. Runs on the timer task, as its own top-level call.
fn expire_entry<R: Clone>(inner: &Mutex<Inner<R>>, id: u64) {
    let (key, value, on_expire) = {
        let mut guard = inner.lock();
        let Some(key) = guard
            .hooks
            .expiration
            .as_mut()
            .and_then(|manager| manager.take_fired(id))
        else {
            return;
        };

        // Timers are keyed by the stored key, so match it exactly
        let value = match guard.store.position(&key) {
            Some(index) => guard.store.remove_at(index).map(|(_, value)| value),
            None => None,
        };
        if value.is_some() {
            guard.removed(&key);
            guard.notify_change();
        }

        let rendered = Value::Array(key.clone());
        info!(id, key = %rendered, "entry expired");
        (key, value, guard.on_expire.clone())
    };

    let Some(on_expire) = on_expire else {
        return;
    };

    match on_expire(&key) {
        Ok(ExpireDecision::Expire) => {}
        Ok(ExpireDecision::Renew) => {
            let Some(value) = value else {
                return;
            };
            let mut guard = inner.lock();
            if guard.store.position(&key).is_none() {
                for trimmed in guard.store.insert(key.clone(), value) {
                    guard.removed(&trimmed);
                }
            }
            if let Some(manager) = guard.hooks.expiration.as_mut() {
                manager.schedule(&key);
            }
            guard.notify_change();
            debug!(id, "expiry callback renewed entry");
        }
        Err(err) => PolicyError::from(err).report(),
    }
}

// == Profile Names ==
/// Derives a profile name from the wrapped function's type name.
///
/// Named functions yield their last path segment; closures yield nothing.
fn derive_profile_name<F>() -> Option<String> {
    let full = type_name::<F>();
    if full.contains('(') {
        return None;
    }
    let path = full.split('<').next()?;
    let name = path.rsplit("::").next()?;
    if name.is_empty() || name.contains('{') {
        None
    } else {
        Some(name.to_string())
    }
}

// == Memoized ==
/// A function wrapped with a configurable memoization policy.
///
/// Clones share the same cache.
pub struct Memoized<R> {
    inner: Arc<Mutex<Inner<R>>>,
    func: MemoizedFn<R>,
    pipeline: Arc<KeyPipeline>,
    update_when: Option<UpdateWhenFn>,
    profile_name: Arc<str>,
    stats: Option<StatsRegistry>,
}

impl<R> Clone for Memoized<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            func: Arc::clone(&self.func),
            pipeline: Arc::clone(&self.pipeline),
            update_when: self.update_when.clone(),
            profile_name: Arc::clone(&self.profile_name),
            stats: self.stats.clone(),
        }
    }
}

impl<R: Clone + Send + 'static> Memoized<R> {
    // == Constructors ==
    /// Memoizes `func` with default options.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&[Value]) -> R + Send + Sync + 'static,
    {
        Self::with_options(func, MemoizeOptions::new())
    }

    /// Memoizes `func` with `options`.
    ///
    /// Invalid option combinations are reported and normalized, never fatal.
    pub fn with_options<F>(func: F, options: MemoizeOptions<R>) -> Self
    where
        F: Fn(&[Value]) -> R + Send + Sync + 'static,
    {
        for problem in options.validate() {
            problem.report();
        }

        let profile_name = options
            .profile_name
            .clone()
            .or_else(derive_profile_name::<F>)
            .unwrap_or_else(|| match &options.stats {
                Some(registry) => registry.anonymous_profile_name(),
                None => "Anonymous".to_string(),
            });

        let identity_mode = options.identity.is_some();
        let max_size = options.max_size.filter(|size| *size > 0);

        let mut pipeline = KeyPipeline::new();
        if let Some(serializer) = options.serializer {
            pipeline = pipeline.with_serializer(serializer);
        }
        if let Some(transform) = options.transform_args {
            pipeline = pipeline.with_transform(transform);
        }
        if let Some(identity) = options.identity {
            pipeline = pipeline.with_identity(identity);
        }
        if let Some(max_args) = options.max_args {
            pipeline = pipeline.with_max_args(max_args);
        }

        let equality = EqualityOptions {
            arg_equality: options.arg_equality,
            deep: options.deep_equality,
            shallow: options.shallow_equality,
            key_matcher: options.key_matcher,
            serialized: pipeline.is_serialized(),
            identity: identity_mode,
        };

        let capacity = if identity_mode {
            Capacity::Unbounded
        } else {
            Capacity::Bounded(max_size.unwrap_or(options.default_max_size))
        };
        let store = CacheStore::new(
            capacity,
            resolve_arg_equality(&equality),
            resolve_key_matching(&equality),
        );

        let runtime = options.runtime.or_else(|| Handle::try_current().ok());
        let expiration = options
            .time_to_live
            .map(|ttl| ExpirationManager::new(ttl, options.renew_on_access, runtime));
        let stats = options
            .stats
            .clone()
            .map(|registry| StatsHook::new(registry, profile_name.clone()));
        let eviction = identity_mode.then(|| IdentityEviction::new(max_size));
        let user = options.hooks;
        let on_expire = options.on_expire;

        debug!(
            profile = %profile_name,
            identity_mode,
            ?capacity,
            identity_bound = ?max_size.filter(|_| identity_mode),
            "memoized function built"
        );

        let inner = Arc::new_cyclic(|weak: &Weak<Mutex<Inner<R>>>| {
            let mut expiration = expiration;
            if let Some(manager) = expiration.as_mut() {
                let weak = weak.clone();
                manager.set_fire(Arc::new(move |id| {
                    if let Some(inner) = weak.upgrade() {
                        expire_entry(&inner, id);
                    }
                }));
            }

            Mutex::new(Inner {
                store,
                hooks: HookChain {
                    user,
                    expiration,
                    stats,
                    eviction,
                },
                on_expire,
            })
        });

        Self {
            inner,
            func: Arc::new(func),
            pipeline: Arc::new(pipeline),
            update_when: options.update_when,
            profile_name: Arc::from(profile_name),
            stats: options.stats,
        }
    }

    // == Call ==
    /// Calls the wrapped function, or answers from the cache.
    pub fn call(&self, args: &[Value]) -> R {
        let key = self.pipeline.transform(args);
        let refresh = self
            .update_when
            .as_ref()
            .is_some_and(|predicate| predicate(args));

        let access = {
            let mut inner = self.inner.lock();
            let access = inner.stage(&key);

            if let Some(index) = inner.store.find(&key) {
                if !refresh {
                    if let Some(value) = inner.hit(index, access.as_ref()) {
                        debug!(profile = %self.profile_name, "cache hit");
                        return value;
                    }
                }
            }
            access
        };

        debug!(profile = %self.profile_name, refresh, "cache miss");
        let value = (self.func)(args);

        self.inner
            .lock()
            .store_value(key, value.clone(), access.as_ref());
        value
    }

    // == Clear ==
    /// Removes every entry, cancels every timer and forgets all recency.
    pub fn clear(&self) {
        self.inner.lock().clear();
        info!(profile = %self.profile_name, "cache cleared");
    }

    // == Direct Access ==
    /// Returns true if the arguments map to a cached entry.
    pub fn has(&self, args: &[Value]) -> bool {
        let key = self.pipeline.transform(args);
        self.inner.lock().store.find(&key).is_some()
    }

    /// Returns the cached value without calling the function or touching recency.
    pub fn peek(&self, args: &[Value]) -> Option<R> {
        let key = self.pipeline.transform(args);
        let inner = self.inner.lock();
        let index = inner.store.find(&key)?;
        inner.store.value(index).cloned()
    }

    /// Caches `value` for the arguments without calling the function.
    ///
    /// Returns false if the arguments were already cached.
    pub fn set(&self, args: &[Value], value: R) -> bool {
        let key = self.pipeline.transform(args);
        let mut inner = self.inner.lock();
        if inner.store.find(&key).is_some() {
            return false;
        }
        let access = inner.stage(&key);
        inner.store_value(key, value, access.as_ref());
        true
    }

    /// Replaces the cached value for the arguments.
    ///
    /// Returns false if the arguments were not cached.
    pub fn update(&self, args: &[Value], value: R) -> bool {
        let key = self.pipeline.transform(args);
        let mut inner = self.inner.lock();
        let Some(index) = inner.store.find(&key) else {
            return false;
        };
        inner.store.replace(index, value);
        inner.store.promote(index);
        inner.notify_change();
        true
    }

    /// Removes the entry for the arguments, cancelling its timer.
    pub fn remove(&self, args: &[Value]) -> bool {
        let key = self.pipeline.transform(args);
        let mut inner = self.inner.lock();
        let Some(index) = inner.store.find(&key) else {
            return false;
        };
        inner.evict(vec![index]);
        true
    }

    // == Introspection ==
    /// Number of cached entries.
    pub fn size(&self) -> usize {
        self.inner.lock().store.len()
    }

    /// Cached keys, most recent first.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.lock().store.keys().to_vec()
    }

    /// Cached values, aligned with [`Memoized::keys`].
    pub fn values(&self) -> Vec<R> {
        self.inner.lock().store.values().to_vec()
    }

    /// Outstanding expiration timers.
    pub fn expirations(&self) -> Vec<ExpirationInfo> {
        self.inner
            .lock()
            .hooks
            .expiration
            .as_ref()
            .map(ExpirationManager::infos)
            .unwrap_or_default()
    }

    /// Name the statistics of this function are recorded under.
    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    /// Statistics of this function's profile, when a registry is attached.
    pub fn stats(&self) -> Option<ProfileStats> {
        self.stats
            .as_ref()
            .and_then(|registry| registry.profile(&self.profile_name))
    }
}

impl<R> fmt::Debug for Memoized<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("profile_name", &self.profile_name)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
