//! Cache Hooks Module
//!
//! Lifecycle handlers invoked synchronously, in a fixed order, whenever the
//! store adds, hits, changes, removes or clears entries.

use crate::key::Key;
use crate::policy::KeyAccess;

// == Store Snapshot ==
/// Read-only view of the store's ordered keys and values.
///
/// Index 0 is the most recently touched entry.
#[derive(Debug)]
pub struct StoreSnapshot<'a, R> {
    /// Current keys, most recent first
    pub keys: &'a [Key],
    /// Values aligned with `keys`
    pub values: &'a [R],
}

impl<'a, R> StoreSnapshot<'a, R> {
    /// Number of entries in the snapshot.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true when the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<R> Clone for StoreSnapshot<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for StoreSnapshot<'_, R> {}

// == Hook Context ==
/// What a handler is told about the entry that triggered it.
#[derive(Debug)]
pub struct HookContext<'a, R> {
    /// Store state at the time of the event
    pub snapshot: StoreSnapshot<'a, R>,
    /// Index of the entry that was added or hit
    pub index: usize,
    /// Recency staging for this lookup, present in identity mode
    pub access: Option<&'a KeyAccess>,
}

impl<'a, R> HookContext<'a, R> {
    /// The stored key the event is about.
    pub fn key(&self) -> Option<&'a Key> {
        self.snapshot.keys.get(self.index)
    }
}

// == Hook Action ==
/// A handler's only permitted side effect on the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HookAction {
    /// Leave the store as is
    #[default]
    Keep,
    /// Remove the entries at these snapshot indices
    Evict(Vec<usize>),
}

// == Cache Hook Trait ==
/// A pluggable lifecycle handler.
///
/// Every method has a no-op default so handlers implement only what they
/// react to.
pub trait CacheHook<R>: Send {
    /// A new entry was inserted at `ctx.index`.
    fn on_add(&mut self, _ctx: &HookContext<'_, R>) -> HookAction {
        HookAction::Keep
    }

    /// An existing entry was found at `ctx.index`.
    fn on_hit(&mut self, _ctx: &HookContext<'_, R>) -> HookAction {
        HookAction::Keep
    }

    /// The store contents or order changed.
    fn on_change(&mut self, _snapshot: StoreSnapshot<'_, R>) {}

    /// An entry left the store for any reason other than a wholesale clear.
    fn on_remove(&mut self, _key: &Key) {}

    /// Every entry was removed.
    fn on_clear(&mut self) {}
}

// == Closure Hook ==
/// Which lifecycle event a [`FnHook`] listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Add,
    Hit,
    Change,
}

type SnapshotFn<R> = Box<dyn FnMut(StoreSnapshot<'_, R>) + Send>;

/// Adapts a plain closure observing the store into a [`CacheHook`].
pub struct FnHook<R> {
    event: CacheEvent,
    callback: SnapshotFn<R>,
}

impl<R> FnHook<R> {
    /// Creates a hook calling `callback` on every `event`.
    pub fn new<F>(event: CacheEvent, callback: F) -> Self
    where
        F: FnMut(StoreSnapshot<'_, R>) + Send + 'static,
    {
        Self {
            event,
            callback: Box::new(callback),
        }
    }
}

impl<R> CacheHook<R> for FnHook<R> {
    fn on_add(&mut self, ctx: &HookContext<'_, R>) -> HookAction {
        if self.event == CacheEvent::Add {
            (self.callback)(ctx.snapshot);
        }
        HookAction::Keep
    }

    fn on_hit(&mut self, ctx: &HookContext<'_, R>) -> HookAction {
        if self.event == CacheEvent::Hit {
            (self.callback)(ctx.snapshot);
        }
        HookAction::Keep
    }

    fn on_change(&mut self, snapshot: StoreSnapshot<'_, R>) {
        if self.event == CacheEvent::Change {
            (self.callback)(snapshot);
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_context_key_lookup() {
        let keys = vec![vec![json!(1)], vec![json!(2)]];
        let values = vec!["one", "two"];
        let ctx = HookContext {
            snapshot: StoreSnapshot {
                keys: &keys,
                values: &values,
            },
            index: 1,
            access: None,
        };
        assert_eq!(ctx.key(), Some(&vec![json!(2)]));
        assert_eq!(ctx.snapshot.len(), 2);
    }

    #[test]
    fn test_fn_hook_only_fires_for_its_event() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let mut hook = FnHook::new(CacheEvent::Hit, move |snapshot: StoreSnapshot<'_, u32>| {
            counter.fetch_add(snapshot.len(), Ordering::SeqCst);
        });

        let keys = vec![vec![json!("k")]];
        let values = vec![1u32];
        let ctx = HookContext {
            snapshot: StoreSnapshot {
                keys: &keys,
                values: &values,
            },
            index: 0,
            access: None,
        };

        assert_eq!(hook.on_add(&ctx), HookAction::Keep);
        hook.on_change(ctx.snapshot);
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        hook.on_hit(&ctx);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
