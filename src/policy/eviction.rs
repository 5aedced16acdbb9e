//! Identity Eviction Module
//!
//! Recency bookkeeping and size enforcement for identity-keyed caches.
//!
//! Recency is tracked per content hash of the normalized key, never per store
//! slot, so reordering the store or matching set-equivalent keys cannot
//! corrupt it.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheHook, HookAction, HookContext};
use crate::error::PolicyError;
use crate::key::{hash_key, Key, KeyHash};

// == Key Access ==
/// Recency staging computed for one lookup.
///
/// Produced by [`IdentityEviction::stage`] right after the key transform and
/// handed to the hit or add handler of the same call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAccess {
    /// Content hash of the normalized key
    pub hash: KeyHash,
    /// Recency value recorded at this hash before the lookup, if any
    pub previous: Option<u64>,
}

// == Identity Eviction ==
/// Logical size bound with its own least-recently-used ordering.
#[derive(Debug, Default)]
pub struct IdentityEviction {
    /// Maximum number of entries, `None` = unbounded
    bound: Option<usize>,
    /// Monotonic recency clock
    usage_counter: u64,
    /// Recency value at last touch, per key hash.
    ///
    /// Entries outlive eviction so a returning key is recognized; the map is
    /// only emptied by [`IdentityEviction::reset`] and otherwise grows with
    /// every distinct key ever seen.
    last_access: HashMap<KeyHash, u64>,
}

impl IdentityEviction {
    // == Constructor ==
    /// Creates the policy. A zero bound means unbounded.
    pub fn new(bound: Option<usize>) -> Self {
        Self {
            bound: bound.filter(|b| *b > 0),
            ..Self::default()
        }
    }

    // == Stage ==
    /// Hashes a normalized key and reads its previous recency value.
    pub fn stage(&self, key: &[Value]) -> KeyAccess {
        let hash = hash_key(key);
        let previous = self.last_access.get(&hash).copied();
        KeyAccess { hash, previous }
    }

    // == Touch ==
    /// Advances the clock and records it for the staged key.
    pub fn touch(&mut self, access: &KeyAccess) -> u64 {
        self.usage_counter += 1;
        self.last_access
            .insert(access.hash.clone(), self.usage_counter);
        self.usage_counter
    }

    // == Select Victims ==
    /// Picks the entries to remove so that at most `bound` remain.
    ///
    /// The entry matching `access` is never picked. When the staged key had no
    /// previous recency the lowest recency loses (plain LRU); when it had one
    /// the highest recency loses instead. Returns snapshot indices in the
    /// order they were chosen.
    pub fn select_victims(&self, keys: &[Key], access: &KeyAccess) -> Vec<usize> {
        let Some(bound) = self.bound else {
            return Vec::new();
        };

        let hashes: Vec<KeyHash> = keys.iter().map(|key| hash_key(key)).collect();
        let mut chosen = vec![false; keys.len()];
        let mut remaining = keys.len();
        let mut victims = Vec::new();

        while remaining > bound {
            let mut candidate: Option<(usize, u64)> = None;

            for (index, hash) in hashes.iter().enumerate() {
                if chosen[index] || *hash == access.hash {
                    continue;
                }

                let recency = self.last_access.get(hash).copied().unwrap_or(0);
                match candidate {
                    Some((_, best)) if !should_replace(access.previous, recency, best) => {}
                    _ => candidate = Some((index, recency)),
                }
            }

            let Some((index, recency)) = candidate else {
                let err = PolicyError::EmptyStore(format!("{remaining} entries left, bound {bound}"));
                debug!(error = %err, "eviction scan stopped");
                break;
            };

            debug!(index, recency, hash = %hashes[index], "identity eviction");
            chosen[index] = true;
            remaining -= 1;
            victims.push(index);
        }

        victims
    }

    // == Resolve ==
    /// Recency access for the stored key an event is about.
    ///
    /// A lookup can match a stored key whose hash differs from the incoming
    /// one (`1` against `1.0`), so recency is always recorded under the
    /// stored key.
    fn resolve<R>(&self, ctx: &HookContext<'_, R>) -> Option<KeyAccess> {
        let staged = ctx.access?;
        let Some(stored) = ctx.key() else {
            return Some(staged.clone());
        };

        let hash = hash_key(stored);
        if hash == staged.hash {
            return Some(staged.clone());
        }
        let previous = self.last_access.get(&hash).copied();
        Some(KeyAccess { hash, previous })
    }

    // == Reset ==
    /// Forgets every recency value.
    pub fn reset(&mut self) {
        self.usage_counter = 0;
        self.last_access.clear();
    }

    // == Accessors ==
    /// Logical size bound.
    pub fn bound(&self) -> Option<usize> {
        self.bound
    }

    /// Current value of the recency clock.
    pub fn usage_counter(&self) -> u64 {
        self.usage_counter
    }

    /// Recency value recorded for `hash`.
    pub fn last_access(&self, hash: &KeyHash) -> Option<u64> {
        self.last_access.get(hash).copied()
    }
}

fn should_replace(previous: Option<u64>, recency: u64, best: u64) -> bool {
    match previous {
        None => recency < best,
        Some(_) => recency > best,
    }
}

impl<R> CacheHook<R> for IdentityEviction {
    fn on_hit(&mut self, ctx: &HookContext<'_, R>) -> HookAction {
        if let Some(access) = self.resolve(ctx) {
            self.touch(&access);
        }
        HookAction::Keep
    }

    fn on_add(&mut self, ctx: &HookContext<'_, R>) -> HookAction {
        let Some(access) = self.resolve(ctx) else {
            return HookAction::Keep;
        };

        self.touch(&access);

        let victims = self.select_victims(ctx.snapshot.keys, &access);
        if victims.is_empty() {
            HookAction::Keep
        } else {
            HookAction::Evict(victims)
        }
    }

    fn on_clear(&mut self) {
        self.reset();
    }
}
