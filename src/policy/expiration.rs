//! Expiration Module
//!
//! Time-to-live timers for cache entries, driven by tokio.
//!
//! Each live entry with a finite time-to-live owns one timer task. A timer is
//! cancelled synchronously whenever its entry leaves the store, so a late
//! timer can never remove a newer entry that reused the same key.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::cache::{CacheHook, HookAction, HookContext};
use crate::error::PolicyError;
use crate::key::{hash_key, Key, KeyHash};

/// What the expiry callback wants done with the entry that just expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpireDecision {
    /// Keep the entry removed
    #[default]
    Expire,
    /// Put the entry back and restart its timer
    Renew,
}

/// Callback invoked with the key of an expired entry.
pub type OnExpireFn = Arc<dyn Fn(&Key) -> anyhow::Result<ExpireDecision> + Send + Sync>;

/// Called from the timer task with the id of the expiration that elapsed.
pub type FireFn = Arc<dyn Fn(u64) + Send + Sync>;

// == Expiration Info ==
/// Introspection view of one scheduled expiration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpirationInfo {
    /// Key the timer belongs to
    pub key: Key,
    /// When the timer was (re)started
    pub scheduled_at: DateTime<Utc>,
    /// When the timer fires
    pub expires_at: DateTime<Utc>,
    /// Whether hits restart the timer
    pub renew_on_access: bool,
}

impl ExpirationInfo {
    /// Returns remaining time in milliseconds, 0 once elapsed.
    pub fn remaining_ms(&self) -> u64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_milliseconds().max(0) as u64
    }
}

// == Expiration ==
struct Expiration {
    id: u64,
    hash: KeyHash,
    key: Key,
    scheduled_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    timer: AbortHandle,
}

// == Expiration Manager ==
/// Owns every outstanding timer of one memoized function.
pub struct ExpirationManager {
    ttl: Duration,
    renew_on_access: bool,
    runtime: Option<Handle>,
    fire: Option<FireFn>,
    next_id: u64,
    expirations: Vec<Expiration>,
    warned_missing_runtime: bool,
}

impl ExpirationManager {
    // == Constructor ==
    /// Creates a manager for entries living `ttl`.
    ///
    /// # Arguments
    /// * `ttl` - Time-to-live of every entry
    /// * `renew_on_access` - Restart the timer on every hit
    /// * `runtime` - Runtime the timer tasks are spawned on
    pub fn new(ttl: Duration, renew_on_access: bool, runtime: Option<Handle>) -> Self {
        Self {
            ttl,
            renew_on_access,
            runtime,
            fire: None,
            next_id: 0,
            expirations: Vec::new(),
            warned_missing_runtime: false,
        }
    }

    /// Installs the callback timer tasks report to.
    pub fn set_fire(&mut self, fire: FireFn) {
        self.fire = Some(fire);
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // == Schedule ==
    /// Starts the timer for `key`, replacing any timer it already had.
    pub fn schedule(&mut self, key: &Key) {
        let Some(runtime) = self.runtime.clone() else {
            if !self.warned_missing_runtime {
                self.warned_missing_runtime = true;
                PolicyError::MissingRuntime(
                    "time-to-live ignored, build the memoized function inside a tokio runtime"
                        .to_string(),
                )
                .report();
            }
            return;
        };
        let Some(fire) = self.fire.clone() else {
            return;
        };

        self.cancel(key);

        let id = self.next_id;
        self.next_id += 1;

        let ttl = self.ttl;
        let timer = runtime
            .spawn(async move {
                tokio::time::sleep(ttl).await;
                fire(id);
            })
            .abort_handle();

        let scheduled_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| scheduled_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        debug!(id, ttl_ms = ttl.as_millis() as u64, "expiration scheduled");
        self.expirations.push(Expiration {
            id,
            hash: hash_key(key),
            key: key.clone(),
            scheduled_at,
            expires_at,
            timer,
        });
    }

    // == Renew ==
    /// Restarts the timer of `key` if one is outstanding.
    pub fn renew(&mut self, key: &Key) -> bool {
        let hash = hash_key(key);
        if self.expirations.iter().any(|e| e.hash == hash) {
            self.schedule(key);
            true
        } else {
            false
        }
    }

    // == Cancel ==
    /// Stops the timer of `key`. Returns true if one was outstanding.
    pub fn cancel(&mut self, key: &Key) -> bool {
        let hash = hash_key(key);
        let before = self.expirations.len();
        self.expirations.retain(|expiration| {
            if expiration.hash == hash {
                expiration.timer.abort();
                debug!(id = expiration.id, "expiration cancelled");
                false
            } else {
                true
            }
        });
        self.expirations.len() != before
    }

    /// Stops every outstanding timer.
    pub fn cancel_all(&mut self) {
        for expiration in self.expirations.drain(..) {
            expiration.timer.abort();
        }
    }

    // == Take Fired ==
    /// Claims the expiration whose timer elapsed.
    ///
    /// Returns `None` when it was cancelled or replaced in the meantime.
    pub fn take_fired(&mut self, id: u64) -> Option<Key> {
        let index = self.expirations.iter().position(|e| e.id == id)?;
        Some(self.expirations.remove(index).key)
    }

    // == Introspection ==
    /// Outstanding expirations, oldest first.
    pub fn infos(&self) -> Vec<ExpirationInfo> {
        self.expirations
            .iter()
            .map(|e| ExpirationInfo {
                key: e.key.clone(),
                scheduled_at: e.scheduled_at,
                expires_at: e.expires_at,
                renew_on_access: self.renew_on_access,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.expirations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expirations.is_empty()
    }
}

impl Drop for ExpirationManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl fmt::Debug for ExpirationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirationManager")
            .field("ttl", &self.ttl)
            .field("renew_on_access", &self.renew_on_access)
            .field("outstanding", &self.expirations.len())
            .finish()
    }
}

impl<R> CacheHook<R> for ExpirationManager {
    fn on_add(&mut self, ctx: &HookContext<'_, R>) -> HookAction {
        if let Some(key) = ctx.key() {
            self.schedule(key);
        }
        HookAction::Keep
    }

    fn on_hit(&mut self, ctx: &HookContext<'_, R>) -> HookAction {
        if self.renew_on_access {
            if let Some(key) = ctx.key() {
                self.renew(key);
            }
        }
        HookAction::Keep
    }

    fn on_remove(&mut self, key: &Key) {
        self.cancel(key);
    }

    fn on_clear(&mut self) {
        self.cancel_all();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recording_manager(ttl_ms: u64, renew: bool) -> (ExpirationManager, Arc<Mutex<Vec<u64>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let mut manager =
            ExpirationManager::new(Duration::from_millis(ttl_ms), renew, Some(Handle::current()));
        manager.set_fire(Arc::new(move |id| sink.lock().push(id)));
        (manager, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_ttl() {
        let (mut manager, fired) = recording_manager(100, false);
        manager.schedule(&vec![json!("k")]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*fired.lock(), vec![0]);
        assert_eq!(manager.take_fired(0), Some(vec![json!("k")]));
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (mut manager, fired) = recording_manager(100, false);
        let key = vec![json!("k")];
        manager.schedule(&key);

        assert!(manager.cancel(&key));
        assert!(!manager.cancel(&key));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_timer() {
        let (mut manager, fired) = recording_manager(100, true);
        let key = vec![json!("k")];
        manager.schedule(&key);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(manager.renew(&key));
        assert_eq!(manager.len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(*fired.lock(), vec![1]);
        assert_eq!(manager.take_fired(0), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let (mut manager, fired) = recording_manager(100, false);
        manager.schedule(&vec![json!(1)]);
        manager.schedule(&vec![json!(2)]);
        assert_eq!(manager.infos().len(), 2);

        manager.cancel_all();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(fired.lock().is_empty());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_missing_runtime_skips_scheduling() {
        let mut manager = ExpirationManager::new(Duration::from_millis(10), false, None);
        manager.set_fire(Arc::new(|_| {}));
        manager.schedule(&vec![json!("k")]);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_info_remaining() {
        let (mut manager, _) = recording_manager(60_000, false);
        manager.schedule(&vec![json!("k")]);

        let info = &manager.infos()[0];
        assert!(info.remaining_ms() <= 60_000);
        assert!(info.remaining_ms() >= 59_000);
        assert!(!info.renew_on_access);
    }
}
