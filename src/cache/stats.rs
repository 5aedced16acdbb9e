//! Cache Statistics Module
//!
//! Aggregates call and hit counts per profile name in an injectable registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::hooks::{CacheHook, HookAction, HookContext};
use crate::config::Config;

// == Stats Record ==
/// Call/hit counters for one profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsRecord {
    /// Number of calls through the memoized function
    pub calls: u64,
    /// Number of calls answered from the cache
    pub hits: u64,
}

impl StatsRecord {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / calls, or 0.0 if no calls have been made.
    pub fn hit_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.hits as f64 / self.calls as f64
        }
    }

    /// Hit rate as a percentage rounded to two decimals.
    pub fn usage(&self) -> f64 {
        (self.hit_rate() * 10_000.0).round() / 100.0
    }
}

// == Snapshots ==
/// Statistics of a single profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileStats {
    pub calls: u64,
    pub hits: u64,
    /// Hit percentage, 0-100
    pub usage: f64,
}

impl From<StatsRecord> for ProfileStats {
    fn from(record: StatsRecord) -> Self {
        Self {
            calls: record.calls,
            hits: record.hits,
            usage: record.usage(),
        }
    }
}

/// Statistics across every profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStats {
    pub calls: u64,
    pub hits: u64,
    pub usage: f64,
    pub profiles: HashMap<String, ProfileStats>,
}

// == Stats Registry ==
#[derive(Debug, Default)]
struct RegistryInner {
    collecting: AtomicBool,
    anonymous_counter: AtomicUsize,
    profiles: Mutex<HashMap<String, StatsRecord>>,
}

/// Shared handle to a set of profile counters.
///
/// Cloning the handle shares the same counters. Create one at process start
/// and pass it to every memoized function that should report into it.
#[derive(Debug, Clone, Default)]
pub struct StatsRegistry {
    inner: Arc<RegistryInner>,
}

impl StatsRegistry {
    // == Constructor ==
    /// Creates a registry, collecting or not.
    pub fn new(collecting: bool) -> Self {
        let registry = Self::default();
        registry.collect(collecting);
        registry
    }

    /// Creates a registry honoring the process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.stats_enabled)
    }

    // == Switch ==
    /// Starts or stops collection. Existing counters are kept.
    pub fn collect(&self, collecting: bool) {
        self.inner.collecting.store(collecting, Ordering::Relaxed);
    }

    /// Returns true while statistics are being collected.
    pub fn is_collecting(&self) -> bool {
        self.inner.collecting.load(Ordering::Relaxed)
    }

    // == Profile Names ==
    /// Hands out a fresh placeholder name for unnamed functions.
    pub fn anonymous_profile_name(&self) -> String {
        let n = self.inner.anonymous_counter.fetch_add(1, Ordering::Relaxed);
        format!("Anonymous {n}")
    }

    // == Recording ==
    /// Counts one call for `profile`.
    pub fn record_call(&self, profile: &str) {
        self.update(profile, |record| record.calls += 1);
    }

    /// Counts one call answered from the cache for `profile`.
    pub fn record_hit(&self, profile: &str) {
        self.update(profile, |record| {
            record.calls += 1;
            record.hits += 1;
        });
    }

    fn update(&self, profile: &str, apply: impl FnOnce(&mut StatsRecord)) {
        if !self.is_collecting() {
            return;
        }
        let mut profiles = self.inner.profiles.lock();
        apply(profiles.entry(profile.to_string()).or_default());
    }

    // == Queries ==
    /// Returns the counters of one profile, if it was ever recorded.
    pub fn profile(&self, profile: &str) -> Option<ProfileStats> {
        self.inner
            .profiles
            .lock()
            .get(profile)
            .copied()
            .map(ProfileStats::from)
    }

    /// Returns totals over every profile.
    pub fn overall(&self) -> OverallStats {
        let profiles = self.inner.profiles.lock();
        let total = profiles
            .values()
            .fold(StatsRecord::default(), |acc, record| StatsRecord {
                calls: acc.calls + record.calls,
                hits: acc.hits + record.hits,
            });

        OverallStats {
            calls: total.calls,
            hits: total.hits,
            usage: total.usage(),
            profiles: profiles
                .iter()
                .map(|(name, record)| (name.clone(), ProfileStats::from(*record)))
                .collect(),
        }
    }

    // == Reset ==
    /// Drops every profile's counters.
    pub fn clear(&self) {
        self.inner.profiles.lock().clear();
    }

    /// Drops the counters of one profile.
    pub fn clear_profile(&self, profile: &str) {
        self.inner.profiles.lock().remove(profile);
    }
}

// == Stats Hook ==
/// Feeds a profile's counters from cache add/hit events.
#[derive(Debug)]
pub struct StatsHook {
    registry: StatsRegistry,
    profile: String,
}

impl StatsHook {
    pub fn new(registry: StatsRegistry, profile: impl Into<String>) -> Self {
        Self {
            registry,
            profile: profile.into(),
        }
    }
}

impl<R> CacheHook<R> for StatsHook {
    fn on_add(&mut self, _ctx: &HookContext<'_, R>) -> HookAction {
        self.registry.record_call(&self.profile);
        HookAction::Keep
    }

    fn on_hit(&mut self, _ctx: &HookContext<'_, R>) -> HookAction {
        self.registry.record_hit(&self.profile);
        HookAction::Keep
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_default() {
        let record = StatsRecord::default();
        assert_eq!(record.calls, 0);
        assert_eq!(record.hits, 0);
        assert_eq!(record.hit_rate(), 0.0);
    }

    #[test]
    fn test_usage_rounding() {
        let record = StatsRecord { calls: 3, hits: 1 };
        assert_eq!(record.usage(), 33.33);
        let record = StatsRecord { calls: 4, hits: 4 };
        assert_eq!(record.usage(), 100.0);
    }

    #[test]
    fn test_disabled_registry_records_nothing() {
        let registry = StatsRegistry::new(false);
        registry.record_call("fn");
        registry.record_hit("fn");
        assert!(registry.profile("fn").is_none());
        assert_eq!(registry.overall().calls, 0);
    }

    #[test]
    fn test_registry_counts_per_profile() {
        let registry = StatsRegistry::new(true);
        registry.record_call("a");
        registry.record_hit("a");
        registry.record_call("b");

        let a = registry.profile("a").unwrap();
        assert_eq!((a.calls, a.hits), (2, 1));
        assert_eq!(a.usage, 50.0);

        let overall = registry.overall();
        assert_eq!(overall.calls, 3);
        assert_eq!(overall.hits, 1);
        assert_eq!(overall.profiles.len(), 2);
    }

    #[test]
    fn test_clones_share_counters() {
        let registry = StatsRegistry::new(true);
        let handle = registry.clone();
        handle.record_call("shared");
        assert_eq!(registry.profile("shared").unwrap().calls, 1);
    }

    #[test]
    fn test_clear_profile_and_clear() {
        let registry = StatsRegistry::new(true);
        registry.record_call("a");
        registry.record_call("b");

        registry.clear_profile("a");
        assert!(registry.profile("a").is_none());
        assert!(registry.profile("b").is_some());

        registry.clear();
        assert!(registry.overall().profiles.is_empty());
    }

    #[test]
    fn test_anonymous_names_are_unique() {
        let registry = StatsRegistry::new(false);
        assert_eq!(registry.anonymous_profile_name(), "Anonymous 0");
        assert_eq!(registry.anonymous_profile_name(), "Anonymous 1");
    }

    #[test]
    fn test_overall_serializes() {
        let registry = StatsRegistry::new(true);
        registry.record_hit("a");
        let json = serde_json::to_value(registry.overall()).unwrap();
        assert_eq!(json["calls"], 1);
        assert_eq!(json["profiles"]["a"]["usage"], 100.0);
    }
}
