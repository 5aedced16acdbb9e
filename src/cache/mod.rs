//! Cache Module
//!
//! Ordered key/value storage, its lifecycle hooks and profile statistics.

mod hooks;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use hooks::{CacheEvent, CacheHook, FnHook, HookAction, HookContext, StoreSnapshot};
pub use stats::{OverallStats, ProfileStats, StatsHook, StatsRecord, StatsRegistry};
pub use store::{Capacity, CacheStore};

// == Public Constants ==
/// Entries kept by a cache that sets no explicit size
pub const DEFAULT_MAX_SIZE: usize = 1;
