//! Memoize Module
//!
//! Option builder and the memoized function wrapper.

mod memoized;
mod options;

// Re-export public types
pub use memoized::Memoized;
pub use options::{MemoizeOptions, UpdateWhenFn};

use serde_json::Value;

/// Memoizes `func` with default options.
pub fn memoize<R, F>(func: F) -> Memoized<R>
where
    R: Clone + Send + 'static,
    F: Fn(&[Value]) -> R + Send + Sync + 'static,
{
    Memoized::new(func)
}
