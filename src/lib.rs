//! Keyfield Memo - memoization policies keyed by element identity
//!
//! Wraps functions over JSON arguments with a cache whose keys, equality,
//! expiration and eviction are configured per function.

pub mod cache;
pub mod config;
pub mod equality;
pub mod error;
pub mod key;
pub mod memoize;
pub mod policy;

pub use cache::{StatsRegistry, DEFAULT_MAX_SIZE};
pub use config::Config;
pub use error::{PolicyError, Result};
pub use key::{IdentityField, Key};
pub use memoize::{memoize, MemoizeOptions, Memoized};
pub use policy::ExpireDecision;
