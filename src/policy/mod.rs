//! Policy Module
//!
//! Entry lifetime policies: time-to-live expiration and identity eviction.

mod eviction;
mod expiration;

// Re-export public types
pub use eviction::{IdentityEviction, KeyAccess};
pub use expiration::{
    ExpirationInfo, ExpirationManager, ExpireDecision, FireFn, OnExpireFn,
};
