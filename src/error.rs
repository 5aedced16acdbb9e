//! Error types for the memoization policy layer
//!
//! Provides unified error handling using thiserror. None of these errors ever
//! escape a memoized call: they are reported through `tracing` and the policy
//! falls back to a safe behavior.

use thiserror::Error;

// == Policy Error Enum ==
/// Unified error type for the policy layer.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// A configuration option was nonsensical and has been normalized
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// A time-to-live was configured but no tokio runtime is available for timers
    #[error("No timer runtime available: {0}")]
    MissingRuntime(String),

    /// The expiry callback reported a failure
    #[error("Expiry callback failed: {0}")]
    ExpireCallback(#[from] anyhow::Error),

    /// The eviction scan found no eligible entry to remove
    #[error("Eviction aborted: {0}")]
    EmptyStore(String),
}

impl PolicyError {
    // == Report ==
    /// Sends the error to the host's error channel as a non-fatal warning.
    pub fn report(&self) {
        tracing::warn!(error = %self, "memoization policy error");
    }
}

// == Result Type Alias ==
/// Convenience Result type for the policy layer.
pub type Result<T> = std::result::Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PolicyError::InvalidOption("max_size must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid option: max_size must be positive");
    }

    #[test]
    fn test_expire_callback_from_anyhow() {
        let err: PolicyError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, PolicyError::ExpireCallback(_)));
        assert!(err.to_string().contains("boom"));
    }
}
