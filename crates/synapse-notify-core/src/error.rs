//! Error types for SynapseNotify
//!
//! Missing agent files and unknown alert ids are not errors: the store
//! resolves them to empty results or zero counts. Everything below is a
//! failure the caller can act on.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for SynapseNotify operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SynapseNotify
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Validation Errors (rejected before any file access)
    // ==========================================================================
    #[error("Invalid agent identity: {0:?}")]
    InvalidAgent(String),

    #[error("Invalid priority: {0:?}. Must be one of CRITICAL, HIGH, NORMAL, LOW")]
    InvalidPriority(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid source message {}: {reason}", path.display())]
    InvalidSource { path: PathBuf, reason: String },

    // ==========================================================================
    // Persisted State Errors
    // ==========================================================================
    #[error("Malformed alert file {}: {reason}", path.display())]
    MalformedState { path: PathBuf, reason: String },

    #[error("Timed out after {waited_ms}ms acquiring lock {}", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error type string (for JSON output and logs)
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidAgent(_) | Self::InvalidPriority(_) | Self::InvalidArgument(_) => {
                "INVALID_INPUT"
            }
            Self::InvalidSource { .. } => "INVALID_SOURCE",
            Self::MalformedState { .. } => "MALFORMED_STATE",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::Io(_) => "OS_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Returns whether retrying the same operation later may succeed.
    ///
    /// A malformed file counts as retryable: on an unlocked read it is most
    /// often a write racing the read rather than real corruption.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::MalformedState { .. })
    }
}
