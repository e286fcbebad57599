//! Error types for the Hive Mail operation surface
//!
//! One variant group per failure kind from the substrate's taxonomy:
//! validation, not-found, conflict, storage, cancellation.

use thiserror::Error;

/// Result type alias for Hive Mail operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Hive Mail operation surface
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Validation Errors
    // ==========================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid importance: {0}. Must be: low, normal, high, or urgent")]
    InvalidImportance(String),

    #[error("Invalid agent name: {0}")]
    InvalidAgentName(String),

    #[error("Invalid thread ID: {0}. Must match ^[A-Za-z0-9][A-Za-z0-9._-]{{0,127}}$")]
    InvalidThreadId(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // ==========================================================================
    // Resource Not Found Errors
    // ==========================================================================
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(i64),

    #[error("File reservation not found: {0}")]
    ReservationNotFound(i64),

    // ==========================================================================
    // Conflict Errors
    // ==========================================================================
    /// A hard uniqueness violation the substrate cannot resolve.
    ///
    /// Advisory reservation overlaps are NOT conflicts — they come back as
    /// warnings on a successful reserve call.
    #[error("Conflict on {key}: {message}")]
    Conflict { key: String, message: String },

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==========================================================================
    // Cancellation
    // ==========================================================================
    /// Cooperative cancellation observed before commit; transaction rolled
    /// back, no state change.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create an invalid-argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a conflict error for the given key.
    pub fn conflict(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a validation failure (caller-side input problem).
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::InvalidImportance(_)
                | Self::InvalidAgentName(_)
                | Self::InvalidThreadId(_)
                | Self::MissingField(_)
        )
    }

    /// Whether this error is a cooperative cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_predicate_covers_input_errors() {
        assert!(Error::invalid("bad").is_validation());
        assert!(Error::InvalidImportance("severe".into()).is_validation());
        assert!(Error::MissingField("to".into()).is_validation());
        assert!(!Error::Cancelled.is_validation());
        assert!(!Error::Storage("boom".into()).is_validation());
    }

    #[test]
    fn cancelled_predicate() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::MessageNotFound(1).is_cancelled());
    }

    #[test]
    fn conflict_display_includes_key() {
        let e = Error::conflict("agents(BlueLake)", "duplicate registration");
        assert!(e.to_string().contains("agents(BlueLake)"));
    }
}
