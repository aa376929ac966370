//! Unified error hierarchy for the adaptation engine
//!
//! Wraps the per-component error types into one top-level enum with
//! severity classification, retryability (used by the batch retry loop),
//! and user-facing messages.

use thiserror::Error;

use crate::coaching::CoachingError;
use crate::intensity::ScoreError;
use crate::mesocycle::MesocycleError;
use crate::store::StoreError;
use crate::sync::MergeError;

/// Top-level error type for all engine operations
#[derive(Debug, Error)]
pub enum AdaptError {
    /// Persistence store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Set-score input contract violations
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoreError),

    /// Mesocycle tracking errors
    #[error("Mesocycle error: {0}")]
    Mesocycle(#[from] MesocycleError),

    /// Coaching delivery errors (never fatal to the decision pipeline)
    #[error("Coaching error: {0}")]
    Coaching(#[from] CoachingError),

    /// Sync/merge errors
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    /// Boundary validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AdaptError>;

impl AdaptError {
    /// Check if the operation that produced this error may be retried
    ///
    /// Validation and scoring errors are contract violations; retrying
    /// the same payload cannot succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdaptError::Store(e) => e.is_retryable(),
            AdaptError::Coaching(_) | AdaptError::Io(_) => true,
            AdaptError::Scoring(_)
            | AdaptError::Mesocycle(_)
            | AdaptError::Merge(_)
            | AdaptError::Validation(_)
            | AdaptError::Configuration(_)
            | AdaptError::Internal(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AdaptError::Scoring(_) | AdaptError::Validation(_) => ErrorSeverity::Warning,
            AdaptError::Coaching(_) => ErrorSeverity::Warning,
            AdaptError::Merge(_) => ErrorSeverity::Warning,
            AdaptError::Store(_) | AdaptError::Mesocycle(_) | AdaptError::Io(_) => {
                ErrorSeverity::Error
            }
            AdaptError::Configuration(_) => ErrorSeverity::Error,
            AdaptError::Internal(_) => ErrorSeverity::Critical,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AdaptError::Scoring(e) => {
                format!("Could not score this set: {}", e)
            }
            AdaptError::Store(_) => {
                "Unable to reach training history storage. Your workout is unaffected; \
                 scores will sync later."
                    .to_string()
            }
            AdaptError::Coaching(_) => {
                "Coaching messages are temporarily unavailable.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical | ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_not_retryable() {
        let err = AdaptError::Validation("bad input".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_store_error_retryable() {
        let err = AdaptError::Store(StoreError::Unavailable {
            reason: "timeout".to_string(),
        });
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }

    #[test]
    fn test_internal_is_critical() {
        let err = AdaptError::Internal("bug".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
