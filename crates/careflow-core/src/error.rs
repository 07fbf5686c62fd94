// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Careflow booking pipeline.

use thiserror::Error;

/// The primary error type used across all Careflow adapter traits and core operations.
#[derive(Debug, Error)]
pub enum CareflowError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Signature verification failed or credentials were rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed or unacceptable input, including permanent 4xx responses
    /// from external capabilities (invalid recipient, bad request).
    #[error("validation error: {0}")]
    Validation(String),

    /// A unique-constraint or double-booking conflict. Recoverable branch,
    /// not a crash.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Chat-platform send/receive errors (rate limiting, 5xx, network).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// AI classifier capability errors (API failure, unparsable response).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Payment gateway adapter errors (order creation failure, 5xx).
    #[error("payment gateway error: {message}")]
    Payment {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CareflowError {
    /// Whether a failed job carrying this error should be retried with backoff.
    ///
    /// Transient failures (store I/O, rate limits, 5xx, timeouts) retry.
    /// Authentication, validation, conflict, and config failures are
    /// permanent and go straight to the dead-letter path.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CareflowError::Storage { .. }
                | CareflowError::Channel { .. }
                | CareflowError::Provider { .. }
                | CareflowError::Payment { .. }
                | CareflowError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_variants_are_retryable() {
        assert!(
            CareflowError::Channel {
                message: "502 from platform".into(),
                source: None,
            }
            .is_retryable()
        );
        assert!(
            CareflowError::Storage {
                source: Box::new(std::io::Error::other("disk full")),
            }
            .is_retryable()
        );
        assert!(
            CareflowError::Timeout {
                duration: std::time::Duration::from_secs(20),
            }
            .is_retryable()
        );
    }

    #[test]
    fn permanent_variants_are_not_retryable() {
        assert!(!CareflowError::Unauthorized("bad signature".into()).is_retryable());
        assert!(!CareflowError::Validation("invalid recipient".into()).is_retryable());
        assert!(!CareflowError::Conflict("slot taken".into()).is_retryable());
        assert!(!CareflowError::Config("missing key".into()).is_retryable());
        assert!(!CareflowError::Internal("bug".into()).is_retryable());
    }

    #[test]
    fn display_includes_message() {
        let err = CareflowError::Conflict("appointment slot already booked".into());
        assert!(err.to_string().contains("already booked"));
    }
}
