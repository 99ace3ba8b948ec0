//! Error types for relay quota metering.

use http::StatusCode;

use crate::ids::IdError;

/// Result type for quota operations.
pub type Result<T> = std::result::Result<T, QuotaError>;

/// Errors that can occur while reserving, settling or rolling back quota.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// No price descriptor is configured for the requested model.
    #[error("unknown model: {model}")]
    UnknownModel {
        /// The model name that could not be priced.
        model: String,
    },

    /// Cached or persistent balance cannot cover the requested amount.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Balance observed when the check failed.
        balance: i64,
        /// Amount that was required.
        required: i64,
    },

    /// The persistent ledger failed to pre-consume the reservation.
    #[error("pre-consume rejected: {0}")]
    PreConsumeRejected(String),

    /// Read or write against the cache or the ledger failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Settlement failed after it started.
    #[error("settlement failed at {stage}: {message}")]
    Settlement {
        /// Which settlement step failed (`ledger_delta`).
        stage: &'static str,
        /// Error message.
        message: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl QuotaError {
    /// HTTP status the gateway should answer with when this error rejects a request.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InsufficientBalance { .. } | Self::PreConsumeRejected(_) => {
                StatusCode::FORBIDDEN
            }
            Self::InvalidId(_) => StatusCode::BAD_REQUEST,
            Self::UnknownModel { .. }
            | Self::Storage(_)
            | Self::Settlement { .. }
            | Self::Configuration(_)
            | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownModel { .. } => "unknown_model",
            Self::InsufficientBalance { .. } => "insufficient_user_quota",
            Self::PreConsumeRejected(_) => "pre_consume_token_quota_failed",
            Self::Storage(_) => "storage_error",
            Self::Settlement { .. } => "settlement_failed",
            Self::Configuration(_) => "configuration_error",
            Self::Serialization(_) => "serialization_error",
            Self::InvalidId(_) => "invalid_id",
        }
    }

    /// Whether the error is the caller's balance running short.
    #[must_use]
    pub const fn is_insufficient_balance(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. } | Self::PreConsumeRejected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_is_forbidden() {
        let err = QuotaError::InsufficientBalance {
            balance: 3,
            required: 10,
        };
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "insufficient_user_quota");
        assert!(err.is_insufficient_balance());

        let err = QuotaError::PreConsumeRejected("token quota exhausted".into());
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn config_and_storage_are_server_errors() {
        let err = QuotaError::UnknownModel {
            model: "mystery".into(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "unknown model: mystery");

        let err = QuotaError::Storage("connection reset".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.is_insufficient_balance());
    }
}
