//! Error types for quota storage.

use relay_quota_core::QuotaError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record (`user`, `token`).
        entity: &'static str,
        /// The id that was looked up.
        id: i64,
    },

    /// Quota too low for the requested deduction.
    #[error("insufficient quota: balance={balance}, required={required}")]
    InsufficientQuota {
        /// Current quota.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Amount rejected before touching any record.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),
}

impl From<StoreError> for QuotaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientQuota { balance, required } => {
                Self::InsufficientBalance { balance, required }
            }
            StoreError::Serialization(msg) => Self::Serialization(msg),
            StoreError::Database(_)
            | StoreError::NotFound { .. }
            | StoreError::InvalidAmount(_) => Self::Storage(err.to_string()),
        }
    }
}
