//! Error types for lexmeter storage.

use lexmeter_core::UserId;

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
    #[error("not found")]
    NotFound,

    /// The plan row changed since it was read.
    #[error("plan version conflict for user {user_id}")]
    Conflict {
        /// User whose plan row moved.
        user_id: UserId,
    },

    /// A unique key was written twice.
    #[error("duplicate record: {key}")]
    Duplicate {
        /// The duplicated key.
        key: String,
    },
}
