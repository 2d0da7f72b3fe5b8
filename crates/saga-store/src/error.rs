use thiserror::Error;

use crate::SagaId;

/// Errors that can occur when interacting with the saga store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No saga instance exists with the given ID.
    #[error("Saga instance not found: {0}")]
    NotFound(SagaId),

    /// A saga instance with the given ID has already been saved.
    #[error("Saga instance already exists: {0}")]
    AlreadyExists(SagaId),

    /// The update would drop or rewrite entries of the step history.
    #[error("Rejected update for saga {id}: {reason}")]
    HistoryRewrite { id: SagaId, reason: String },

    /// The backing store refused or could not serve the request.
    #[error("Saga store unavailable: {0}")]
    Unavailable(String),

    /// A stored status value could not be parsed.
    #[error("Unknown saga status: {0}")]
    UnknownStatus(String),

    /// A stored record holds a value the saga model cannot represent.
    #[error("Corrupt record for saga {id}: {reason}")]
    CorruptRecord { id: SagaId, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for saga store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
