//! Error types for the memory engine.

use thiserror::Error;

/// Result type alias used throughout the crate
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory engine errors
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// The durable record store could not complete a read or write.
    ///
    /// When raised from `insert`, `record_id` carries the id of the record
    /// that is already visible in the in-memory tiers.
    #[error("storage unavailable: {message}")]
    StorageUnavailable {
        message: String,
        record_id: Option<String>,
    },

    /// A persisted derived index could not be read back
    #[error("index corrupt: {message}")]
    IndexCorrupt { message: String },

    /// Embedding backend failure
    #[error("embedding error: {message}")]
    Embedding { message: String },

    /// Entity not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Invalid operation
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl MemoryError {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
            record_id: None,
        }
    }

    /// Create an index corruption error
    pub fn index_corrupt(message: impl Into<String>) -> Self {
        Self::IndexCorrupt {
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Attach the id of the record an insert was working on
    pub fn with_record_id(self, id: impl Into<String>) -> Self {
        match self {
            Self::StorageUnavailable { message, .. } => Self::StorageUnavailable {
                message,
                record_id: Some(id.into()),
            },
            other => other,
        }
    }

    /// Id of the record that stayed in memory after a failed persist
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Self::StorageUnavailable { record_id, .. } => record_id.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is a storage error
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }

    /// Check if this error is an index corruption error
    pub fn is_index_corrupt(&self) -> bool {
        matches!(self, Self::IndexCorrupt { .. })
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
