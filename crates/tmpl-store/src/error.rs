//! Storage errors

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite driver error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON column could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Write would violate a uniqueness rule
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored row could not be interpreted
    #[error("corrupt row in {table}: {message}")]
    Corrupt {
        /// Table holding the row
        table: &'static str,
        /// What was wrong
        message: String,
    },
}

impl StoreError {
    /// Create corrupt-row error
    #[inline]
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            message: message.into(),
        }
    }
}
