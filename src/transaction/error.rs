//! Transaction error types.

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A lock could not be acquired within the configured timeout.
    #[error("transaction {tx_id} timed out after {waited_ms}ms waiting for lock on {target}")]
    Timeout {
        tx_id: String,
        target: String,
        waited_ms: u64,
    },

    /// Internal error.
    #[error("internal transaction error: {0}")]
    Internal(String),
}

impl TransactionError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransactionError::Timeout { .. })
    }

    /// Check if this error reports a missing storage object.
    pub fn is_not_found(&self) -> bool {
        match self {
            TransactionError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RelationName;

    #[test]
    fn test_error_retryable() {
        let timeout = TransactionError::Timeout {
            tx_id: "tx001".to_string(),
            target: "row database_table_1#4".to_string(),
            waited_ms: 50,
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_not_found());

        let missing = TransactionError::from(StorageError::RelationNotFound(
            RelationName::new("database_table_1").unwrap(),
        ));
        assert!(!missing.is_retryable());
        assert!(missing.is_not_found());
    }
}
