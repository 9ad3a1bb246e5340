//! Row error types.

use thiserror::Error;

use crate::catalog::{CatalogError, TableId};
use crate::db::ErrorKind;
use crate::fields::FieldError;
use crate::storage::{RowId, StorageError};
use crate::transaction::TransactionError;

/// Result type for row operations.
pub type RowResult<T> = Result<T, RowError>;

#[derive(Debug, Error)]
pub enum RowError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("row {row_id} does not exist in table {table_id}")]
    RowNotFound { table_id: TableId, row_id: RowId },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// No order value fits in front of the anchor row, even after
    /// renumbering the table.
    #[error("order precision exhausted before row {anchor} in table {table_id}")]
    OrderPrecisionExhausted { table_id: TableId, anchor: RowId },
}

impl RowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RowError::Catalog(e) => e.kind(),
            RowError::RowNotFound { .. } => ErrorKind::RowNotFound,
            RowError::Field(e) => e.kind(),
            RowError::Transaction(_) => ErrorKind::Transactional,
            RowError::Storage(_) | RowError::OrderPrecisionExhausted { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the failed operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            RowError::Transaction(e) => e.is_retryable(),
            RowError::Field(FieldError::Transaction(e)) => e.is_retryable(),
            _ => false,
        }
    }
}
