//! Error kinds shared by every module, and the aggregated database error.

use thiserror::Error;

use crate::actions::ActionError;
use crate::catalog::CatalogError;
use crate::fields::FieldError;
use crate::rows::RowError;
use crate::storage::StorageError;
use crate::transaction::TransactionError;
use crate::trash::TrashError;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Coarse classification of a failure, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The user is not a member of the group owning the table.
    PermissionDenied,
    RowNotFound,
    FieldNotFound,
    TableNotFound,
    /// A value or definition was rejected.
    Validation,
    /// The change collides with existing state, such as a taken field name.
    Conflict,
    /// Lock wait timed out or the transaction could not complete; retryable.
    Transactional,
    Internal,
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Row(#[from] RowError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Trash(#[from] TrashError),
}

impl DatabaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::Catalog(e) => e.kind(),
            DatabaseError::Transaction(_) => ErrorKind::Transactional,
            DatabaseError::Storage(_) => ErrorKind::Internal,
            DatabaseError::Field(e) => e.kind(),
            DatabaseError::Row(e) => e.kind(),
            DatabaseError::Action(e) => e.kind(),
            DatabaseError::Trash(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_passes_through() {
        let err = DatabaseError::from(RowError::RowNotFound { table_id: 1, row_id: 9 });
        assert_eq!(err.kind(), ErrorKind::RowNotFound);

        let err = DatabaseError::from(ActionError::from(FieldError::from(CatalogError::FieldNameTaken {
            table_id: 1,
            name: "Name".to_string(),
        })));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = DatabaseError::from(TransactionError::Internal("lost".to_string()));
        assert_eq!(err.kind(), ErrorKind::Transactional);
    }
}
