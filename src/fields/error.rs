//! Field error types.

use thiserror::Error;

use crate::catalog::{CatalogError, FieldId};
use crate::db::ErrorKind;
use crate::storage::StorageError;
use crate::transaction::TransactionError;

/// Result type for field operations.
pub type FieldResult<T> = Result<T, FieldError>;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A value could not be coerced into the field's storage form.
    #[error("invalid value for field {field_id}: {reason}")]
    Validation { field_id: FieldId, reason: String },

    /// The requested field change is not allowed.
    #[error("invalid field update: {0}")]
    InvalidUpdate(String),

    /// A backup artifact needed for a restore no longer exists.
    #[error("backup storage missing: {0}")]
    BackupMissing(String),
}

impl FieldError {
    pub fn validation(field_id: FieldId, reason: impl Into<String>) -> Self {
        FieldError::Validation {
            field_id,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FieldError::Catalog(e) => e.kind(),
            FieldError::Transaction(_) => ErrorKind::Transactional,
            FieldError::Validation { .. } | FieldError::InvalidUpdate(_) => ErrorKind::Validation,
            FieldError::Storage(_) | FieldError::BackupMissing(_) => ErrorKind::Internal,
        }
    }
}
