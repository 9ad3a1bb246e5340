//! Storage layer error types
//!
//! All errors that can occur while reading or mutating the physical table
//! store are defined here. We use `thiserror` for ergonomic error definition.

use thiserror::Error;

use crate::storage::types::{ColumnName, InvalidNameError, RelationName, RowId};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// the requested relation was not found
    #[error("relation not found: {0}")]
    RelationNotFound(RelationName),

    /// the relation already exists
    #[error("relation already exists: {0}")]
    RelationAlreadyExists(RelationName),

    /// the requested column was not found
    #[error("column not found: relation={relation}, column={column}")]
    ColumnNotFound {
        relation: RelationName,
        column: ColumnName,
    },

    /// a column with this name already exists in the relation
    #[error("column already exists: relation={relation}, column={column}")]
    ColumnAlreadyExists {
        relation: RelationName,
        column: ColumnName,
    },

    /// the requested row was not found
    #[error("row not found: relation={relation}, id={row}")]
    RowNotFound { relation: RelationName, row: RowId },

    /// a row with this id already exists
    #[error("row already exists: relation={relation}, id={row}")]
    RowAlreadyExists { relation: RelationName, row: RowId },

    /// the requested link table was not found
    #[error("link table not found: {0}")]
    LinkTableNotFound(RelationName),

    /// the link table already exists
    #[error("link table already exists: {0}")]
    LinkTableAlreadyExists(RelationName),

    /// invalid relation or column name
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::RelationNotFound(_)
                | StorageError::ColumnNotFound { .. }
                | StorageError::RowNotFound { .. }
                | StorageError::LinkTableNotFound(_)
        )
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::RelationAlreadyExists(_)
                | StorageError::ColumnAlreadyExists { .. }
                | StorageError::RowAlreadyExists { .. }
                | StorageError::LinkTableAlreadyExists(_)
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let relation = RelationName::new("database_table_1").unwrap();

        let not_found = StorageError::RowNotFound {
            relation: relation.clone(),
            row: 4,
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());

        let conflict = StorageError::RelationAlreadyExists(relation);
        assert!(!conflict.is_not_found());
        assert!(conflict.is_conflict());
    }
}
