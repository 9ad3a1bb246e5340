//! Catalog error types.

use thiserror::Error;

use crate::catalog::types::{FieldId, GroupId, OptionId, TableId, UserId};
use crate::db::ErrorKind;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised while reading or changing metadata.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("table not found: {0}")]
    TableNotFound(TableId),

    #[error("field not found: {0}")]
    FieldNotFound(FieldId),

    #[error("select option not found: {0}")]
    OptionNotFound(OptionId),

    /// The field exists but belongs to another table.
    #[error("field {field_id} does not belong to table {table_id}")]
    FieldNotInTable { field_id: FieldId, table_id: TableId },

    #[error("user {user_id} does not belong to group {group_id}")]
    UserNotInGroup { user_id: UserId, group_id: GroupId },

    #[error("a field named '{name}' already exists in table {table_id}")]
    FieldNameTaken { table_id: TableId, name: String },

    #[error("invalid field name: {0}")]
    InvalidFieldName(String),
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::UserNotInGroup { .. } => ErrorKind::PermissionDenied,
            CatalogError::TableNotFound(_) => ErrorKind::TableNotFound,
            CatalogError::FieldNotFound(_) | CatalogError::FieldNotInTable { .. } => {
                ErrorKind::FieldNotFound
            }
            CatalogError::FieldNameTaken { .. } => ErrorKind::Conflict,
            CatalogError::InvalidFieldName(_) | CatalogError::OptionNotFound(_) => {
                ErrorKind::Validation
            }
            CatalogError::UserNotFound(_) | CatalogError::GroupNotFound(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::UserNotFound(_)
                | CatalogError::GroupNotFound(_)
                | CatalogError::TableNotFound(_)
                | CatalogError::FieldNotFound(_)
                | CatalogError::OptionNotFound(_)
        )
    }
}
