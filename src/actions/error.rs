//! Action error types.

use thiserror::Error;

use crate::actions::models::{ActionId, ActionKind};
use crate::catalog::CatalogError;
use crate::db::ErrorKind;
use crate::fields::FieldError;
use crate::rows::RowError;
use crate::transaction::TransactionError;

/// Result type for action operations.
pub type ActionResult<T> = Result<T, ActionError>;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Row(#[from] RowError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Stored parameters do not match the action type.
    #[error("invalid action parameters: {0}")]
    Params(#[from] serde_json::Error),

    /// The action's parameters lack data needed for this step.
    #[error("{kind} action {action_id} cannot be applied: {reason}")]
    Inapplicable {
        action_id: ActionId,
        kind: ActionKind,
        reason: String,
    },
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::Field(e) => e.kind(),
            ActionError::Row(e) => e.kind(),
            ActionError::Catalog(e) => e.kind(),
            ActionError::Transaction(_) => ErrorKind::Transactional,
            ActionError::Params(_) | ActionError::Inapplicable { .. } => ErrorKind::Internal,
        }
    }
}
