//! Action type capabilities and the static action type registry.

use serde_json::Value;

use crate::actions::error::ActionResult;
use crate::actions::field_actions::UpdateFieldActionType;
use crate::actions::models::{Action, ActionKind};
use crate::actions::row_actions::{CreateRowActionType, DeleteRowActionType};
use crate::catalog::User;
use crate::db::Database;

/// How one kind of action is reversed and reapplied.
///
/// Performing the action itself is an associated `execute` function on each
/// type, since its inputs differ per type. Undo and redo receive the stored
/// entry and return the parameters to store for the next step.
pub trait ActionType: Send + Sync {
    fn kind(&self) -> ActionKind;

    /// Reverse the action.
    fn undo(&self, db: &Database, user: &User, action: &Action) -> ActionResult<Value>;

    /// Reapply an undone action.
    fn redo(&self, db: &Database, user: &User, action: &Action) -> ActionResult<Value>;

    /// Release storage the entry keeps alive, such as field backups. Must
    /// succeed when that storage is already gone.
    fn clean_up_any_extra_action_data(&self, _db: &Database, _action: &Action) -> ActionResult<()> {
        Ok(())
    }
}

/// Look up the implementation for an action kind.
pub fn action_type(kind: ActionKind) -> &'static dyn ActionType {
    match kind {
        ActionKind::UpdateField => &UpdateFieldActionType,
        ActionKind::CreateRow => &CreateRowActionType,
        ActionKind::DeleteRow => &DeleteRowActionType,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_matches_kinds() {
        for kind in [ActionKind::UpdateField, ActionKind::CreateRow, ActionKind::DeleteRow] {
            assert_eq!(action_type(kind).kind(), kind);
        }
    }
}
