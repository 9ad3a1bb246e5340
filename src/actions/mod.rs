//! Undoable actions.
//!
//! Operations that can be undone are run through an action type's `execute`,
//! which performs the change and records an [`Action`] in the [`ActionLog`].
//! The [`ActionHandler`] picks entries to undo or redo per user, session and
//! scope and hands them to the matching [`ActionType`].
//!
//! # Usage
//!
//! ```ignore
//! use gridstore::actions::{ActionScope, UpdateFieldActionType};
//!
//! UpdateFieldActionType::execute(&db, &user, field_id, FieldUpdate::new().kind(FieldKind::Boolean))?;
//! db.actions().undo(&user, &[ActionScope::Table(table_id)])?;
//! ```

mod error;
mod field_actions;
mod handler;
mod log;
mod models;
mod registry;
mod row_actions;

pub use error::{ActionError, ActionResult};
pub use field_actions::{UpdateFieldActionType, UpdateFieldParams, REDO_NAME_SUFFIX, UNDO_NAME_SUFFIX};
pub use handler::ActionHandler;
pub use log::ActionLog;
pub use models::{Action, ActionId, ActionKind, ActionScope};
pub use registry::{action_type, ActionType};
pub use row_actions::{CreateRowActionType, CreateRowParams, DeleteRowActionType, DeleteRowParams};
