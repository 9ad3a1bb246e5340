//! Action log entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{TableId, User, UserId};

pub type ActionId = u64;

/// Type tag of an action, selects its [`ActionType`](crate::actions::ActionType).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    UpdateField,
    CreateRow,
    DeleteRow,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::UpdateField => "update_field",
            ActionKind::CreateRow => "create_row",
            ActionKind::DeleteRow => "delete_row",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an action belongs to; undo and redo requests name the scopes they
/// apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ActionScope {
    Table(TableId),
}

impl fmt::Display for ActionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionScope::Table(id) => write!(f, "table{id}"),
        }
    }
}

/// One recorded, reversible action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub user_id: UserId,
    #[serde(default)]
    pub session: Option<String>,
    pub scope: ActionScope,
    /// Type specific parameters, updated by every undo and redo.
    pub params: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub undone_at: Option<DateTime<Utc>>,
}

impl Action {
    pub fn is_undone(&self) -> bool {
        self.undone_at.is_some()
    }

    /// Whether the action was recorded by `user` in the user's session.
    pub fn belongs_to(&self, user: &User) -> bool {
        self.user_id == user.id && self.session == user.session
    }

    pub fn params<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.params.clone())
    }
}
