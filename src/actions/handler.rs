//! Undo, redo and maintenance of the action log.

use chrono::Utc;
use serde::Serialize;

use crate::actions::error::ActionResult;
use crate::actions::models::{Action, ActionKind, ActionScope};
use crate::actions::registry::action_type;
use crate::catalog::User;
use crate::db::Database;

pub struct ActionHandler<'a> {
    db: &'a Database,
}

impl<'a> ActionHandler<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Record a performed action.
    ///
    /// Undone actions of the same user, session and scope can no longer be
    /// redone afterwards and are discarded.
    pub(crate) fn register<P: Serialize>(
        &self,
        user: &User,
        kind: ActionKind,
        scope: ActionScope,
        params: &P,
    ) -> ActionResult<Action> {
        let params = serde_json::to_value(params)?;
        let log = self.db.action_log();
        let _guard = log.apply_guard();

        let stale = log.find(|a| a.is_undone() && a.belongs_to(user) && a.scope == scope);
        self.discard(&stale);

        let action = log.append(user, kind, scope, params);
        tracing::debug!(action_id = action.id, kind = %kind, %scope, "registered action");
        Ok(action)
    }

    /// Undo the latest action of `user` in any of `scopes`.
    ///
    /// Returns `None` when there is nothing to undo. On failure the entry is
    /// left as it was.
    pub fn undo(&self, user: &User, scopes: &[ActionScope]) -> ActionResult<Option<Action>> {
        let log = self.db.action_log();
        let _guard = log.apply_guard();

        let Some(action) = log.latest_undoable(user, scopes) else {
            return Ok(None);
        };
        let params = match action_type(action.kind).undo(self.db, user, &action) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(action_id = action.id, kind = %action.kind, error = %e, "undo failed");
                return Err(e);
            }
        };

        tracing::info!(action_id = action.id, kind = %action.kind, "undid action");
        Ok(log.settle(action.id, params, Some(Utc::now())))
    }

    /// Redo the most recently undone action of `user` in any of `scopes`.
    pub fn redo(&self, user: &User, scopes: &[ActionScope]) -> ActionResult<Option<Action>> {
        let log = self.db.action_log();
        let _guard = log.apply_guard();

        let Some(action) = log.next_redoable(user, scopes) else {
            return Ok(None);
        };
        let params = match action_type(action.kind).redo(self.db, user, &action) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(action_id = action.id, kind = %action.kind, error = %e, "redo failed");
                return Err(e);
            }
        };

        tracing::info!(action_id = action.id, kind = %action.kind, "redid action");
        Ok(log.settle(action.id, params, None))
    }

    /// Release the extra storage held by an action. Safe to call repeatedly.
    pub fn clean_up(&self, action: &Action) -> ActionResult<()> {
        action_type(action.kind).clean_up_any_extra_action_data(self.db, action)
    }

    /// Discard actions older than the configured undo retention.
    pub fn clean_up_old_actions(&self) -> usize {
        // a retention too long to represent never expires anything
        let cutoff = chrono::Duration::from_std(self.db.config().undo_retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));

        let log = self.db.action_log();
        let _guard = log.apply_guard();
        let expired = match cutoff {
            Some(cutoff) => log.find(|a| a.created_at < cutoff),
            None => Vec::new(),
        };
        self.discard(&expired)
    }

    /// Discard every action recorded in `scope`.
    pub(crate) fn discard_scope(&self, scope: ActionScope) -> usize {
        let log = self.db.action_log();
        let _guard = log.apply_guard();
        let scoped = log.find(|a| a.scope == scope);
        self.discard(&scoped)
    }

    /// Clean up and remove `actions`. Entries whose cleanup fails stay in the
    /// log for a later attempt. Callers hold the apply guard.
    fn discard(&self, actions: &[Action]) -> usize {
        let mut removable = Vec::with_capacity(actions.len());
        for action in actions {
            match self.clean_up(action) {
                Ok(()) => removable.push(action.id),
                Err(e) => {
                    tracing::warn!(action_id = action.id, kind = %action.kind, error = %e, "action cleanup failed");
                }
            }
        }
        let removed = self.db.action_log().remove(&removable).len();
        if removed > 0 {
            tracing::debug!(removed, "discarded actions");
        }
        removed
    }
}
