//! In-memory action log.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::Value;

use crate::actions::models::{Action, ActionId, ActionKind, ActionScope};
use crate::catalog::User;

/// Ordered log of recorded actions.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone, Default)]
pub struct ActionLog {
    inner: Arc<ActionLogInner>,
}

#[derive(Default)]
struct ActionLogInner {
    /// Entries in ascending id order.
    entries: RwLock<Vec<Action>>,
    next_id: Mutex<ActionId>,
    /// Serializes undo, redo and cleanup.
    apply: Mutex<()>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold while applying or discarding entries.
    pub(crate) fn apply_guard(&self) -> MutexGuard<'_, ()> {
        self.inner.apply.lock()
    }

    pub(crate) fn append(&self, user: &User, kind: ActionKind, scope: ActionScope, params: Value) -> Action {
        let id = {
            let mut next = self.inner.next_id.lock();
            *next += 1;
            *next
        };
        let action = Action {
            id,
            kind,
            user_id: user.id,
            session: user.session.clone(),
            scope,
            params,
            created_at: Utc::now(),
            undone_at: None,
        };
        self.inner.entries.write().push(action.clone());
        action
    }

    pub fn get(&self, id: ActionId) -> Option<Action> {
        self.inner.entries.read().iter().find(|a| a.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries matching `filter`, ascending by id.
    pub fn find<F>(&self, filter: F) -> Vec<Action>
    where
        F: Fn(&Action) -> bool,
    {
        self.inner
            .entries
            .read()
            .iter()
            .filter(|a| filter(a))
            .cloned()
            .collect()
    }

    /// The most recent entry of `user` in `scopes` that can be undone.
    pub(crate) fn latest_undoable(&self, user: &User, scopes: &[ActionScope]) -> Option<Action> {
        self.inner
            .entries
            .read()
            .iter()
            .rev()
            .find(|a| !a.is_undone() && a.belongs_to(user) && scopes.contains(&a.scope))
            .cloned()
    }

    /// The most recently undone entry of `user` in `scopes`.
    ///
    /// Entries undone at the same instant go oldest first, the order in
    /// which undo walks a single scope.
    pub(crate) fn next_redoable(&self, user: &User, scopes: &[ActionScope]) -> Option<Action> {
        self.inner
            .entries
            .read()
            .iter()
            .filter(|a| a.belongs_to(user) && scopes.contains(&a.scope))
            .filter_map(|a| a.undone_at.map(|at| (at, a)))
            .max_by_key(|(at, a)| (*at, Reverse(a.id)))
            .map(|(_, a)| a.clone())
    }

    /// Store the outcome of an undo or redo. Returns the updated entry.
    pub(crate) fn settle(&self, id: ActionId, params: Value, undone_at: Option<DateTime<Utc>>) -> Option<Action> {
        let mut entries = self.inner.entries.write();
        let action = entries.iter_mut().find(|a| a.id == id)?;
        action.params = params;
        action.undone_at = undone_at;
        Some(action.clone())
    }

    /// Remove the given entries, returning the ones that were present.
    pub(crate) fn remove(&self, ids: &[ActionId]) -> Vec<Action> {
        let mut entries = self.inner.entries.write();
        let (removed, kept): (Vec<Action>, Vec<Action>) =
            entries.drain(..).partition(|a| ids.contains(&a.id));
        *entries = kept;
        removed
    }
}

impl std::fmt::Debug for ActionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLog")
            .field("entries", &self.len())
            .finish()
    }
}
