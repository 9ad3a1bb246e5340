//! Row creation and deletion as undoable actions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::error::{ActionError, ActionResult};
use crate::actions::models::{Action, ActionKind, ActionScope};
use crate::actions::registry::ActionType;
use crate::catalog::{TableId, User};
use crate::db::Database;
use crate::fields::RawValues;
use crate::rows::{Row, RowSnapshot};
use crate::storage::RowId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRowParams {
    pub table_id: TableId,
    pub row_id: RowId,
    /// The row as it was when the creation was undone.
    #[serde(default)]
    pub snapshot: Option<RowSnapshot>,
}

#[derive(Debug, Clone, Copy)]
pub struct CreateRowActionType;

impl CreateRowActionType {
    pub fn execute(
        db: &Database,
        user: &User,
        table_id: TableId,
        values: &RawValues,
        before: Option<RowId>,
    ) -> ActionResult<(Row, Action)> {
        let row = db.rows().create_row(user, table_id, values, before)?;
        let params = CreateRowParams {
            table_id,
            row_id: row.id,
            snapshot: None,
        };
        let action = db
            .actions()
            .register(user, ActionKind::CreateRow, ActionScope::Table(table_id), &params)?;
        Ok((row, action))
    }
}

impl ActionType for CreateRowActionType {
    fn kind(&self) -> ActionKind {
        ActionKind::CreateRow
    }

    fn undo(&self, db: &Database, user: &User, action: &Action) -> ActionResult<Value> {
        let mut params: CreateRowParams = action.params()?;
        let snapshot = db.rows().delete_with_snapshot(user, params.table_id, params.row_id)?;
        params.snapshot = Some(snapshot);
        Ok(serde_json::to_value(params)?)
    }

    fn redo(&self, db: &Database, user: &User, action: &Action) -> ActionResult<Value> {
        let mut params: CreateRowParams = action.params()?;
        let snapshot = params.snapshot.take().ok_or_else(|| ActionError::Inapplicable {
            action_id: action.id,
            kind: action.kind,
            reason: "no snapshot of the removed row".to_string(),
        })?;
        db.rows().restore_row(user, params.table_id, &snapshot)?;
        Ok(serde_json::to_value(params)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRowParams {
    pub table_id: TableId,
    pub row_id: RowId,
    pub snapshot: RowSnapshot,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteRowActionType;

impl DeleteRowActionType {
    pub fn execute(db: &Database, user: &User, table_id: TableId, row_id: RowId) -> ActionResult<Action> {
        let snapshot = db.rows().delete_with_snapshot(user, table_id, row_id)?;
        let params = DeleteRowParams {
            table_id,
            row_id,
            snapshot,
        };
        db.actions()
            .register(user, ActionKind::DeleteRow, ActionScope::Table(table_id), &params)
    }
}

impl ActionType for DeleteRowActionType {
    fn kind(&self) -> ActionKind {
        ActionKind::DeleteRow
    }

    fn undo(&self, db: &Database, user: &User, action: &Action) -> ActionResult<Value> {
        let params: DeleteRowParams = action.params()?;
        db.rows().restore_row(user, params.table_id, &params.snapshot)?;
        Ok(serde_json::to_value(params)?)
    }

    fn redo(&self, db: &Database, user: &User, action: &Action) -> ActionResult<Value> {
        let mut params: DeleteRowParams = action.params()?;
        params.snapshot = db.rows().delete_with_snapshot(user, params.table_id, params.row_id)?;
        Ok(serde_json::to_value(params)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::db::fixtures::{raw, Fixture};
    use crate::db::ErrorKind;
    use crate::fields::StoredValue;
    use crate::storage::CellValue;

    #[test]
    fn test_undo_redo_create_row() {
        let fx = Fixture::new();
        let name = fx.text_field("Name");
        let scope = [ActionScope::Table(fx.table.id)];

        let (row, _) = CreateRowActionType::execute(
            &fx.db,
            &fx.user,
            fx.table.id,
            &raw(json!({ name.id.to_string(): "Alice" })),
            None,
        )
        .unwrap();

        fx.db.actions().undo(&fx.user, &scope).unwrap().unwrap();
        let err = fx.db.rows().get_row(&fx.user, fx.table.id, row.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RowNotFound);

        fx.db.actions().redo(&fx.user, &scope).unwrap().unwrap();
        let restored = fx.db.rows().get_row(&fx.user, fx.table.id, row.id).unwrap();
        assert_eq!(restored, row);
        assert_eq!(restored.values[&name.id], StoredValue::Cell(CellValue::from("Alice")));
    }

    #[test]
    fn test_undo_delete_row_restores_links_both_ways() {
        let fx = Fixture::new();
        let customers = fx.table("Customers");
        let link = fx.link_field("Customer", customers.id);
        let related = fx.db.catalog().field(link.id).unwrap().kind.link_row_related_field_id().unwrap();
        let customer = fx.row_in(customers.id, &[]);
        let order = fx.row(&[(link.id, json!([customer.id]))]);
        let scope = [ActionScope::Table(fx.table.id)];

        DeleteRowActionType::execute(&fx.db, &fx.user, fx.table.id, order.id).unwrap();
        let linked = fx.db.rows().get_row(&fx.user, customers.id, customer.id).unwrap();
        assert_eq!(linked.values[&related], StoredValue::Links(vec![]));

        fx.db.actions().undo(&fx.user, &scope).unwrap().unwrap();
        let restored = fx.db.rows().get_row(&fx.user, fx.table.id, order.id).unwrap();
        assert_eq!(restored, order);
        let linked = fx.db.rows().get_row(&fx.user, customers.id, customer.id).unwrap();
        assert_eq!(linked.values[&related], StoredValue::Links(vec![order.id]));

        fx.db.actions().redo(&fx.user, &scope).unwrap().unwrap();
        assert!(fx.db.rows().get_row(&fx.user, fx.table.id, order.id).is_err());
    }

    #[test]
    fn test_restored_row_moves_when_order_was_taken() {
        let fx = Fixture::new();
        let first = fx.row(&[]);
        let second = fx.row(&[]);
        let scope = [ActionScope::Table(fx.table.id)];

        DeleteRowActionType::execute(&fx.db, &fx.user, fx.table.id, second.id).unwrap();
        // takes order 2 again
        let third = fx.row(&[]);
        assert_eq!(third.order, second.order);

        fx.db.actions().undo(&fx.user, &scope).unwrap().unwrap();
        let ids: Vec<RowId> = fx
            .db
            .rows()
            .list_rows(&fx.user, fx.table.id)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![first.id, third.id, second.id]);
    }
}
