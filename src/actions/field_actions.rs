//! Field updates as undoable actions.
//!
//! The entry keeps the field definition before and after the update and the
//! backup of the storage replaced by the last application. Undo puts the
//! original definition back, redo the updated one; each step hands the
//! backup it consumed over to the storage it replaced, so the entry always
//! holds exactly one backup or none.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::error::ActionResult;
use crate::actions::models::{Action, ActionKind, ActionScope};
use crate::actions::registry::ActionType;
use crate::catalog::{FieldId, User};
use crate::db::Database;
use crate::fields::{BackupData, FieldSnapshot, FieldUpdate, UpdatedField};

/// Suffix for names that collide when an update is undone.
pub const UNDO_NAME_SUFFIX: &str = " (From undo)";
/// Suffix for names that collide when an update is redone.
pub const REDO_NAME_SUFFIX: &str = " (From redo)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFieldParams {
    pub field_id: FieldId,
    pub original: FieldSnapshot,
    pub updated: FieldSnapshot,
    #[serde(default)]
    pub backup_data: Option<BackupData>,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateFieldActionType;

impl UpdateFieldActionType {
    pub fn execute(
        db: &Database,
        user: &User,
        field_id: FieldId,
        update: FieldUpdate,
    ) -> ActionResult<(UpdatedField, Action)> {
        let updated = db.fields().update_field(user, field_id, update)?;
        let params = UpdateFieldParams {
            field_id,
            original: updated.original.clone(),
            updated: updated.updated.clone(),
            backup_data: updated.backup.clone(),
        };
        let action = db.actions().register(
            user,
            ActionKind::UpdateField,
            ActionScope::Table(updated.field.table_id),
            &params,
        )?;
        Ok((updated, action))
    }

    fn apply(
        db: &Database,
        user: &User,
        action: &Action,
        target: impl Fn(&UpdateFieldParams) -> &FieldSnapshot,
        suffix: &str,
    ) -> ActionResult<Value> {
        let mut params: UpdateFieldParams = action.params()?;
        let backup = db.fields().restore_field(
            user,
            params.field_id,
            target(&params),
            params.backup_data.as_ref(),
            suffix,
        )?;
        params.backup_data = backup;
        Ok(serde_json::to_value(params)?)
    }
}

impl ActionType for UpdateFieldActionType {
    fn kind(&self) -> ActionKind {
        ActionKind::UpdateField
    }

    fn undo(&self, db: &Database, user: &User, action: &Action) -> ActionResult<Value> {
        Self::apply(db, user, action, |p| &p.original, UNDO_NAME_SUFFIX)
    }

    fn redo(&self, db: &Database, user: &User, action: &Action) -> ActionResult<Value> {
        Self::apply(db, user, action, |p| &p.updated, REDO_NAME_SUFFIX)
    }

    fn clean_up_any_extra_action_data(&self, db: &Database, action: &Action) -> ActionResult<()> {
        let params: UpdateFieldParams = action.params()?;
        if let Some(backup) = &params.backup_data {
            db.fields().discard_backup(backup)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    use crate::catalog::{Field, FieldKind, SelectOption};
    use crate::db::fixtures::{raw, Fixture};
    use crate::fields::{SelectOptionInput, StoredValue};
    use crate::storage::{CellValue, RowId};
    use crate::trash::TrashableEntity;

    fn update(fx: &Fixture, field_id: FieldId, update: FieldUpdate) -> (UpdatedField, Action) {
        UpdateFieldActionType::execute(&fx.db, &fx.user, field_id, update).unwrap()
    }

    fn undo(fx: &Fixture) -> Action {
        fx.db
            .actions()
            .undo(&fx.user, &[ActionScope::Table(fx.table.id)])
            .unwrap()
            .unwrap()
    }

    fn redo(fx: &Fixture) -> Action {
        fx.db
            .actions()
            .redo(&fx.user, &[ActionScope::Table(fx.table.id)])
            .unwrap()
            .unwrap()
    }

    fn params(fx: &Fixture, action: &Action) -> UpdateFieldParams {
        fx.db.action_log().get(action.id).unwrap().params().unwrap()
    }

    fn field(fx: &Fixture, id: FieldId) -> Field {
        fx.db.catalog().field(id).unwrap()
    }

    fn option_values(fx: &Fixture, field_id: FieldId) -> Vec<String> {
        fx.db
            .catalog()
            .options_of(field_id)
            .into_iter()
            .map(|o| o.value)
            .collect()
    }

    fn number(places: u32) -> FieldKind {
        FieldKind::Number {
            number_decimal_places: places,
            number_negative: false,
        }
    }

    fn inputs(options: &[SelectOption]) -> Vec<SelectOptionInput> {
        options.iter().map(SelectOptionInput::from).collect()
    }

    /// Every backup column or link table still present in the store.
    fn backup_artifacts(fx: &Fixture) -> usize {
        fx.db.tables().store().read(|s| {
            let columns: Vec<String> = s
                .relation_names()
                .iter()
                .flat_map(|r| s.columns(r).unwrap_or_default())
                .map(|c| c.to_string())
                .collect();
            let tables = s.link_table_names().into_iter().map(|t| t.to_string());
            columns
                .into_iter()
                .chain(tables)
                .filter(|name| name.contains("_backup_"))
                .count()
        })
    }

    #[test]
    fn test_text_to_number_undo_redo() {
        let fx = Fixture::new();
        let text = fx.text_field("Amount");
        let rows: Vec<RowId> = ["1", "abc", "2.5"]
            .iter()
            .map(|v| fx.row(&[(text.id, json!(v))]).id)
            .collect();

        let (updated, action) = update(&fx, text.id, FieldUpdate::new().kind(number(0)));
        assert!(updated.backup.is_some());
        assert_eq!(fx.value(rows[0], text.id), StoredValue::Cell(CellValue::Number(Decimal::ONE)));
        assert_eq!(fx.value(rows[1], text.id), StoredValue::Cell(CellValue::Null));
        assert_eq!(fx.value(rows[2], text.id), StoredValue::Cell(CellValue::Number(Decimal::from(3))));

        undo(&fx);
        assert_eq!(field(&fx, text.id).kind, FieldKind::text());
        for (row, value) in rows.iter().zip(["1", "abc", "2.5"]) {
            assert_eq!(fx.value(*row, text.id), StoredValue::Cell(CellValue::from(value)));
        }
        // the converted column is kept for redo
        assert!(params(&fx, &action).backup_data.is_some());
        assert_eq!(backup_artifacts(&fx), 1);

        redo(&fx);
        assert_eq!(field(&fx, text.id).kind, number(0));
        assert_eq!(fx.value(rows[2], text.id), StoredValue::Cell(CellValue::Number(Decimal::from(3))));
        assert_eq!(backup_artifacts(&fx), 1);
    }

    #[test]
    fn test_rating_max_shrink_is_restored_by_undo() {
        let fx = Fixture::new();
        let rating = fx.field("Stars", FieldKind::Rating { max_value: 10 });
        let row = fx.row(&[(rating.id, json!(8))]);

        let (updated, _) = update(&fx, rating.id, FieldUpdate::new().kind(FieldKind::Rating { max_value: 5 }));
        assert!(updated.backup.is_some());
        assert_eq!(fx.value(row.id, rating.id), StoredValue::Cell(CellValue::Number(Decimal::from(5))));

        undo(&fx);
        assert_eq!(field(&fx, rating.id).kind, FieldKind::Rating { max_value: 10 });
        assert_eq!(fx.value(row.id, rating.id), StoredValue::Cell(CellValue::Number(Decimal::from(8))));
    }

    #[test]
    fn test_rating_max_grow_needs_no_backup() {
        let fx = Fixture::new();
        let rating = fx.field("Stars", FieldKind::Rating { max_value: 5 });
        let row = fx.row(&[(rating.id, json!(4))]);

        let (updated, action) = update(&fx, rating.id, FieldUpdate::new().kind(FieldKind::Rating { max_value: 10 }));
        assert!(updated.backup.is_none());

        // shrinking back on undo converts again
        undo(&fx);
        assert!(params(&fx, &action).backup_data.is_some());
        assert_eq!(fx.value(row.id, rating.id), StoredValue::Cell(CellValue::Number(Decimal::from(4))));

        redo(&fx);
        assert_eq!(field(&fx, rating.id).kind, FieldKind::Rating { max_value: 10 });
        assert_eq!(fx.value(row.id, rating.id), StoredValue::Cell(CellValue::Number(Decimal::from(4))));
    }

    #[test]
    fn test_link_row_to_text_undo_restores_both_sides() {
        let fx = Fixture::new();
        let customers = fx.table("Customers");
        let link = fx.link_field("Customer", customers.id);
        let related = field(&fx, link.id).kind.link_row_related_field_id().unwrap();
        let alice = fx.row_in(customers.id, &[]);
        let bob = fx.row_in(customers.id, &[]);
        let order = fx.row(&[(link.id, json!([alice.id, bob.id]))]);

        update(&fx, link.id, FieldUpdate::new().kind(FieldKind::text()));
        assert!(fx.db.catalog().field(related).is_err());
        assert_eq!(fx.value(order.id, link.id), StoredValue::Cell(CellValue::Null));

        undo(&fx);
        assert_eq!(field(&fx, link.id).kind.link_row_related_field_id(), Some(related));
        assert_eq!(field(&fx, related).kind.link_row_related_field_id(), Some(link.id));
        assert_eq!(fx.value(order.id, link.id), StoredValue::Links(vec![alice.id, bob.id]));
        let alice = fx.db.rows().get_row(&fx.user, customers.id, alice.id).unwrap();
        assert_eq!(alice.values[&related], StoredValue::Links(vec![order.id]));

        redo(&fx);
        assert!(fx.db.catalog().field(related).is_err());
        assert_eq!(field(&fx, link.id).kind, FieldKind::text());
    }

    #[test]
    fn test_text_to_link_row_undo_removes_related_field() {
        let fx = Fixture::new();
        let customers = fx.table("Customers");
        let text = fx.text_field("Customer");
        let row = fx.row(&[(text.id, json!("Alice"))]);

        let (updated, _) = update(
            &fx,
            text.id,
            FieldUpdate::new().kind(FieldKind::LinkRow {
                link_row_table_id: customers.id,
                link_row_related_field_id: None,
            }),
        );
        let related = updated.field.kind.link_row_related_field_id().unwrap();
        // named after the linking table
        assert_eq!(field(&fx, related).name, fx.table.name);
        assert_eq!(field(&fx, related).table_id, customers.id);

        undo(&fx);
        assert!(fx.db.catalog().field(related).is_err());
        assert_eq!(fx.value(row.id, text.id), StoredValue::Cell(CellValue::from("Alice")));

        redo(&fx);
        let related = field(&fx, text.id).kind.link_row_related_field_id().unwrap();
        assert_eq!(field(&fx, related).kind.link_row_related_field_id(), Some(text.id));
        assert_eq!(fx.value(row.id, text.id), StoredValue::Links(vec![]));
    }

    #[test]
    fn test_multiple_select_to_text_and_back() {
        let fx = Fixture::new();
        let (tags, options) = fx.multiple_select("Tags", &["a", "b"]);
        let row = fx.row(&[(tags.id, json!([options[0].id, options[1].id]))]);

        update(&fx, tags.id, FieldUpdate::new().kind(FieldKind::text()));
        assert_eq!(fx.value(row.id, tags.id), StoredValue::Cell(CellValue::from("a, b")));
        assert!(fx.db.catalog().options_of(tags.id).is_empty());

        undo(&fx);
        assert_eq!(option_values(&fx, tags.id), vec!["a", "b"]);
        assert_eq!(
            fx.value(row.id, tags.id),
            StoredValue::Links(vec![options[0].id, options[1].id])
        );
    }

    #[test]
    fn test_single_select_undo_discards_options_of_other_users() {
        let fx = Fixture::new();
        let other = fx.second_user("bob");
        let (status, options) = fx.single_select("Status", &["x", "y"]);
        let rows: Vec<RowId> = [Some(options[0].id), Some(options[1].id), None]
            .iter()
            .map(|o| fx.row(&[(status.id, json!(o))]).id)
            .collect();
        let expected: Vec<StoredValue> = [Some(options[0].id), Some(options[1].id), None]
            .iter()
            .map(|o| StoredValue::Cell(o.map(CellValue::Ref).unwrap_or_default()))
            .collect();

        // rename x, keep y
        let mut renamed = inputs(&options);
        renamed[0].value = "updated x".to_string();
        let (updated, action) = update(&fx, status.id, FieldUpdate::new().select_options(renamed));
        assert!(updated.backup.is_none());

        // bob adds an option in between
        let bob_option = fx
            .db
            .fields()
            .create_select_option(&other, status.id, "t", "green")
            .unwrap();

        undo(&fx);
        assert_eq!(option_values(&fx, status.id), vec!["x", "y"]);
        let restored: Vec<StoredValue> = rows.iter().map(|r| fx.value(*r, status.id)).collect();
        assert_eq!(restored, expected);
        // dropping bob's option took a backup
        assert!(params(&fx, &action).backup_data.is_some());

        // bob works on the field again
        fx.db
            .fields()
            .create_select_option(&other, status.id, "z", "blue")
            .unwrap();

        redo(&fx);
        assert_eq!(option_values(&fx, status.id), vec!["updated x", "y", "t"]);
        assert!(fx.db.catalog().options_of(status.id).iter().any(|o| o.id == bob_option.id));
        let redone: Vec<StoredValue> = rows.iter().map(|r| fx.value(*r, status.id)).collect();
        assert_eq!(redone, expected);
    }

    #[test]
    fn test_adding_option_and_undo() {
        let fx = Fixture::new();
        let (status, options) = fx.single_select("Status", &["x"]);
        let row = fx.row(&[(status.id, json!(options[0].id))]);

        let mut more = inputs(&options);
        more.push(SelectOptionInput::new("y", "blue"));
        let (updated, _) = update(&fx, status.id, FieldUpdate::new().select_options(more));
        assert!(updated.backup.is_none());
        let y = updated.updated.select_options[1].id;
        fx.db
            .rows()
            .update_row(&fx.user, fx.table.id, row.id, &raw(json!({ status.id.to_string(): y })))
            .unwrap();

        undo(&fx);
        assert_eq!(option_values(&fx, status.id), vec!["x"]);
        assert_eq!(fx.value(row.id, status.id), StoredValue::Cell(CellValue::Null));

        redo(&fx);
        assert_eq!(option_values(&fx, status.id), vec!["x", "y"]);
        assert_eq!(fx.value(row.id, status.id), StoredValue::Cell(CellValue::Ref(y)));
    }

    #[test]
    fn test_rename_without_backup() {
        let fx = Fixture::new();
        let text = fx.text_field("Name");
        let row = fx.row(&[(text.id, json!("Alice"))]);

        let (updated, action) = update(&fx, text.id, FieldUpdate::new().name("Title"));
        assert!(updated.backup.is_none());

        undo(&fx);
        assert_eq!(field(&fx, text.id).name, "Name");
        assert!(params(&fx, &action).backup_data.is_none());
        assert_eq!(backup_artifacts(&fx), 0);

        redo(&fx);
        assert_eq!(field(&fx, text.id).name, "Title");
        assert_eq!(fx.value(row.id, text.id), StoredValue::Cell(CellValue::from("Alice")));
    }

    #[test]
    fn test_name_collisions_get_suffixes() {
        let fx = Fixture::new();
        let text = fx.text_field("Name");

        update(&fx, text.id, FieldUpdate::new().name("Title"));
        let squatter = fx.text_field("Name");

        undo(&fx);
        assert_eq!(field(&fx, text.id).name, "Name (From undo)");
        assert_eq!(field(&fx, squatter.id).name, "Name");

        fx.db
            .fields()
            .update_field(&fx.user, squatter.id, FieldUpdate::new().name("Title"))
            .unwrap();
        redo(&fx);
        assert_eq!(field(&fx, text.id).name, "Title (From redo)");
    }

    #[test]
    fn test_undo_with_backup_resolves_name_collision() {
        let fx = Fixture::new();
        let text = fx.text_field("Amount");
        update(&fx, text.id, FieldUpdate::new().name("Total").kind(number(2)));
        fx.text_field("Amount");

        undo(&fx);
        assert_eq!(field(&fx, text.id).name, "Amount (From undo)");
        assert_eq!(field(&fx, text.id).kind, FieldKind::text());
    }

    #[test]
    fn test_forward_update_rejects_taken_name() {
        let fx = Fixture::new();
        let text = fx.text_field("Name");
        fx.text_field("Title");

        let err = UpdateFieldActionType::execute(&fx.db, &fx.user, text.id, FieldUpdate::new().name("Title"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::db::ErrorKind::Conflict);
        assert!(fx.db.action_log().is_empty());
    }

    #[test]
    fn test_clean_up_after_field_deleted_is_idempotent() {
        let fx = Fixture::new();
        let text = fx.text_field("Name");
        let amount = fx.text_field("Amount");
        fx.row(&[(amount.id, json!("5"))]);
        let (_, action) = update(&fx, amount.id, FieldUpdate::new().kind(number(0)));
        assert_eq!(backup_artifacts(&fx), 1);

        fx.db
            .trash()
            .permanently_delete(&fx.user, TrashableEntity::Field(amount.id))
            .unwrap();
        assert!(fx.db.action_log().get(action.id).is_some());

        let action = fx.db.action_log().get(action.id).unwrap();
        fx.db.actions().clean_up(&action).unwrap();
        fx.db.actions().clean_up(&action).unwrap();
        assert_eq!(backup_artifacts(&fx), 0);
        assert!(fx.db.catalog().field(text.id).is_ok());
    }

    #[test]
    fn test_clean_up_after_table_deleted() {
        let fx = Fixture::new();
        let customers = fx.table("Customers");
        let link = fx.link_field("Customer", customers.id);
        let (_, action) = update(&fx, link.id, FieldUpdate::new().kind(FieldKind::Boolean));
        assert_eq!(backup_artifacts(&fx), 1);

        let action = fx.db.action_log().get(action.id).unwrap();
        fx.db
            .trash()
            .permanently_delete(&fx.user, TrashableEntity::Table(fx.table.id))
            .unwrap();
        // entries scoped to the table went with it
        assert!(fx.db.action_log().get(action.id).is_none());
        assert_eq!(backup_artifacts(&fx), 0);

        fx.db.actions().clean_up(&action).unwrap();
    }

    #[test]
    fn test_rows_created_while_backup_exists() {
        let fx = Fixture::new();
        let text = fx.text_field("Amount");
        let before = fx.row(&[(text.id, json!("7"))]);
        update(&fx, text.id, FieldUpdate::new().kind(number(0)));

        let during = fx.row(&[(text.id, json!(3))]);
        undo(&fx);
        assert_eq!(fx.value(before.id, text.id), StoredValue::Cell(CellValue::from("7")));
        assert_eq!(fx.value(during.id, text.id), StoredValue::Cell(CellValue::Null));

        let after = fx.row(&[(text.id, json!("9"))]);
        redo(&fx);
        assert_eq!(fx.value(during.id, text.id), StoredValue::Cell(CellValue::Number(Decimal::from(3))));
        assert_eq!(fx.value(after.id, text.id), StoredValue::Cell(CellValue::Null));
    }

    #[test]
    fn test_failed_undo_leaves_entry_unchanged() {
        let fx = Fixture::new();
        let text = fx.text_field("Name");
        let (_, action) = update(&fx, text.id, FieldUpdate::new().kind(FieldKind::Boolean));
        fx.db
            .trash()
            .permanently_delete(&fx.user, TrashableEntity::Field(text.id))
            .unwrap();

        assert!(fx.db.actions().undo(&fx.user, &[ActionScope::Table(fx.table.id)]).is_err());
        assert_eq!(fx.db.action_log().get(action.id).unwrap(), action);
    }

    #[test]
    fn test_new_action_discards_redo_entries() {
        let fx = Fixture::new();
        let text = fx.text_field("Amount");
        fx.row(&[(text.id, json!("1"))]);
        let (_, first) = update(&fx, text.id, FieldUpdate::new().kind(number(0)));
        undo(&fx);
        assert_eq!(backup_artifacts(&fx), 1);

        update(&fx, text.id, FieldUpdate::new().name("Total"));
        assert!(fx.db.action_log().get(first.id).is_none());
        assert_eq!(backup_artifacts(&fx), 0);
        assert!(fx.db.actions().redo(&fx.user, &[ActionScope::Table(fx.table.id)]).unwrap().is_none());
    }
}
