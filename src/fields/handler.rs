//! Field management: creating, updating and restoring fields.
//!
//! Updates decide per application whether the change destroys stored values.
//! Destructive changes go through the snapshot protocol in
//! [`conversion`](crate::fields::conversion) and hand back the backup; all
//! other changes only touch the field definition.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogState, Field, FieldId, FieldKind, OptionId, SelectOption, TableId, TableMeta, User};
use crate::db::Database;
use crate::fields::conversion::{self, BackupData, FieldSnapshot};
use crate::fields::error::{FieldError, FieldResult};
use crate::fields::registry::{field_type, storage_of, StorageShape};
use crate::transaction::{LockTarget, Transaction, TxActive};

/// A select option as given in a field create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOptionInput {
    /// Existing option to keep; a new option is created when absent.
    #[serde(default)]
    pub id: Option<OptionId>,
    pub value: String,
    #[serde(default)]
    pub color: String,
}

impl SelectOptionInput {
    pub fn new(value: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: None,
            value: value.into(),
            color: color.into(),
        }
    }

    pub fn existing(id: OptionId, value: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            ..Self::new(value, color)
        }
    }
}

impl From<&SelectOption> for SelectOptionInput {
    fn from(option: &SelectOption) -> Self {
        Self::existing(option.id, option.value.clone(), option.color.clone())
    }
}

/// Requested changes to a field. Unset parts stay as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: Option<FieldKind>,
    #[serde(default)]
    pub select_options: Option<Vec<SelectOptionInput>>,
}

impl FieldUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn select_options(mut self, options: Vec<SelectOptionInput>) -> Self {
        self.select_options = Some(options);
        self
    }
}

/// Result of [`FieldHandler::update_field`].
#[derive(Debug, Clone)]
pub struct UpdatedField {
    pub field: Field,
    pub original: FieldSnapshot,
    pub updated: FieldSnapshot,
    /// Present when the update was destructive.
    pub backup: Option<BackupData>,
}

/// How a name conflict with another field is handled.
#[derive(Debug, Clone, Copy)]
enum NamePolicy<'s> {
    /// Fail with `FieldNameTaken`.
    Strict,
    /// Pick the first free name built with this suffix.
    Suffix(&'s str),
}

struct FieldDefinition {
    name: String,
    kind: FieldKind,
    options: Vec<SelectOptionInput>,
}

impl From<&FieldSnapshot> for FieldDefinition {
    fn from(snapshot: &FieldSnapshot) -> Self {
        Self {
            name: snapshot.field.name.clone(),
            kind: snapshot.field.kind.clone(),
            options: snapshot.select_options.iter().map(SelectOptionInput::from).collect(),
        }
    }
}

/// Make `inputs` the option set of `field_id`. Ids of options owned by the
/// field (or no longer owned by anyone) are kept; other inputs get new
/// options.
fn apply_options(meta: &mut CatalogState, field_id: FieldId, inputs: &[SelectOptionInput]) -> FieldResult<()> {
    let mut kept = Vec::new();
    let mut created = Vec::new();
    for (order, input) in inputs.iter().enumerate() {
        let reusable = input.id.filter(|id| match meta.option(*id) {
            Ok(existing) => existing.field_id == field_id,
            Err(_) => true,
        });
        match reusable {
            Some(id) => kept.push(SelectOption {
                id,
                field_id,
                value: input.value.clone(),
                color: input.color.clone(),
                order: order as u32,
            }),
            None => created.push((order as u32, input)),
        }
    }

    meta.replace_options(field_id, kept)?;
    for (order, input) in created {
        let option = meta.create_option(field_id, input.value.clone(), input.color.clone())?;
        meta.put_option(SelectOption { order, ..option })?;
    }
    Ok(())
}

/// Whether replacing `current` with `target` destroys stored values.
fn needs_backup(meta: &CatalogState, current: &Field, target: &FieldDefinition) -> bool {
    if !current.kind.same_type(&target.kind) {
        return true;
    }
    if field_type(&target.kind).is_lossy_update(&current.kind, &target.kind) {
        return true;
    }
    if target.kind.has_select_options() {
        let kept: Vec<OptionId> = target.options.iter().filter_map(|o| o.id).collect();
        return meta
            .options_of(current.id)
            .iter()
            .any(|o| !kept.contains(&o.id));
    }
    false
}

/// Replace the definition of `field_id` with `target`, converting stored
/// values through a backup when needed.
fn apply_definition(
    tx: &mut Transaction<TxActive>,
    meta: &mut CatalogState,
    field_id: FieldId,
    target: FieldDefinition,
    names: NamePolicy<'_>,
) -> FieldResult<Option<BackupData>> {
    let current = meta.field(field_id)?.clone();

    let name = match names {
        NamePolicy::Strict => {
            meta.check_name_free(current.table_id, &target.name, Some(field_id))?;
            target.name.clone()
        }
        NamePolicy::Suffix(suffix) => {
            let name = meta.find_unused_name(current.table_id, &target.name, suffix, Some(field_id));
            if name != target.name {
                tracing::info!(field_id, from = %target.name, to = %name, "resolved field name collision");
            }
            name
        }
    };

    // A link row that keeps its table keeps its pair.
    let kind = match (&current.kind, &target.kind) {
        (
            FieldKind::LinkRow {
                link_row_table_id: from,
                link_row_related_field_id,
            },
            FieldKind::LinkRow {
                link_row_table_id: to,
                ..
            },
        ) if from == to => FieldKind::LinkRow {
            link_row_table_id: *to,
            link_row_related_field_id: *link_row_related_field_id,
        },
        _ => target.kind.clone(),
    };
    let options: &[SelectOptionInput] = if kind.has_select_options() {
        &target.options
    } else {
        &[]
    };

    let lossy = needs_backup(meta, &current, &target);
    let backup = if lossy {
        Some(conversion::snapshot(tx, meta, field_id)?)
    } else {
        None
    };

    meta.put_field(Field {
        name,
        kind,
        ..current
    })?;
    apply_options(meta, field_id, options)?;

    if let Some(backup) = &backup {
        conversion::materialize(tx, meta, field_id)?;
        conversion::populate_from_backup(tx, meta, backup, field_id)?;
    }
    Ok(backup)
}

/// Lock `table` and every table linked through `kinds` exclusively, in
/// relation name order.
///
/// Row writers hold these locks shared, so no row changes while storage is
/// converted and a rollback of the change cannot undo their writes.
pub(crate) fn lock_tables<'k>(
    tx: &mut Transaction<TxActive>,
    meta: &CatalogState,
    table: &TableMeta,
    kinds: impl IntoIterator<Item = &'k FieldKind>,
) -> FieldResult<()> {
    let mut relations = BTreeSet::from([table.relation.clone()]);
    for linked in kinds.into_iter().filter_map(FieldKind::link_row_table_id) {
        if let Ok(linked) = meta.table(linked) {
            relations.insert(linked.relation.clone());
        }
    }
    for relation in relations {
        tx.lock(LockTarget::Table(relation))?;
    }
    Ok(())
}

/// Entry point for field changes.
pub struct FieldHandler<'a> {
    db: &'a Database,
}

impl<'a> FieldHandler<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a field with fresh storage at the end of `table_id`.
    pub fn create_field(
        &self,
        user: &User,
        table_id: TableId,
        name: &str,
        kind: FieldKind,
        select_options: Vec<SelectOptionInput>,
    ) -> FieldResult<Field> {
        self.db.atomic(|tx, meta| {
            let table = meta.table(table_id)?.clone();
            meta.check_user_in_group(user, table.group_id)?;
            if let Some(linked) = kind.link_row_table_id() {
                let linked = meta.table(linked)?.group_id;
                meta.check_user_in_group(user, linked)?;
            }
            lock_tables(tx, meta, &table, [&kind])?;

            let options = kind.has_select_options();
            let field = meta.insert_field(table_id, name, kind)?;
            if options {
                apply_options(meta, field.id, &select_options)?;
            }
            conversion::materialize(tx, meta, field.id)?;

            tracing::debug!(field_id = field.id, table_id, "created field");
            Ok(meta.field(field.id)?.clone())
        })
    }

    /// Add one option to a select field.
    pub fn create_select_option(
        &self,
        user: &User,
        field_id: FieldId,
        value: &str,
        color: &str,
    ) -> FieldResult<SelectOption> {
        self.db.catalog().atomic(|meta| {
            let field = meta.field(field_id)?.clone();
            let group_id = meta.table(field.table_id)?.group_id;
            meta.check_user_in_group(user, group_id)?;
            if !field.kind.has_select_options() {
                return Err(FieldError::InvalidUpdate(format!(
                    "{} fields have no select options",
                    field.kind
                )));
            }
            Ok(meta.create_option(field_id, value, color)?)
        })
    }

    /// Change a field's name, type, configuration or options.
    ///
    /// Fails with a conflict when the new name is used by another field of
    /// the table. Destructive changes return the backup of the old storage.
    pub fn update_field(&self, user: &User, field_id: FieldId, update: FieldUpdate) -> FieldResult<UpdatedField> {
        self.db.atomic(|tx, meta| {
            let field = meta.field(field_id)?.clone();
            let table = meta.table(field.table_id)?.clone();
            meta.check_user_in_group(user, table.group_id)?;
            if let Some(linked) = update.kind.as_ref().and_then(FieldKind::link_row_table_id) {
                let linked = meta.table(linked)?.group_id;
                meta.check_user_in_group(user, linked)?;
            }
            lock_tables(tx, meta, &table, [Some(&field.kind), update.kind.as_ref()].into_iter().flatten())?;

            let original = FieldSnapshot::capture(meta, field_id)?;
            let current_options: Vec<SelectOptionInput> =
                original.select_options.iter().map(SelectOptionInput::from).collect();
            let target = FieldDefinition {
                name: update.name.clone().unwrap_or_else(|| field.name.clone()),
                kind: update.kind.clone().unwrap_or_else(|| field.kind.clone()),
                options: update.select_options.clone().unwrap_or(current_options),
            };

            let backup = apply_definition(tx, meta, field_id, target, NamePolicy::Strict)?;
            let updated = FieldSnapshot::capture(meta, field_id)?;

            tracing::debug!(field_id, backup = backup.is_some(), "updated field");
            Ok(UpdatedField {
                field: updated.field.clone(),
                original,
                updated,
                backup,
            })
        })
    }

    /// Bring a field back to `target`.
    ///
    /// With `restore_from`, the stored backup is put back in place; without
    /// it, `target` is applied like an update. Name collisions are resolved
    /// with `suffix`. Returns the backup of the state being replaced, if one
    /// was needed.
    pub fn restore_field(
        &self,
        user: &User,
        field_id: FieldId,
        target: &FieldSnapshot,
        restore_from: Option<&BackupData>,
        suffix: &str,
    ) -> FieldResult<Option<BackupData>> {
        self.db.atomic(|tx, meta| {
            let field = meta.field(field_id)?.clone();
            let table = meta.table(field.table_id)?.clone();
            meta.check_user_in_group(user, table.group_id)?;
            lock_tables(tx, meta, &table, [&field.kind, &target.field.kind])?;

            match restore_from {
                Some(backup) => {
                    let interim = conversion::snapshot(tx, meta, field_id)?;
                    conversion::restore(tx, meta, field_id, backup, suffix)?;
                    Ok(Some(interim))
                }
                None => apply_definition(
                    tx,
                    meta,
                    field_id,
                    FieldDefinition::from(target),
                    NamePolicy::Suffix(suffix),
                ),
            }
        })
    }

    /// Remove a field and its storage for good.
    ///
    /// The mirroring field of a link row pair goes with it. Action entries
    /// referring to the field stay; applying them fails from now on.
    pub fn delete_field(&self, user: &User, field_id: FieldId) -> FieldResult<()> {
        self.db.atomic(|tx, meta| {
            let field = meta.field(field_id)?.clone();
            let table = meta.table(field.table_id)?.clone();
            meta.check_user_in_group(user, table.group_id)?;
            lock_tables(tx, meta, &table, [&field.kind])?;

            match storage_of(&field) {
                StorageShape::Column(column) => {
                    if tx.has_column(&table.relation, column.as_str()) {
                        tx.drop_column(&table.relation, &column)?;
                    }
                }
                StorageShape::Links { table: links, .. } => {
                    if tx.has_link_table(&links) {
                        tx.drop_link_table(&links)?;
                    }
                }
            }
            if let Some(related) = field.kind.link_row_related_field_id() {
                if related != field_id && meta.has_field(related) {
                    meta.remove_field(related)?;
                }
            }
            meta.remove_field(field_id)?;

            tracing::info!(field_id, table_id = table.id, "deleted field");
            Ok(())
        })
    }

    /// Drop the storage held by a backup.
    pub fn discard_backup(&self, backup: &BackupData) -> FieldResult<()> {
        self.db
            .tables()
            .with_transaction(|tx| conversion::discard(tx, backup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    use crate::catalog::CatalogError;
    use crate::db::fixtures::Fixture;
    use crate::db::ErrorKind;
    use crate::fields::StoredValue;
    use crate::storage::CellValue;

    #[test]
    fn test_create_field_adds_column_with_default() {
        let fx = Fixture::new();
        let row = fx.row(&[]);
        let field = fx
            .db
            .fields()
            .create_field(
                &fx.user,
                fx.table.id,
                "Title",
                FieldKind::Text {
                    text_default: "untitled".to_string(),
                },
                vec![],
            )
            .unwrap();

        let row = fx.db.rows().get_row(&fx.user, fx.table.id, row.id).unwrap();
        assert_eq!(
            row.values.get(&field.id),
            Some(&StoredValue::Cell(CellValue::from("untitled")))
        );
    }

    #[test]
    fn test_update_name_only_has_no_backup() {
        let fx = Fixture::new();
        let field = fx.text_field("Name");

        let updated = fx
            .db
            .fields()
            .update_field(&fx.user, field.id, FieldUpdate::new().name("Title"))
            .unwrap();

        assert!(updated.backup.is_none());
        assert_eq!(updated.field.name, "Title");
        assert_eq!(updated.original.field.name, "Name");
    }

    #[test]
    fn test_update_rejects_taken_name() {
        let fx = Fixture::new();
        let field = fx.text_field("Name");
        fx.text_field("Notes");

        let err = fx
            .db
            .fields()
            .update_field(&fx.user, field.id, FieldUpdate::new().name("Notes"))
            .unwrap_err();
        assert!(matches!(
            err,
            FieldError::Catalog(CatalogError::FieldNameTaken { .. })
        ));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_type_change_converts_values() {
        let fx = Fixture::new();
        let field = fx.text_field("Amount");
        let first = fx.row(&[(field.id, json!("12"))]);
        let second = fx.row(&[(field.id, json!("abc"))]);

        let updated = fx
            .db
            .fields()
            .update_field(
                &fx.user,
                field.id,
                FieldUpdate::new().kind(FieldKind::Number {
                    number_decimal_places: 0,
                    number_negative: false,
                }),
            )
            .unwrap();
        assert!(updated.backup.is_some());

        let value = |id| fx.db.rows().get_row(&fx.user, fx.table.id, id).unwrap().values[&field.id].clone();
        assert_eq!(value(first.id), StoredValue::Cell(CellValue::Number(Decimal::new(12, 0))));
        assert_eq!(value(second.id), StoredValue::Cell(CellValue::Null));
    }

    #[test]
    fn test_adding_option_is_not_destructive() {
        let fx = Fixture::new();
        let (field, options) = fx.single_select("Status", &["x", "y"]);

        let mut inputs: Vec<SelectOptionInput> = options.iter().map(SelectOptionInput::from).collect();
        inputs.push(SelectOptionInput::new("z", "green"));
        let updated = fx
            .db
            .fields()
            .update_field(&fx.user, field.id, FieldUpdate::new().select_options(inputs))
            .unwrap();

        assert!(updated.backup.is_none());
        assert_eq!(updated.updated.select_options.len(), 3);

        // removing one again is
        let updated = fx
            .db
            .fields()
            .update_field(
                &fx.user,
                field.id,
                FieldUpdate::new().select_options(vec![SelectOptionInput::from(&options[0])]),
            )
            .unwrap();
        assert!(updated.backup.is_some());
    }

    #[test]
    fn test_update_requires_group_membership() {
        let fx = Fixture::new();
        let field = fx.text_field("Name");
        let outsider = fx.db.create_user("mallory");

        let err = fx
            .db
            .fields()
            .update_field(&outsider, field.id, FieldUpdate::new().name("x"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(fx.db.catalog().field(field.id).unwrap().name, "Name");
    }

    #[test]
    fn test_discard_backup_is_idempotent() {
        let fx = Fixture::new();
        let field = fx.text_field("Name");
        let updated = fx
            .db
            .fields()
            .update_field(&fx.user, field.id, FieldUpdate::new().kind(FieldKind::Boolean))
            .unwrap();
        let backup = updated.backup.unwrap();

        fx.db.fields().discard_backup(&backup).unwrap();
        fx.db.fields().discard_backup(&backup).unwrap();

        let relation = fx.table.relation.clone();
        let columns = fx.db.tables().store().read(|s| s.columns(&relation)).unwrap();
        assert!(columns.iter().all(|c| !c.as_str().contains("backup")));
    }
}
