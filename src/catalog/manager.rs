//! Catalog manager for metadata persistence and retrieval.
//!
//! Metadata lives in its own store, separate from the tenant tables. Changes
//! go through [`Catalog::atomic`], which works on a copy of the state and
//! swaps it in only when the closure succeeds, so a metadata change and the
//! storage transaction wrapped around it either both land or neither does.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::catalog::error::{CatalogError, CatalogResult};
use crate::catalog::model::{FieldObject, TableModel};
use crate::catalog::types::{
    Field, FieldId, FieldKind, Group, GroupId, OptionId, SelectOption, TableId, TableMeta, User,
    UserId,
};
use crate::storage::RelationName;

/// Longest accepted field name.
const MAX_FIELD_NAME_LEN: usize = 255;

/// The metadata store.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone, Default)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

#[derive(Default)]
struct CatalogInner {
    state: RwLock<CatalogState>,
    /// Serializes `atomic` calls.
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, Default)]
struct Sequences {
    user: u64,
    group: u64,
    table: u64,
    field: u64,
    option: u64,
}

fn next(seq: &mut u64) -> u64 {
    *seq += 1;
    *seq
}

/// All metadata records.
#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    users: BTreeMap<UserId, User>,
    groups: BTreeMap<GroupId, Group>,
    tables: BTreeMap<TableId, TableMeta>,
    fields: BTreeMap<FieldId, Field>,
    options: BTreeMap<OptionId, SelectOption>,
    seq: Sequences,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute a function with read access to the metadata.
    pub fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&CatalogState) -> T,
    {
        let state = self.inner.state.read();
        f(&state)
    }

    /// Apply a change atomically.
    ///
    /// The closure runs against a copy of the state; the copy replaces the
    /// live state only if the closure returns `Ok`. Calls are serialized.
    /// The closure must not call back into this catalog's `atomic`.
    pub fn atomic<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut CatalogState) -> Result<T, E>,
    {
        let _guard = self.inner.write_lock.lock();
        let mut draft = self.inner.state.read().clone();
        let value = f(&mut draft)?;
        *self.inner.state.write() = draft;
        Ok(value)
    }

    // ==================== Convenience Reads ====================

    pub fn user(&self, id: UserId) -> CatalogResult<User> {
        self.read(|s| s.user(id).cloned())
    }

    pub fn group(&self, id: GroupId) -> CatalogResult<Group> {
        self.read(|s| s.group(id).cloned())
    }

    pub fn table(&self, id: TableId) -> CatalogResult<TableMeta> {
        self.read(|s| s.table(id).cloned())
    }

    pub fn field(&self, id: FieldId) -> CatalogResult<Field> {
        self.read(|s| s.field(id).cloned())
    }

    pub fn fields_of(&self, table_id: TableId) -> Vec<Field> {
        self.read(|s| s.fields_of(table_id).into_iter().cloned().collect())
    }

    pub fn options_of(&self, field_id: FieldId) -> Vec<SelectOption> {
        self.read(|s| s.options_of(field_id).into_iter().cloned().collect())
    }

    pub fn get_model(&self, table_id: TableId, field_ids: Option<&[FieldId]>) -> CatalogResult<TableModel> {
        self.read(|s| s.get_model(table_id, field_ids))
    }

    /// Fetch a table after checking that `user` belongs to its group.
    pub fn table_for_user(&self, user: &User, table_id: TableId) -> CatalogResult<TableMeta> {
        self.read(|s| {
            let table = s.table(table_id)?;
            s.check_user_in_group(user, table.group_id)?;
            Ok(table.clone())
        })
    }

    // ==================== Setup ====================

    pub fn create_user(&self, username: impl Into<String>) -> User {
        let username = username.into();
        let _guard = self.inner.write_lock.lock();
        let mut state = self.inner.state.write();
        let id = next(&mut state.seq.user);
        let user = User {
            id,
            username,
            session: None,
        };
        state.users.insert(id, user.clone());
        user
    }

    pub fn create_group(&self, name: impl Into<String>, members: &[&User]) -> Group {
        let name = name.into();
        let _guard = self.inner.write_lock.lock();
        let mut state = self.inner.state.write();
        let id = next(&mut state.seq.group);
        let group = Group {
            id,
            name,
            members: members.iter().map(|u| u.id).collect(),
        };
        state.groups.insert(id, group.clone());
        group
    }

    pub fn add_member(&self, group_id: GroupId, user: &User) -> CatalogResult<()> {
        let _guard = self.inner.write_lock.lock();
        let mut state = self.inner.state.write();
        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or(CatalogError::GroupNotFound(group_id))?;
        group.members.insert(user.id);
        Ok(())
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Catalog")
            .field("tables", &state.tables.len())
            .field("fields", &state.fields.len())
            .finish()
    }
}

impl CatalogState {
    // ==================== Reads ====================

    pub fn user(&self, id: UserId) -> CatalogResult<&User> {
        self.users.get(&id).ok_or(CatalogError::UserNotFound(id))
    }

    pub fn group(&self, id: GroupId) -> CatalogResult<&Group> {
        self.groups.get(&id).ok_or(CatalogError::GroupNotFound(id))
    }

    pub fn table(&self, id: TableId) -> CatalogResult<&TableMeta> {
        self.tables.get(&id).ok_or(CatalogError::TableNotFound(id))
    }

    pub fn field(&self, id: FieldId) -> CatalogResult<&Field> {
        self.fields.get(&id).ok_or(CatalogError::FieldNotFound(id))
    }

    pub fn option(&self, id: OptionId) -> CatalogResult<&SelectOption> {
        self.options.get(&id).ok_or(CatalogError::OptionNotFound(id))
    }

    pub fn has_field(&self, id: FieldId) -> bool {
        self.fields.contains_key(&id)
    }

    /// Fields of a table in display order.
    pub fn fields_of(&self, table_id: TableId) -> Vec<&Field> {
        let mut fields: Vec<&Field> = self
            .fields
            .values()
            .filter(|f| f.table_id == table_id)
            .collect();
        fields.sort_by_key(|f| (f.order, f.id));
        fields
    }

    /// Options of a select field in display order.
    pub fn options_of(&self, field_id: FieldId) -> Vec<&SelectOption> {
        let mut options: Vec<&SelectOption> = self
            .options
            .values()
            .filter(|o| o.field_id == field_id)
            .collect();
        options.sort_by_key(|o| (o.order, o.id));
        options
    }

    pub fn field_by_name(&self, table_id: TableId, name: &str) -> Option<&Field> {
        self.fields
            .values()
            .find(|f| f.table_id == table_id && f.name == name)
    }

    pub fn tables_in(&self, group_id: GroupId) -> Vec<&TableMeta> {
        self.tables
            .values()
            .filter(|t| t.group_id == group_id)
            .collect()
    }

    pub fn check_user_in_group(&self, user: &User, group_id: GroupId) -> CatalogResult<()> {
        if self.group(group_id)?.has_user(user) {
            Ok(())
        } else {
            Err(CatalogError::UserNotInGroup {
                user_id: user.id,
                group_id,
            })
        }
    }

    /// Describe a table's fields, optionally narrowed to `field_ids`.
    ///
    /// Ids that are unknown or belong to another table are skipped.
    pub fn get_model(&self, table_id: TableId, field_ids: Option<&[FieldId]>) -> CatalogResult<TableModel> {
        let table = self.table(table_id)?.clone();
        let fields = self
            .fields_of(table_id)
            .into_iter()
            .filter(|f| field_ids.map(|ids| ids.contains(&f.id)).unwrap_or(true))
            .map(|f| FieldObject {
                field: f.clone(),
                options: self.options_of(f.id).into_iter().cloned().collect(),
            })
            .collect();
        Ok(TableModel { table, fields })
    }

    // ==================== Writes ====================

    pub fn create_table(&mut self, group_id: GroupId, name: impl Into<String>) -> CatalogResult<TableMeta> {
        self.group(group_id)?;
        let id = next(&mut self.seq.table);
        let table = TableMeta {
            id,
            name: name.into(),
            group_id,
            relation: RelationName::user_table(id),
        };
        self.tables.insert(id, table.clone());
        Ok(table)
    }

    /// Remove a table together with its fields and their options.
    pub fn remove_table(&mut self, id: TableId) -> CatalogResult<TableMeta> {
        let table = self.tables.remove(&id).ok_or(CatalogError::TableNotFound(id))?;
        let field_ids: Vec<FieldId> = self
            .fields
            .values()
            .filter(|f| f.table_id == id)
            .map(|f| f.id)
            .collect();
        for field_id in field_ids {
            self.remove_field(field_id)?;
        }
        Ok(table)
    }

    fn validate_field_name(name: &str) -> CatalogResult<()> {
        if name.trim().is_empty() {
            return Err(CatalogError::InvalidFieldName("name cannot be empty".to_string()));
        }
        if name.chars().count() > MAX_FIELD_NAME_LEN {
            return Err(CatalogError::InvalidFieldName(format!(
                "name is longer than {MAX_FIELD_NAME_LEN} characters"
            )));
        }
        Ok(())
    }

    /// Fail if `name` is used by another field of the table.
    pub fn check_name_free(&self, table_id: TableId, name: &str, except: Option<FieldId>) -> CatalogResult<()> {
        Self::validate_field_name(name)?;
        match self.field_by_name(table_id, name) {
            Some(other) if Some(other.id) != except => Err(CatalogError::FieldNameTaken {
                table_id,
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// First of `desired`, `desired + suffix`, `desired + suffix + " 2"`, ...
    /// not used by another field of the table.
    pub fn find_unused_name(
        &self,
        table_id: TableId,
        desired: &str,
        suffix: &str,
        except: Option<FieldId>,
    ) -> String {
        let taken = |name: &str| {
            self.field_by_name(table_id, name)
                .map(|f| Some(f.id) != except)
                .unwrap_or(false)
        };

        if !taken(desired) {
            return desired.to_string();
        }
        let base = format!("{desired}{suffix}");
        if !taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base} {n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Add a new field at the end of the table.
    pub fn insert_field(
        &mut self,
        table_id: TableId,
        name: impl Into<String>,
        kind: FieldKind,
    ) -> CatalogResult<Field> {
        let name = name.into();
        self.table(table_id)?;
        self.check_name_free(table_id, &name, None)?;

        let fields = self.fields_of(table_id);
        let order = fields.iter().map(|f| f.order + 1).max().unwrap_or(0);
        let primary = fields.is_empty();

        let id = next(&mut self.seq.field);
        let field = Field {
            id,
            table_id,
            name,
            order,
            primary,
            kind,
        };
        self.fields.insert(id, field.clone());
        Ok(field)
    }

    /// Insert or replace a field record as given.
    pub fn put_field(&mut self, field: Field) -> CatalogResult<()> {
        self.table(field.table_id)?;
        Self::validate_field_name(&field.name)?;
        self.seq.field = self.seq.field.max(field.id);
        self.fields.insert(field.id, field);
        Ok(())
    }

    pub fn update_field_kind(&mut self, id: FieldId, kind: FieldKind) -> CatalogResult<()> {
        let field = self.fields.get_mut(&id).ok_or(CatalogError::FieldNotFound(id))?;
        field.kind = kind;
        Ok(())
    }

    /// Remove a field and its select options.
    pub fn remove_field(&mut self, id: FieldId) -> CatalogResult<Field> {
        let field = self.fields.remove(&id).ok_or(CatalogError::FieldNotFound(id))?;
        self.options.retain(|_, o| o.field_id != id);
        Ok(field)
    }

    pub fn create_option(
        &mut self,
        field_id: FieldId,
        value: impl Into<String>,
        color: impl Into<String>,
    ) -> CatalogResult<SelectOption> {
        self.field(field_id)?;
        let order = self
            .options_of(field_id)
            .iter()
            .map(|o| o.order + 1)
            .max()
            .unwrap_or(0);
        let id = next(&mut self.seq.option);
        let option = SelectOption {
            id,
            field_id,
            value: value.into(),
            color: color.into(),
            order,
        };
        self.options.insert(id, option.clone());
        Ok(option)
    }

    /// Insert or replace an option record as given.
    pub fn put_option(&mut self, option: SelectOption) -> CatalogResult<()> {
        self.field(option.field_id)?;
        self.seq.option = self.seq.option.max(option.id);
        self.options.insert(option.id, option);
        Ok(())
    }

    /// Make `options` the exact option set of `field_id`.
    pub fn replace_options(&mut self, field_id: FieldId, options: Vec<SelectOption>) -> CatalogResult<()> {
        self.field(field_id)?;
        self.options.retain(|_, o| o.field_id != field_id);
        for option in options {
            self.put_option(SelectOption { field_id, ..option })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Catalog, User, TableMeta) {
        let catalog = Catalog::new();
        let user = catalog.create_user("alice");
        let group = catalog.create_group("Acme", &[&user]);
        let table = catalog
            .atomic(|s| s.create_table(group.id, "Customers"))
            .unwrap();
        (catalog, user, table)
    }

    #[test]
    fn test_create_table_and_fields() {
        let (catalog, _user, table) = setup();
        assert_eq!(table.relation.as_str(), format!("database_table_{}", table.id));

        let (name, amount) = catalog
            .atomic(|s| {
                let name = s.insert_field(table.id, "Name", FieldKind::text())?;
                let amount = s.insert_field(
                    table.id,
                    "Amount",
                    FieldKind::Number {
                        number_decimal_places: 0,
                        number_negative: false,
                    },
                )?;
                Ok::<_, CatalogError>((name, amount))
            })
            .unwrap();

        assert!(name.primary);
        assert!(!amount.primary);
        assert!(amount.order > name.order);

        let model = catalog.get_model(table.id, Some(&[amount.id])).unwrap();
        assert_eq!(model.fields.len(), 1);
        assert_eq!(model.fields[0].field.id, amount.id);
    }

    #[test]
    fn test_atomic_discards_failed_changes() {
        let (catalog, _user, table) = setup();

        let result = catalog.atomic(|s| {
            s.insert_field(table.id, "Name", FieldKind::text())?;
            s.insert_field(table.id, "Name", FieldKind::text())
        });

        assert!(matches!(result, Err(CatalogError::FieldNameTaken { .. })));
        assert!(catalog.fields_of(table.id).is_empty());
    }

    #[test]
    fn test_table_for_user_checks_membership() {
        let (catalog, user, table) = setup();
        assert!(catalog.table_for_user(&user, table.id).is_ok());

        let outsider = catalog.create_user("mallory");
        let err = catalog.table_for_user(&outsider, table.id).unwrap_err();
        assert!(matches!(err, CatalogError::UserNotInGroup { .. }));
    }

    #[test]
    fn test_find_unused_name() {
        let (catalog, _user, table) = setup();
        catalog
            .atomic(|s| {
                s.insert_field(table.id, "Status", FieldKind::text())?;
                s.insert_field(table.id, "Status (From undo)", FieldKind::text())
            })
            .unwrap();

        catalog.read(|s| {
            assert_eq!(s.find_unused_name(table.id, "Other", " (From undo)", None), "Other");
            assert_eq!(
                s.find_unused_name(table.id, "Status", " (From undo)", None),
                "Status (From undo) 2"
            );
            assert_eq!(
                s.find_unused_name(table.id, "Status", " (From redo)", None),
                "Status (From redo)"
            );
        });
    }

    #[test]
    fn test_replace_options_and_remove_field() {
        let (catalog, _user, table) = setup();
        let field = catalog
            .atomic(|s| s.insert_field(table.id, "Color", FieldKind::SingleSelect))
            .unwrap();
        let (a, _b) = catalog
            .atomic(|s| {
                let a = s.create_option(field.id, "a", "red")?;
                let b = s.create_option(field.id, "b", "blue")?;
                Ok::<_, CatalogError>((a, b))
            })
            .unwrap();

        catalog
            .atomic(|s| s.replace_options(field.id, vec![a.clone()]))
            .unwrap();
        assert_eq!(catalog.options_of(field.id), vec![a]);

        catalog.atomic(|s| s.remove_field(field.id)).unwrap();
        assert!(catalog.options_of(field.id).is_empty());
        assert!(matches!(
            catalog.field(field.id),
            Err(CatalogError::FieldNotFound(_))
        ));
    }
}
