//! Shared test setup: a database with one user, one group and an `Orders`
//! table. Nothing created here is recorded in the action log.

use std::sync::Arc;

use serde_json::Value;

use crate::catalog::{Field, FieldId, FieldKind, Group, SelectOption, TableId, TableMeta, User};
use crate::db::{Database, DatabaseConfig};
use crate::fields::{RawValues, SelectOptionInput, StoredValue};
use crate::rows::Row;
use crate::storage::RowId;

/// Row input from a JSON object literal.
pub(crate) fn raw(value: Value) -> RawValues {
    match value {
        Value::Object(map) => map,
        other => panic!("row input must be an object, got {other}"),
    }
}

pub(crate) struct Fixture {
    pub db: Arc<Database>,
    pub user: User,
    pub group: Group,
    pub table: TableMeta,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Self {
        let db = Arc::new(Database::with_config(config));
        let user = db.create_user("alice").with_session("session-1");
        let group = db.create_group("Acme", &[&user]);
        let table = db.create_table(&user, group.id, "Orders").unwrap();
        Self {
            db,
            user,
            group,
            table,
        }
    }

    /// Another table in the same group.
    pub fn table(&self, name: &str) -> TableMeta {
        self.db.create_table(&self.user, self.group.id, name).unwrap()
    }

    /// Another member of the group, with its own session.
    pub fn second_user(&self, name: &str) -> User {
        let user = self.db.create_user(name).with_session(format!("{name}-session"));
        self.db.catalog().add_member(self.group.id, &user).unwrap();
        user
    }

    pub fn field(&self, name: &str, kind: FieldKind) -> Field {
        self.db
            .fields()
            .create_field(&self.user, self.table.id, name, kind, vec![])
            .unwrap()
    }

    pub fn text_field(&self, name: &str) -> Field {
        self.field(name, FieldKind::text())
    }

    pub fn number_field(&self, name: &str, places: u32) -> Field {
        self.field(
            name,
            FieldKind::Number {
                number_decimal_places: places,
                number_negative: false,
            },
        )
    }

    pub fn link_field(&self, name: &str, table_id: TableId) -> Field {
        self.field(
            name,
            FieldKind::LinkRow {
                link_row_table_id: table_id,
                link_row_related_field_id: None,
            },
        )
    }

    pub fn single_select(&self, name: &str, values: &[&str]) -> (Field, Vec<SelectOption>) {
        self.select(name, FieldKind::SingleSelect, values)
    }

    pub fn multiple_select(&self, name: &str, values: &[&str]) -> (Field, Vec<SelectOption>) {
        self.select(name, FieldKind::MultipleSelect, values)
    }

    fn select(&self, name: &str, kind: FieldKind, values: &[&str]) -> (Field, Vec<SelectOption>) {
        let inputs = values.iter().map(|v| SelectOptionInput::new(*v, "blue")).collect();
        let field = self
            .db
            .fields()
            .create_field(&self.user, self.table.id, name, kind, inputs)
            .unwrap();
        let options = self.db.catalog().options_of(field.id);
        (field, options)
    }

    /// A row of the main table.
    pub fn row(&self, values: &[(FieldId, Value)]) -> Row {
        self.row_in(self.table.id, values)
    }

    pub fn row_in(&self, table_id: TableId, values: &[(FieldId, Value)]) -> Row {
        let values: RawValues = values
            .iter()
            .map(|(id, value)| (id.to_string(), value.clone()))
            .collect();
        self.db
            .rows()
            .create_row(&self.user, table_id, &values, None)
            .unwrap()
    }

    /// Stored value of a field in a row of the main table.
    pub fn value(&self, row_id: RowId, field_id: FieldId) -> StoredValue {
        let row = self.db.rows().get_row(&self.user, self.table.id, row_id).unwrap();
        row.values[&field_id].clone()
    }
}
