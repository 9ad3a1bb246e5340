//! Materialized description of a table's schema.

use crate::catalog::types::{Field, FieldId, SelectOption, TableMeta};
use crate::storage::RelationName;

/// A field together with its select options.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldObject {
    pub field: Field,
    pub options: Vec<SelectOption>,
}

impl FieldObject {
    pub fn id(&self) -> FieldId {
        self.field.id
    }
}

/// Fields of one table, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableModel {
    pub table: TableMeta,
    pub fields: Vec<FieldObject>,
}

impl TableModel {
    pub fn relation(&self) -> &RelationName {
        &self.table.relation
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldObject> {
        self.fields.iter().find(|f| f.field.id == id)
    }

    pub fn field_ids(&self) -> Vec<FieldId> {
        self.fields.iter().map(|f| f.field.id).collect()
    }
}
