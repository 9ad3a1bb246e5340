//! Row mutation engine.
//!
//! [`RowHandler`] creates, reads, updates and deletes rows of user tables.
//! Every operation checks group membership first, runs values through the
//! field type pipeline and persists inside one transaction on the user
//! table store. Order values come from the [`ordering`] allocator.

mod error;
mod handler;
pub mod ordering;

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{FieldId, TableModel};
use crate::fields::{field_type, load_values, StoredValue};
use crate::storage::{CellValue, ColumnName, LinkSide, RelationName, RowId, StoredRow};

pub use error::{RowError, RowResult};
pub use handler::RowHandler;
pub use ordering::ORDER_EPSILON;

/// A row with its values keyed by field id.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub order: Decimal,
    pub values: BTreeMap<FieldId, StoredValue>,
}

impl Row {
    /// Load a stored row, resolving link fields through `links`.
    pub fn load<E>(
        model: &TableModel,
        row: &StoredRow,
        links: impl FnMut(&RelationName, LinkSide, RowId) -> Result<Vec<RowId>, E>,
    ) -> Result<Self, E> {
        Ok(Self {
            id: row.id,
            order: row.order,
            values: load_values(model, row, links)?,
        })
    }

    /// User facing JSON rendering: `id`, `order` and one `field_<id>` entry
    /// per field of `model`.
    pub fn export(&self, model: &TableModel) -> Value {
        let mut out = Map::new();
        out.insert("id".to_string(), Value::from(self.id));
        out.insert("order".to_string(), Value::String(self.order.to_string()));
        for field in &model.fields {
            if let Some(value) = self.values.get(&field.id()) {
                let exported = field_type(&field.field.kind).export_value(field, value);
                out.insert(format!("field_{}", field.id()), exported);
            }
        }
        Value::Object(out)
    }
}

/// Links of one row in one link table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub table: RelationName,
    pub side: LinkSide,
    pub targets: Vec<RowId>,
}

/// Everything stored for a row, used to bring a deleted row back with the
/// same id and order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSnapshot {
    pub id: RowId,
    pub order: Decimal,
    pub cells: BTreeMap<ColumnName, CellValue>,
    #[serde(default)]
    pub links: Vec<LinkSnapshot>,
}
