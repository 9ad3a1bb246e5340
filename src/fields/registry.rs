//! Field type capabilities and the static type registry.
//!
//! Every field type implements [`FieldType`]: how its values are stored, how
//! raw input is coerced into storage form, how stored values are exported and
//! how values coming from another type are converted. The implementation for a
//! field is selected by its [`FieldKind`] tag in [`field_type`].

use std::fmt;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::catalog::{Field, FieldKind, FieldObject, TableId};
use crate::fields::error::FieldResult;
use crate::fields::types::{
    BooleanFieldType, FileFieldType, LinkRowFieldType, MultipleSelectFieldType, NumberFieldType,
    RatingFieldType, SingleSelectFieldType, TextFieldType,
};
use crate::storage::{CellValue, ColumnName, LinkSide, RelationName, RowId};

/// What the targets of a link table are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTargets {
    /// Rows of another (or the same) table.
    Rows(TableId),
    /// Select options of the field itself.
    Options,
}

/// Where the values of a field live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageShape {
    /// One column of the table's relation.
    Column(ColumnName),
    /// A link table; the row id sits on `side`.
    Links {
        table: RelationName,
        side: LinkSide,
        targets: LinkTargets,
    },
}

/// A field value in storage form.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Cell(CellValue),
    /// Ids linked through the field's link table, ascending.
    Links(Vec<RowId>),
}

impl StoredValue {
    pub fn as_cell(&self) -> Option<&CellValue> {
        match self {
            StoredValue::Cell(cell) => Some(cell),
            StoredValue::Links(_) => None,
        }
    }

    pub fn as_links(&self) -> Option<&[RowId]> {
        match self {
            StoredValue::Links(ids) => Some(ids),
            StoredValue::Cell(_) => None,
        }
    }
}

/// Capabilities of one field type.
pub trait FieldType: fmt::Debug + Send + Sync {
    /// Type tag, matches [`FieldKind::type_name`].
    fn type_name(&self) -> &'static str;

    /// Where values of `field` are stored.
    fn storage(&self, field: &Field) -> StorageShape {
        StorageShape::Column(ColumnName::field(field.id))
    }

    /// Value of a row that was not given one.
    fn default_value(&self, _field: &Field) -> StoredValue {
        StoredValue::Cell(CellValue::Null)
    }

    /// Validate and coerce raw input into storage form.
    fn prepare_value_for_db(&self, field: &FieldObject, value: &Value) -> FieldResult<StoredValue>;

    /// User facing rendering of a stored value.
    fn export_value(&self, field: &FieldObject, value: &StoredValue) -> Value;

    /// Rendering handed to another type's [`convert_value`](Self::convert_value)
    /// when the field changes type.
    fn export_for_conversion(&self, field: &FieldObject, value: &StoredValue) -> Value {
        self.export_value(field, value)
    }

    /// Leniently convert a value exported by another field into this type.
    /// Values that cannot be represented become empty.
    fn convert_value(&self, target: &FieldObject, value: &Value) -> StoredValue;

    /// Whether changing configuration from `from` to `to` (same type) would
    /// destroy stored values.
    fn is_lossy_update(&self, _from: &FieldKind, _to: &FieldKind) -> bool {
        false
    }
}

/// Look up the implementation for a field kind.
pub fn field_type(kind: &FieldKind) -> &'static dyn FieldType {
    match kind {
        FieldKind::Text { .. } => &TextFieldType,
        FieldKind::Number { .. } => &NumberFieldType,
        FieldKind::Rating { .. } => &RatingFieldType,
        FieldKind::Boolean => &BooleanFieldType,
        FieldKind::SingleSelect => &SingleSelectFieldType,
        FieldKind::MultipleSelect => &MultipleSelectFieldType,
        FieldKind::LinkRow { .. } => &LinkRowFieldType,
        FieldKind::File => &FileFieldType,
    }
}

/// Storage shape of a field.
pub fn storage_of(field: &Field) -> StorageShape {
    field_type(&field.kind).storage(field)
}

/// Lenient decimal parsing shared by the numeric types.
pub(crate) fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim()),
        _ => None,
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    if s.is_empty() {
        return None;
    }
    s.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

/// Id given either as a number, a numeric string or an object with an `id`.
pub(crate) fn id_from_json(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("id").and_then(id_from_json),
        _ => None,
    }
}
