//! Value preparation pipeline.
//!
//! Raw row input is a JSON object keyed by field id, either as `"<id>"` or
//! `"field_<id>"`. Only keys naming a field of the model are consumed; others
//! are ignored. Values are coerced by their field type and split into scalar
//! cells, assigned directly to columns, and relation values, which are set on
//! link tables once the row has an id.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::catalog::{FieldId, TableModel};
use crate::fields::error::FieldResult;
use crate::fields::registry::{field_type, storage_of, LinkTargets, StorageShape, StoredValue};
use crate::storage::{CellValue, ColumnName, LinkSide, RelationName, RowId, StoredRow};

/// Raw row input.
pub type RawValues = Map<String, Value>;

/// Links of one row through one field.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationValue {
    pub field_id: FieldId,
    pub table: RelationName,
    pub side: LinkSide,
    pub targets: LinkTargets,
    pub ids: Vec<RowId>,
}

/// Output of [`prepare_values`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedValues {
    pub cells: BTreeMap<ColumnName, CellValue>,
    pub relations: Vec<RelationValue>,
}

fn parse_field_key(key: &str) -> Option<FieldId> {
    key.strip_prefix("field_").unwrap_or(key).parse().ok()
}

/// Field ids referenced by the keys of `values`, ascending and unique.
pub fn extract_field_ids(values: &RawValues) -> Vec<FieldId> {
    let mut ids: Vec<FieldId> = values.keys().filter_map(|k| parse_field_key(k)).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// The raw value given for `field_id`; the plain numeric key wins over
/// `field_<id>` when both are present.
fn raw_value(values: &RawValues, field_id: FieldId) -> Option<&Value> {
    values
        .get(&field_id.to_string())
        .or_else(|| values.get(&format!("field_{field_id}")))
}

/// Place a stored value of a field into `prepared`.
pub(crate) fn push_value(
    prepared: &mut PreparedValues,
    field_id: FieldId,
    shape: StorageShape,
    value: StoredValue,
) {
    match (shape, value) {
        (StorageShape::Column(column), StoredValue::Cell(cell)) => {
            prepared.cells.insert(column, cell);
        }
        (
            StorageShape::Links {
                table,
                side,
                targets,
            },
            StoredValue::Links(ids),
        ) => prepared.relations.push(RelationValue {
            field_id,
            table,
            side,
            targets,
            ids,
        }),
        (shape, value) => {
            tracing::warn!(field_id, ?shape, ?value, "stored value does not fit storage shape");
        }
    }
}

/// Validate and coerce `values` against `model`.
pub fn prepare_values(model: &TableModel, values: &RawValues) -> FieldResult<PreparedValues> {
    let mut prepared = PreparedValues::default();
    for field in &model.fields {
        let Some(raw) = raw_value(values, field.id()) else {
            continue;
        };
        let ty = field_type(&field.field.kind);
        let value = ty.prepare_value_for_db(field, raw)?;
        push_value(&mut prepared, field.id(), ty.storage(&field.field), value);
    }
    Ok(prepared)
}

/// Values for a new row: the prepared input plus defaults for every field
/// that was not given.
pub fn prepare_new_row(model: &TableModel, values: &RawValues) -> FieldResult<PreparedValues> {
    let mut prepared = prepare_values(model, values)?;
    for field in &model.fields {
        if raw_value(values, field.id()).is_some() {
            continue;
        }
        let ty = field_type(&field.field.kind);
        let default = ty.default_value(&field.field);
        let is_empty_links = matches!(&default, StoredValue::Links(ids) if ids.is_empty());
        if !is_empty_links {
            push_value(&mut prepared, field.id(), ty.storage(&field.field), default);
        }
    }
    Ok(prepared)
}

/// Read the stored values of `row` for every field of `model`.
///
/// `links` resolves the targets of a row in a link table; it is the only
/// storage access needed besides the row itself.
pub fn load_values<E>(
    model: &TableModel,
    row: &StoredRow,
    mut links: impl FnMut(&RelationName, LinkSide, RowId) -> Result<Vec<RowId>, E>,
) -> Result<BTreeMap<FieldId, StoredValue>, E> {
    let mut values = BTreeMap::new();
    for field in &model.fields {
        let value = match storage_of(&field.field) {
            StorageShape::Column(column) => {
                StoredValue::Cell(row.get(column.as_str()).cloned().unwrap_or_default())
            }
            StorageShape::Links { table, side, .. } => StoredValue::Links(links(&table, side, row.id)?),
        };
        values.insert(field.id(), value);
    }
    Ok(values)
}
