//! Field type implementations.

use std::collections::BTreeSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{json, Value};

use crate::catalog::{Field, FieldKind, FieldObject, OptionId, SelectOption};
use crate::fields::error::{FieldError, FieldResult};
use crate::fields::registry::{
    decimal_from_json, id_from_json, FieldType, LinkTargets, StorageShape, StoredValue,
};
use crate::storage::{CellValue, LinkSide, RelationName, RowId};

/// Text rendering used when converting into a text field.
fn text_from_json(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(text_from_json).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::Object(map) => ["value", "visible_name", "name"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
    }
}

fn option_json(option: &SelectOption) -> Value {
    json!({
        "id": option.id,
        "value": option.value,
        "color": option.color,
    })
}

fn option_by_value<'a>(target: &'a FieldObject, value: &str) -> Option<&'a SelectOption> {
    let value = value.trim();
    target
        .options
        .iter()
        .find(|o| o.value.eq_ignore_ascii_case(value))
}

/// Find the option of `target` a converted value refers to: the same option
/// id when the target still has it, otherwise an option with the same value.
fn match_option(target: &FieldObject, value: &Value) -> Option<OptionId> {
    match value {
        Value::Array(items) => items.iter().find_map(|item| match_option(target, item)),
        Value::Object(map) => {
            let by_id = map
                .get("id")
                .and_then(Value::as_u64)
                .filter(|id| target.options.iter().any(|o| o.id == *id));
            by_id.or_else(|| {
                map.get("value")
                    .and_then(Value::as_str)
                    .and_then(|v| option_by_value(target, v))
                    .map(|o| o.id)
            })
        }
        Value::String(s) => option_by_value(target, s).map(|o| o.id),
        Value::Number(n) => option_by_value(target, &n.to_string()).map(|o| o.id),
        _ => None,
    }
}

fn has_option(field: &FieldObject, id: OptionId) -> bool {
    field.options.iter().any(|o| o.id == id)
}

fn sorted_unique(ids: impl IntoIterator<Item = u64>) -> Vec<u64> {
    ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

// ==================== Text ====================

#[derive(Debug)]
pub struct TextFieldType;

impl FieldType for TextFieldType {
    fn type_name(&self) -> &'static str {
        "text"
    }

    fn default_value(&self, field: &Field) -> StoredValue {
        match &field.kind {
            FieldKind::Text { text_default } if !text_default.is_empty() => {
                StoredValue::Cell(CellValue::Text(text_default.clone()))
            }
            _ => StoredValue::Cell(CellValue::Null),
        }
    }

    fn prepare_value_for_db(&self, field: &FieldObject, value: &Value) -> FieldResult<StoredValue> {
        let cell = match value {
            Value::Null => CellValue::Null,
            Value::String(s) => CellValue::Text(s.clone()),
            Value::Number(n) => CellValue::Text(n.to_string()),
            Value::Bool(b) => CellValue::Text(b.to_string()),
            _ => return Err(FieldError::validation(field.id(), "expected a text value")),
        };
        Ok(StoredValue::Cell(cell))
    }

    fn export_value(&self, _field: &FieldObject, value: &StoredValue) -> Value {
        value.as_cell().map(CellValue::to_json).unwrap_or(Value::Null)
    }

    fn convert_value(&self, _target: &FieldObject, value: &Value) -> StoredValue {
        StoredValue::Cell(
            text_from_json(value)
                .map(CellValue::Text)
                .unwrap_or(CellValue::Null),
        )
    }
}

// ==================== Number ====================

#[derive(Debug)]
pub struct NumberFieldType;

fn number_config(kind: &FieldKind) -> (u32, bool) {
    match kind {
        FieldKind::Number {
            number_decimal_places,
            number_negative,
        } => (*number_decimal_places, *number_negative),
        _ => (0, false),
    }
}

impl FieldType for NumberFieldType {
    fn type_name(&self) -> &'static str {
        "number"
    }

    fn prepare_value_for_db(&self, field: &FieldObject, value: &Value) -> FieldResult<StoredValue> {
        if value.is_null() {
            return Ok(StoredValue::Cell(CellValue::Null));
        }
        let (places, negative) = number_config(&field.field.kind);
        let mut number = decimal_from_json(value)
            .ok_or_else(|| FieldError::validation(field.id(), "expected a number"))?;

        if !negative && number.is_sign_negative() && !number.is_zero() {
            return Err(FieldError::validation(field.id(), "negative numbers are not allowed"));
        }
        if number.normalize().scale() > places {
            return Err(FieldError::validation(
                field.id(),
                format!("ensure that there are no more than {places} decimal places"),
            ));
        }
        number.rescale(places);
        Ok(StoredValue::Cell(CellValue::Number(number)))
    }

    fn export_value(&self, field: &FieldObject, value: &StoredValue) -> Value {
        let (places, _) = number_config(&field.field.kind);
        match value.as_cell().and_then(CellValue::as_decimal) {
            Some(mut number) => {
                number.rescale(places);
                Value::String(number.to_string())
            }
            None => Value::Null,
        }
    }

    fn convert_value(&self, target: &FieldObject, value: &Value) -> StoredValue {
        let (places, negative) = number_config(&target.field.kind);
        let converted = decimal_from_json(value)
            .map(|n| {
                let mut n = n.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
                n.rescale(places);
                n
            })
            .filter(|n| negative || !n.is_sign_negative() || n.is_zero());
        StoredValue::Cell(converted.map(CellValue::Number).unwrap_or(CellValue::Null))
    }

    fn is_lossy_update(&self, from: &FieldKind, to: &FieldKind) -> bool {
        let (from_places, from_negative) = number_config(from);
        let (to_places, to_negative) = number_config(to);
        to_places < from_places || (from_negative && !to_negative)
    }
}

// ==================== Rating ====================

#[derive(Debug)]
pub struct RatingFieldType;

fn max_rating(kind: &FieldKind) -> u32 {
    match kind {
        FieldKind::Rating { max_value } => *max_value,
        _ => 0,
    }
}

impl FieldType for RatingFieldType {
    fn type_name(&self) -> &'static str {
        "rating"
    }

    fn default_value(&self, _field: &Field) -> StoredValue {
        StoredValue::Cell(CellValue::Number(Decimal::ZERO))
    }

    fn prepare_value_for_db(&self, field: &FieldObject, value: &Value) -> FieldResult<StoredValue> {
        if value.is_null() {
            return Ok(self.default_value(&field.field));
        }
        let max = max_rating(&field.field.kind);
        let rating = decimal_from_json(value)
            .filter(|n| n.fract().is_zero())
            .and_then(|n| n.to_u32())
            .filter(|n| *n <= max)
            .ok_or_else(|| {
                FieldError::validation(field.id(), format!("rating must be between 0 and {max}"))
            })?;
        Ok(StoredValue::Cell(CellValue::Number(Decimal::from(rating))))
    }

    fn export_value(&self, _field: &FieldObject, value: &StoredValue) -> Value {
        let rating = value
            .as_cell()
            .and_then(CellValue::as_decimal)
            .and_then(|n| n.to_u64())
            .unwrap_or(0);
        Value::from(rating)
    }

    fn convert_value(&self, target: &FieldObject, value: &Value) -> StoredValue {
        let max = Decimal::from(max_rating(&target.field.kind));
        let rating = decimal_from_json(value)
            .map(|n| n.round().clamp(Decimal::ZERO, max))
            .unwrap_or(Decimal::ZERO);
        StoredValue::Cell(CellValue::Number(rating))
    }

    fn is_lossy_update(&self, from: &FieldKind, to: &FieldKind) -> bool {
        max_rating(to) < max_rating(from)
    }
}

// ==================== Boolean ====================

#[derive(Debug)]
pub struct BooleanFieldType;

const TRUE_VALUES: [&str; 7] = ["t", "y", "yes", "true", "on", "1", "checked"];
const FALSE_VALUES: [&str; 6] = ["f", "n", "no", "false", "off", "0"];

fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Null => Some(false),
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            if TRUE_VALUES.contains(&s.as_str()) {
                Some(true)
            } else if s.is_empty() || FALSE_VALUES.contains(&s.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

impl FieldType for BooleanFieldType {
    fn type_name(&self) -> &'static str {
        "boolean"
    }

    fn default_value(&self, _field: &Field) -> StoredValue {
        StoredValue::Cell(CellValue::Bool(false))
    }

    fn prepare_value_for_db(&self, field: &FieldObject, value: &Value) -> FieldResult<StoredValue> {
        let b = truthy(value)
            .ok_or_else(|| FieldError::validation(field.id(), "expected a boolean value"))?;
        Ok(StoredValue::Cell(CellValue::Bool(b)))
    }

    fn export_value(&self, _field: &FieldObject, value: &StoredValue) -> Value {
        Value::Bool(matches!(value, StoredValue::Cell(CellValue::Bool(true))))
    }

    fn convert_value(&self, _target: &FieldObject, value: &Value) -> StoredValue {
        StoredValue::Cell(CellValue::Bool(truthy(value).unwrap_or(false)))
    }
}

// ==================== Single select ====================

#[derive(Debug)]
pub struct SingleSelectFieldType;

impl FieldType for SingleSelectFieldType {
    fn type_name(&self) -> &'static str {
        "single_select"
    }

    fn prepare_value_for_db(&self, field: &FieldObject, value: &Value) -> FieldResult<StoredValue> {
        if value.is_null() {
            return Ok(StoredValue::Cell(CellValue::Null));
        }
        let id = id_from_json(value)
            .ok_or_else(|| FieldError::validation(field.id(), "expected a select option id"))?;
        if !has_option(field, id) {
            return Err(FieldError::validation(
                field.id(),
                format!("select option {id} does not belong to the field"),
            ));
        }
        Ok(StoredValue::Cell(CellValue::Ref(id)))
    }

    fn export_value(&self, field: &FieldObject, value: &StoredValue) -> Value {
        value
            .as_cell()
            .and_then(CellValue::as_ref_id)
            .and_then(|id| field.options.iter().find(|o| o.id == id))
            .map(option_json)
            .unwrap_or(Value::Null)
    }

    fn convert_value(&self, target: &FieldObject, value: &Value) -> StoredValue {
        StoredValue::Cell(
            match_option(target, value)
                .map(CellValue::Ref)
                .unwrap_or(CellValue::Null),
        )
    }
}

// ==================== Multiple select ====================

#[derive(Debug)]
pub struct MultipleSelectFieldType;

impl FieldType for MultipleSelectFieldType {
    fn type_name(&self) -> &'static str {
        "multiple_select"
    }

    fn storage(&self, field: &Field) -> StorageShape {
        StorageShape::Links {
            table: RelationName::multiple_select(field.id),
            side: LinkSide::Left,
            targets: LinkTargets::Options,
        }
    }

    fn default_value(&self, _field: &Field) -> StoredValue {
        StoredValue::Links(Vec::new())
    }

    fn prepare_value_for_db(&self, field: &FieldObject, value: &Value) -> FieldResult<StoredValue> {
        let items = match value {
            Value::Null => return Ok(StoredValue::Links(Vec::new())),
            Value::Array(items) => items,
            _ => {
                return Err(FieldError::validation(
                    field.id(),
                    "expected a list of select option ids",
                ))
            }
        };

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = id_from_json(item)
                .ok_or_else(|| FieldError::validation(field.id(), "expected a select option id"))?;
            if !has_option(field, id) {
                return Err(FieldError::validation(
                    field.id(),
                    format!("select option {id} does not belong to the field"),
                ));
            }
            ids.push(id);
        }
        Ok(StoredValue::Links(sorted_unique(ids)))
    }

    fn export_value(&self, field: &FieldObject, value: &StoredValue) -> Value {
        let ids = value.as_links().unwrap_or(&[]);
        Value::Array(
            field
                .options
                .iter()
                .filter(|o| ids.contains(&o.id))
                .map(option_json)
                .collect(),
        )
    }

    fn convert_value(&self, target: &FieldObject, value: &Value) -> StoredValue {
        let ids: Vec<OptionId> = match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match_option(target, item))
                .collect(),
            Value::String(s) => s
                .split(',')
                .filter_map(|part| option_by_value(target, part).map(|o| o.id))
                .collect(),
            other => match_option(target, other).into_iter().collect(),
        };
        StoredValue::Links(sorted_unique(ids))
    }
}

// ==================== Link row ====================

#[derive(Debug)]
pub struct LinkRowFieldType;

impl FieldType for LinkRowFieldType {
    fn type_name(&self) -> &'static str {
        "link_row"
    }

    /// Both fields of a pair share the link table named after the lower field
    /// id; that field's rows sit on the left.
    fn storage(&self, field: &Field) -> StorageShape {
        let related = field.kind.link_row_related_field_id();
        let owner = related.map(|r| r.min(field.id)).unwrap_or(field.id);
        let side = if related.map(|r| r < field.id).unwrap_or(false) {
            LinkSide::Right
        } else {
            LinkSide::Left
        };
        StorageShape::Links {
            table: RelationName::link_relation(owner),
            side,
            targets: LinkTargets::Rows(field.kind.link_row_table_id().unwrap_or(field.table_id)),
        }
    }

    fn default_value(&self, _field: &Field) -> StoredValue {
        StoredValue::Links(Vec::new())
    }

    fn prepare_value_for_db(&self, field: &FieldObject, value: &Value) -> FieldResult<StoredValue> {
        let items = match value {
            Value::Null => return Ok(StoredValue::Links(Vec::new())),
            Value::Array(items) => items,
            _ => return Err(FieldError::validation(field.id(), "expected a list of row ids")),
        };
        let ids = items
            .iter()
            .map(|item| {
                id_from_json(item)
                    .ok_or_else(|| FieldError::validation(field.id(), "expected a row id"))
            })
            .collect::<FieldResult<Vec<RowId>>>()?;
        Ok(StoredValue::Links(sorted_unique(ids)))
    }

    fn export_value(&self, _field: &FieldObject, value: &StoredValue) -> Value {
        let ids = value.as_links().unwrap_or(&[]);
        Value::Array(ids.iter().map(|id| json!({ "id": id })).collect())
    }

    /// Linked rows have no meaning for another field type.
    fn export_for_conversion(&self, _field: &FieldObject, _value: &StoredValue) -> Value {
        Value::Null
    }

    fn convert_value(&self, _target: &FieldObject, _value: &Value) -> StoredValue {
        StoredValue::Links(Vec::new())
    }

    fn is_lossy_update(&self, from: &FieldKind, to: &FieldKind) -> bool {
        from.link_row_table_id() != to.link_row_table_id()
    }
}

// ==================== File ====================

#[derive(Debug)]
pub struct FileFieldType;

impl FieldType for FileFieldType {
    fn type_name(&self) -> &'static str {
        "file"
    }

    fn default_value(&self, _field: &Field) -> StoredValue {
        StoredValue::Cell(CellValue::Json(Value::Array(Vec::new())))
    }

    fn prepare_value_for_db(&self, field: &FieldObject, value: &Value) -> FieldResult<StoredValue> {
        let items = match value {
            Value::Null => return Ok(self.default_value(&field.field)),
            Value::Array(items) => items,
            _ => return Err(FieldError::validation(field.id(), "expected a list of files")),
        };
        for item in items {
            let named = item
                .get("name")
                .and_then(Value::as_str)
                .map(|name| !name.is_empty())
                .unwrap_or(false);
            if !named {
                return Err(FieldError::validation(field.id(), "each file needs a name"));
            }
        }
        Ok(StoredValue::Cell(CellValue::Json(value.clone())))
    }

    fn export_value(&self, _field: &FieldObject, value: &StoredValue) -> Value {
        match value.as_cell() {
            Some(CellValue::Json(files)) => files.clone(),
            _ => Value::Array(Vec::new()),
        }
    }

    fn convert_value(&self, target: &FieldObject, _value: &Value) -> StoredValue {
        self.default_value(&target.field)
    }
}
