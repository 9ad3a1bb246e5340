//! Core identifiers and cell values for the storage layer.

use std::borrow::Borrow;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identity of a row inside one relation.
pub type RowId = u64;

/// Longest identifier accepted for relations and columns.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Error returned when a relation or column name is not a valid identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidNameError {
    #[error("name cannot be empty")]
    Empty,

    #[error("name is too long ({0} characters, max 63)")]
    TooLong(usize),

    #[error("name must start with a letter or underscore, found '{0}'")]
    InvalidStart(char),

    #[error("invalid character '{char}' at position {position}")]
    InvalidCharacter { char: char, position: usize },
}

fn validate_identifier(name: &str) -> Result<(), InvalidNameError> {
    let first = name.chars().next().ok_or(InvalidNameError::Empty)?;

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(InvalidNameError::TooLong(name.len()));
    }

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(InvalidNameError::InvalidStart(first));
    }

    for (position, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(InvalidNameError::InvalidCharacter { char: c, position });
        }
    }

    Ok(())
}

/// A validated relation name.
///
/// Relations are the physical tables of the store: user tables
/// (`database_table_<id>`) and link tables (`database_relation_<id>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationName(String);

impl RelationName {
    /// Create a new RelationName, validating the input.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Relation backing the user table `table_id`.
    pub fn user_table(table_id: u64) -> Self {
        Self(format!("database_table_{table_id}"))
    }

    /// Link table shared by a link row field pair.
    pub fn link_relation(field_id: u64) -> Self {
        Self(format!("database_relation_{field_id}"))
    }

    /// Link table between rows and the options of a multiple select field.
    pub fn multiple_select(field_id: u64) -> Self {
        Self(format!("database_multipleselect_{field_id}"))
    }

    /// Name of a backup copy of this relation tagged with `tag`.
    pub fn backup(&self, tag: &str) -> Result<Self, InvalidNameError> {
        Self::new(format!("{}_backup_{tag}", self.0))
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RelationName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated column name inside a relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnName(String);

impl ColumnName {
    /// Create a new ColumnName, validating the input.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Column holding the values of field `field_id`.
    pub fn field(field_id: u64) -> Self {
        Self(format!("field_{field_id}"))
    }

    /// Name of a backup copy of this column tagged with `tag`.
    pub fn backup(&self, tag: &str) -> Result<Self, InvalidNameError> {
        Self::new(format!("{}_backup_{tag}", self.0))
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for ColumnName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Which element of a link table pair a row id occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSide {
    Left,
    Right,
}

impl LinkSide {
    pub fn opposite(self) -> Self {
        match self {
            LinkSide::Left => LinkSide::Right,
            LinkSide::Right => LinkSide::Left,
        }
    }
}

/// A single stored cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Text(String),
    Number(Decimal),
    /// Reference to another entity by identity (e.g. a select option).
    Ref(u64),
    Json(Value),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            CellValue::Number(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<u64> {
        match self {
            CellValue::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// JSON rendering of the cell. Decimals are rendered as strings so no
    /// precision is lost.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Number(d) => Value::String(d.normalize().to_string()),
            CellValue::Ref(id) => Value::from(*id),
            CellValue::Json(v) => v.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<Decimal> for CellValue {
    fn from(value: Decimal) -> Self {
        CellValue::Number(value)
    }
}
