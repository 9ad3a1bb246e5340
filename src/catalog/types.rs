//! Metadata records: users, groups, tables, fields and select options.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::RelationName;

pub type UserId = u64;
pub type GroupId = u64;
pub type TableId = u64;
pub type FieldId = u64;
pub type OptionId = u64;

/// A user acting on the store.
///
/// `session` identifies the client session the request came from; undo and
/// redo only consider actions recorded under the same session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl User {
    /// The same user acting from another client session.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

/// Tenancy and permission boundary owning tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub members: BTreeSet<UserId>,
}

impl Group {
    pub fn has_user(&self, user: &User) -> bool {
        self.members.contains(&user.id)
    }
}

/// A user-defined table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub id: TableId,
    pub name: String,
    pub group_id: GroupId,
    /// Physical relation holding the rows.
    pub relation: RelationName,
}

/// Type tag and type specific configuration of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text {
        #[serde(default)]
        text_default: String,
    },
    Number {
        #[serde(default)]
        number_decimal_places: u32,
        #[serde(default)]
        number_negative: bool,
    },
    Rating {
        max_value: u32,
    },
    Boolean,
    SingleSelect,
    MultipleSelect,
    LinkRow {
        link_row_table_id: TableId,
        /// The mirroring field in the linked table; absent for a table linking
        /// to itself.
        #[serde(default)]
        link_row_related_field_id: Option<FieldId>,
    },
    File,
}

impl FieldKind {
    /// Type tag as used in serialized payloads.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text { .. } => "text",
            FieldKind::Number { .. } => "number",
            FieldKind::Rating { .. } => "rating",
            FieldKind::Boolean => "boolean",
            FieldKind::SingleSelect => "single_select",
            FieldKind::MultipleSelect => "multiple_select",
            FieldKind::LinkRow { .. } => "link_row",
            FieldKind::File => "file",
        }
    }

    pub fn same_type(&self, other: &FieldKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn text() -> Self {
        FieldKind::Text {
            text_default: String::new(),
        }
    }

    pub fn has_select_options(&self) -> bool {
        matches!(self, FieldKind::SingleSelect | FieldKind::MultipleSelect)
    }

    pub fn link_row_table_id(&self) -> Option<TableId> {
        match self {
            FieldKind::LinkRow {
                link_row_table_id, ..
            } => Some(*link_row_table_id),
            _ => None,
        }
    }

    pub fn link_row_related_field_id(&self) -> Option<FieldId> {
        match self {
            FieldKind::LinkRow {
                link_row_related_field_id,
                ..
            } => *link_row_related_field_id,
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// A named, typed column descriptor of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub table_id: TableId,
    pub name: String,
    pub order: u32,
    #[serde(default)]
    pub primary: bool,
    #[serde(flatten)]
    pub kind: FieldKind,
}

/// A selectable value of a single or multiple select field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: OptionId,
    pub field_id: FieldId,
    pub value: String,
    pub color: String,
    pub order: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_serialization() {
        let field = Field {
            id: 4,
            table_id: 1,
            name: "Amount".to_string(),
            order: 2,
            primary: false,
            kind: FieldKind::Number {
                number_decimal_places: 2,
                number_negative: false,
            },
        };

        let value = serde_json::to_value(&field).unwrap();
        assert_eq!(value["type"], json!("number"));
        assert_eq!(value["number_decimal_places"], json!(2));

        let back: Field = serde_json::from_value(value).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn test_kind_helpers() {
        let link = FieldKind::LinkRow {
            link_row_table_id: 2,
            link_row_related_field_id: Some(9),
        };
        assert_eq!(link.type_name(), "link_row");
        assert_eq!(link.link_row_table_id(), Some(2));
        assert_eq!(link.link_row_related_field_id(), Some(9));
        assert!(FieldKind::text().same_type(&FieldKind::Text {
            text_default: "x".to_string()
        }));
        assert!(!FieldKind::SingleSelect.same_type(&FieldKind::MultipleSelect));
        assert!(FieldKind::MultipleSelect.has_select_options());
    }

    #[test]
    fn test_group_membership() {
        let user = User {
            id: 1,
            username: "alice".to_string(),
            session: None,
        };
        let mut group = Group {
            id: 1,
            name: "Acme".to_string(),
            members: BTreeSet::new(),
        };
        assert!(!group.has_user(&user));
        group.members.insert(1);
        assert!(group.has_user(&user.with_session("s1")));
    }
}
