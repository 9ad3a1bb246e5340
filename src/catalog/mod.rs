//! Catalog module for metadata management.
//!
//! The catalog holds users, groups, tables, fields and select options. It is
//! the metadata store and is kept apart from the physical table store; the
//! row engine consumes it through `has_user` checks and [`TableModel`]s.

mod error;
mod manager;
mod model;
mod types;

pub use error::{CatalogError, CatalogResult};
pub use manager::{Catalog, CatalogState};
pub use model::{FieldObject, TableModel};
pub use types::{
    Field, FieldId, FieldKind, Group, GroupId, OptionId, SelectOption, TableId, TableMeta, User,
    UserId,
};
