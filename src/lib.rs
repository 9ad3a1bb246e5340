//! gridstore - row mutation engine for a multi-tenant tabular store
//!
//! Tenant tables live in an in-memory physical store; their schema (groups,
//! tables, fields, select options) lives in a separate catalog. On top of
//! that this crate provides row creation, update and deletion with
//! fractional ordering, field type conversions that keep the replaced
//! storage as a backup, and an undo/redo log of actions.
//!
//! # Example
//!
//! ```
//! use gridstore::actions::{ActionScope, UpdateFieldActionType};
//! use gridstore::catalog::FieldKind;
//! use gridstore::db::Database;
//! use gridstore::fields::FieldUpdate;
//!
//! let db = Database::new();
//! let alice = db.create_user("alice").with_session("tab-1");
//! let group = db.create_group("Acme", &[&alice]);
//! let table = db.create_table(&alice, group.id, "Orders").unwrap();
//! let amount = db
//!     .fields()
//!     .create_field(&alice, table.id, "Amount", FieldKind::text(), vec![])
//!     .unwrap();
//!
//! let number = FieldKind::Number { number_decimal_places: 2, number_negative: false };
//! UpdateFieldActionType::execute(&db, &alice, amount.id, FieldUpdate::new().kind(number)).unwrap();
//! db.actions().undo(&alice, &[ActionScope::Table(table.id)]).unwrap();
//! assert_eq!(db.catalog().field(amount.id).unwrap().kind, FieldKind::text());
//! ```

pub mod actions;
pub mod catalog;
pub mod db;
pub mod fields;
pub mod rows;
pub mod storage;
pub mod transaction;
pub mod trash;
