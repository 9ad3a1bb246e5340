//! storage layer for gridstore
//!
//! this module provides the physical table store holding tenant tables. The
//! upper layers (transactions, row engine, field conversions) use this API and
//! never touch relations directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TableStore                            │
//! │   (shared handle: reads, journaled writes, compensations)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               │                             │
//!               ▼                             ▼
//!        ┌─────────────┐               ┌─────────────┐
//!        │  Relation   │               │  LinkTable  │
//!        │ (rows with  │               │ (row id     │
//!        │  an order)  │               │  pairs)     │
//!        └─────────────┘               └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use gridstore::storage::{TableStore, RelationName};
//!
//! let store = TableStore::new("user_tables");
//! let relation = RelationName::new("database_table_1")?;
//!
//! // writes go through a transaction, which journals the compensations
//! let rows = store.scan(&relation)?;
//! ```

mod error;
mod relation;
mod store;
mod types;

pub use error::{StorageError, StorageResult};
pub use relation::{LinkTable, Relation, StoredRow};
pub use store::{Compensation, StoreState, TableStore};
pub use types::{CellValue, ColumnName, InvalidNameError, LinkSide, RelationName, RowId};
