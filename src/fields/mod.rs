//! Field types, the value preparation pipeline and field management.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FieldHandler                           │
//! │        (create / update / restore, backup decisions)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               │                             │
//!               ▼                             ▼
//!        ┌─────────────┐               ┌─────────────┐
//!        │  FieldType  │               │  Snapshot   │
//!        │  registry   │               │  / restore  │
//!        └─────────────┘               └─────────────┘
//! ```
//!
//! Each [`FieldType`] knows its storage shape and how to prepare, export and
//! convert values. The row engine uses the same registry through
//! [`prepare_values`] and [`load_values`].

pub(crate) mod conversion;
mod error;
mod handler;
mod registry;
mod types;
mod values;

pub use conversion::{BackupArtifact, BackupData, FieldSnapshot};
pub use error::{FieldError, FieldResult};
pub use handler::{FieldHandler, FieldUpdate, SelectOptionInput, UpdatedField};
pub(crate) use handler::lock_tables;
pub use registry::{field_type, storage_of, FieldType, LinkTargets, StorageShape, StoredValue};
pub use types::{
    BooleanFieldType, FileFieldType, LinkRowFieldType, MultipleSelectFieldType, NumberFieldType,
    RatingFieldType, SingleSelectFieldType, TextFieldType,
};
pub use values::{
    extract_field_ids, load_values, prepare_new_row, prepare_values, PreparedValues, RawValues,
    RelationValue,
};
