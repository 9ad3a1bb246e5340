//! High-level Database API.
//!
//! [`Database`] wires the catalog, the tenant table store and the action log
//! together and hands out the row, field, action and trash handlers.

mod api;
mod error;
#[cfg(test)]
pub(crate) mod fixtures;

pub use api::{Database, DatabaseConfig};
pub use error::{DatabaseError, DatabaseResult, ErrorKind};
