//! Permanent deletion of tables and fields.
//!
//! Deleting a table also discards the action entries scoped to it, together
//! with the backups they hold. Deleting a field leaves its entries alone.

use thiserror::Error;

use crate::actions::{ActionError, ActionScope};
use crate::catalog::{CatalogError, FieldId, TableId, User};
use crate::db::{Database, ErrorKind};
use crate::fields::{lock_tables, storage_of, FieldError, StorageShape};
use crate::transaction::TransactionError;

#[derive(Debug, Error)]
pub enum TrashError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Action(#[from] ActionError),
}

impl TrashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrashError::Catalog(e) => e.kind(),
            TrashError::Transaction(_) => ErrorKind::Transactional,
            TrashError::Field(e) => e.kind(),
            TrashError::Action(e) => e.kind(),
        }
    }
}

/// Something that can be deleted for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashableEntity {
    Table(TableId),
    Field(FieldId),
}

pub struct TrashHandler<'a> {
    db: &'a Database,
}

impl<'a> TrashHandler<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn permanently_delete(&self, user: &User, entity: TrashableEntity) -> Result<(), TrashError> {
        match entity {
            TrashableEntity::Field(field_id) => Ok(self.db.fields().delete_field(user, field_id)?),
            TrashableEntity::Table(table_id) => self.delete_table(user, table_id),
        }
    }

    fn delete_table(&self, user: &User, table_id: TableId) -> Result<(), TrashError> {
        self.db.atomic(|tx, meta| -> Result<(), TrashError> {
            let table = meta.table(table_id)?.clone();
            meta.check_user_in_group(user, table.group_id)?;
            let fields: Vec<_> = meta.fields_of(table_id).into_iter().cloned().collect();
            lock_tables(tx, meta, &table, fields.iter().map(|f| &f.kind))?;

            for field in &fields {
                if let StorageShape::Links { table: links, .. } = storage_of(field) {
                    if tx.has_link_table(&links) {
                        tx.drop_link_table(&links)?;
                    }
                }
                // the mirroring field lives in the other table
                if let Some(related) = field.kind.link_row_related_field_id() {
                    if meta.field(related).is_ok_and(|r| r.table_id != table_id) {
                        meta.remove_field(related)?;
                    }
                }
            }
            if tx.has_relation(&table.relation) {
                tx.drop_relation(&table.relation)?;
            }
            meta.remove_table(table_id)?;
            Ok(())
        })?;

        let discarded = self.db.actions().discard_scope(ActionScope::Table(table_id));
        tracing::info!(table_id, discarded, "deleted table");
        Ok(())
    }
}
