//! Database API - high-level interface for gridstore.

use std::time::Duration;

use crate::actions::{ActionHandler, ActionLog};
use crate::catalog::{Catalog, CatalogState, Group, GroupId, TableMeta, User};
use crate::db::error::DatabaseResult;
use crate::fields::FieldHandler;
use crate::rows::RowHandler;
use crate::storage::TableStore;
use crate::transaction::{Transaction, TransactionError, TransactionManager, TxActive};
use crate::trash::TrashHandler;

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Longest wait for a row or ordering lock.
    pub lock_timeout: Duration,
    /// Age after which action entries are discarded.
    pub undo_retention: Duration,
    /// Label of the physical store holding tenant tables.
    pub user_table_store: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            undo_retention: Duration::from_secs(7 * 24 * 60 * 60),
            user_table_store: "user_tables".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Set the lock wait timeout.
    pub fn lock_timeout(mut self, value: Duration) -> Self {
        self.lock_timeout = value;
        self
    }

    /// Set how long action entries are kept.
    pub fn undo_retention(mut self, value: Duration) -> Self {
        self.undo_retention = value;
        self
    }

    /// Set the label of the tenant table store.
    pub fn user_table_store(mut self, value: impl Into<String>) -> Self {
        self.user_table_store = value.into();
        self
    }
}

/// The main database handle.
///
/// Metadata lives in the [`Catalog`], tenant tables in the store behind the
/// [`TransactionManager`]. Operations are reached through the handlers
/// returned by [`rows`](Self::rows), [`fields`](Self::fields),
/// [`actions`](Self::actions) and [`trash`](Self::trash).
pub struct Database {
    config: DatabaseConfig,
    catalog: Catalog,
    tx_manager: TransactionManager,
    action_log: ActionLog,
}

impl Database {
    /// Create an empty database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    /// Create an empty database with custom configuration.
    pub fn with_config(config: DatabaseConfig) -> Self {
        let store = TableStore::new(config.user_table_store.clone());
        let tx_manager = TransactionManager::new(store, config.lock_timeout);
        tracing::debug!(store = %config.user_table_store, lock_timeout = ?config.lock_timeout, "opened database");
        Self {
            config,
            catalog: Catalog::new(),
            tx_manager,
            action_log: ActionLog::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The transaction manager of the tenant table store.
    pub fn tables(&self) -> &TransactionManager {
        &self.tx_manager
    }

    pub fn action_log(&self) -> &ActionLog {
        &self.action_log
    }

    pub fn rows(&self) -> RowHandler<'_> {
        RowHandler::new(self)
    }

    pub fn fields(&self) -> FieldHandler<'_> {
        FieldHandler::new(self)
    }

    pub fn actions(&self) -> ActionHandler<'_> {
        ActionHandler::new(self)
    }

    pub fn trash(&self) -> TrashHandler<'_> {
        TrashHandler::new(self)
    }

    pub fn create_user(&self, username: impl Into<String>) -> User {
        self.catalog.create_user(username)
    }

    pub fn create_group(&self, name: impl Into<String>, members: &[&User]) -> Group {
        self.catalog.create_group(name, members)
    }

    /// Create an empty table in `group_id`.
    pub fn create_table(&self, user: &User, group_id: GroupId, name: &str) -> DatabaseResult<TableMeta> {
        let table = self.atomic(|tx, meta| -> DatabaseResult<TableMeta> {
            meta.check_user_in_group(user, group_id)?;
            let table = meta.create_table(group_id, name)?;
            tx.create_relation(&table.relation)?;
            Ok(table)
        })?;
        tracing::debug!(table_id = table.id, group_id, "created table");
        Ok(table)
    }

    /// Run `f` with a storage transaction and a metadata draft.
    ///
    /// Both are committed when `f` returns `Ok` and both are discarded
    /// otherwise.
    pub(crate) fn atomic<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction<TxActive>, &mut CatalogState) -> Result<T, E>,
        E: From<TransactionError>,
    {
        self.tx_manager
            .with_transaction(|tx| self.catalog.atomic(|meta| f(tx, meta)))
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("catalog", &self.catalog)
            .field("tables", &self.tx_manager)
            .field("action_log", &self.action_log)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ErrorKind;

    #[test]
    fn test_config_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.undo_retention, Duration::from_secs(604_800));
        assert_eq!(config.user_table_store, "user_tables");

        let db = Database::with_config(config.user_table_store("tenants"));
        assert_eq!(db.tables().store().label(), "tenants");
    }

    #[test]
    fn test_create_table() {
        let db = Database::new();
        let alice = db.create_user("alice");
        let group = db.create_group("Acme", &[&alice]);

        let table = db.create_table(&alice, group.id, "Orders").unwrap();
        assert_eq!(db.catalog().table(table.id).unwrap(), table);
        assert!(db.tables().store().read(|s| s.relation_names()).contains(&table.relation));
    }

    #[test]
    fn test_create_table_requires_membership() {
        let db = Database::new();
        let alice = db.create_user("alice");
        let bob = db.create_user("bob");
        let group = db.create_group("Acme", &[&alice]);

        let err = db.create_table(&bob, group.id, "Orders").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(db.tables().store().read(|s| s.relation_names()).is_empty());
    }

    #[test]
    fn test_atomic_discards_metadata_on_storage_failure() {
        let db = Database::new();
        let alice = db.create_user("alice");
        let group = db.create_group("Acme", &[&alice]);
        let table = db.create_table(&alice, group.id, "Orders").unwrap();

        let result: DatabaseResult<()> = db.atomic(|tx, meta| {
            meta.create_table(group.id, "Customers")?;
            // the relation already exists
            tx.create_relation(&table.relation)?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(db.catalog().read(|s| s.tables_in(group.id).len()), 1);
    }
}
