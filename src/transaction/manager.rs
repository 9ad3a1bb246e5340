//! Transaction manager - coordinates all transaction operations.
//!
//! The TransactionManager is the main entry point for transactions.
//! It handles:
//! - Transaction creation and lifecycle
//! - Tracking active transactions
//! - The lock table shared by all transactions on its store

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use ulid::Ulid;

use crate::storage::TableStore;
use crate::transaction::context::{Transaction, TransactionMetadata, TxActive};
use crate::transaction::error::TransactionError;
use crate::transaction::locks::LockManager;

/// Transaction manager scoped to one physical store.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<TransactionManagerInner>,
}

struct TransactionManagerInner {
    store: TableStore,
    locks: LockManager,
    lock_timeout: Duration,
    /// Active transactions tracked by ID.
    active: RwLock<HashMap<String, TransactionMetadata>>,
}

impl TransactionManager {
    /// Create a new transaction manager for the given store.
    pub fn new(store: TableStore, lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(TransactionManagerInner {
                store,
                locks: LockManager::new(),
                lock_timeout,
                active: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &TableStore {
        &self.inner.store
    }

    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    /// Begin a new transaction.
    pub fn begin(&self) -> Transaction<TxActive> {
        let tx_id = Ulid::new().to_string().to_lowercase();

        let tx = Transaction::new(
            self.inner.store.clone(),
            self.inner.locks.clone(),
            tx_id.clone(),
            self.inner.lock_timeout,
        );

        self.inner.active.write().insert(tx_id, tx.metadata.clone());
        tx
    }

    /// Get the number of active transactions.
    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// Check if a transaction is active.
    pub fn is_active(&self, tx_id: &str) -> bool {
        self.inner.active.read().contains_key(tx_id)
    }

    /// Get metadata for an active transaction.
    pub fn get_transaction_info(&self, tx_id: &str) -> Option<TransactionMetadata> {
        self.inner.active.read().get(tx_id).cloned()
    }

    fn mark_completed(&self, tx_id: &str) {
        self.inner.active.write().remove(tx_id);
    }

    /// Commit a transaction.
    pub fn commit_transaction(&self, tx: Transaction<TxActive>) -> usize {
        let tx_id = tx.id().to_string();
        let committed = tx.commit();
        self.mark_completed(&tx_id);
        committed.write_count()
    }

    /// Rollback a transaction.
    pub fn rollback_transaction(&self, tx: Transaction<TxActive>) {
        let tx_id = tx.id().to_string();
        tx.rollback();
        self.mark_completed(&tx_id);
    }

    /// Execute a function within a transaction, automatically committing or rolling back.
    ///
    /// If the function returns Ok, the transaction is committed.
    /// If the function returns Err or panics, the transaction is rolled back.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction<TxActive>) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let mut tx = self.begin();
        let tx_id = tx.id().to_string();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&mut tx)));
        match result {
            Ok(Ok(value)) => {
                self.commit_transaction(tx);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.rollback_transaction(tx);
                Err(e)
            }
            Err(panic) => {
                self.rollback_transaction(tx);
                tracing::warn!(%tx_id, "transaction body panicked, rolled back");
                std::panic::resume_unwind(panic)
            }
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("store", &self.inner.store.label())
            .field("active_count", &self.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use crate::storage::{CellValue, ColumnName, RelationName};
    use crate::transaction::TransactionResult;

    fn setup() -> TransactionManager {
        TransactionManager::new(TableStore::new("user_tables"), Duration::from_millis(50))
    }

    fn users() -> RelationName {
        RelationName::new("database_table_1").unwrap()
    }

    #[test]
    fn test_begin_and_commit() {
        let manager = setup();

        let mut tx = manager.begin();
        assert!(manager.is_active(tx.id()));
        tx.create_relation(&users()).unwrap();

        assert_eq!(manager.commit_transaction(tx), 1);
        assert_eq!(manager.active_count(), 0);
        assert!(manager.store().relation_exists(&users()));
    }

    #[test]
    fn test_begin_and_rollback() {
        let manager = setup();

        let mut tx = manager.begin();
        tx.create_relation(&users()).unwrap();
        manager.rollback_transaction(tx);

        assert_eq!(manager.active_count(), 0);
        assert!(!manager.store().relation_exists(&users()));
    }

    #[test]
    fn test_with_transaction() {
        let manager = setup();
        let name = ColumnName::new("field_1").unwrap();

        let id = manager
            .with_transaction(|tx| -> TransactionResult<_> {
                tx.create_relation(&users())?;
                tx.add_column(&users(), &name, CellValue::Null)?;
                let mut cells = BTreeMap::new();
                cells.insert(name.clone(), CellValue::from("Alice"));
                tx.insert_row(&users(), None, Decimal::ONE, cells)
            })
            .unwrap();

        let row = manager.store().read_row(&users(), id).unwrap().unwrap();
        assert_eq!(row.get("field_1"), Some(&CellValue::from("Alice")));
    }

    #[test]
    fn test_with_transaction_rollback_on_error() {
        let manager = setup();

        let result: TransactionResult<()> = manager.with_transaction(|tx| {
            tx.create_relation(&users())?;
            Err(TransactionError::Internal("test error".to_string()))
        });

        assert!(result.is_err());
        assert!(!manager.store().relation_exists(&users()));
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_with_transaction_rollback_on_panic() {
        let manager = setup();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: TransactionResult<()> = manager.with_transaction(|tx| {
                tx.create_relation(&users())?;
                panic!("boom");
            });
        }));

        assert!(outcome.is_err());
        assert!(!manager.store().relation_exists(&users()));
        assert_eq!(manager.locks().held_count(), 0);
    }

    #[test]
    fn test_active_transactions() {
        let manager = setup();
        assert_eq!(manager.active_count(), 0);

        let tx1 = manager.begin();
        let tx2 = manager.begin();
        assert_eq!(manager.active_count(), 2);
        assert!(manager.get_transaction_info(tx1.id()).is_some());

        manager.rollback_transaction(tx1);
        assert_eq!(manager.active_count(), 1);
        manager.rollback_transaction(tx2);
        assert_eq!(manager.active_count(), 0);
    }
}
