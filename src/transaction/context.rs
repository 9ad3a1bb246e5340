//! Transaction context using typestate pattern.
//!
//! The typestate pattern ensures at compile time that transactions
//! are used correctly:
//! - Only active transactions can perform operations
//! - Committed/aborted transactions cannot be reused
//! - Locks are released and the journal is settled exactly once
//!
//! Writes are applied to the store immediately and journaled as
//! [`Compensation`]s. Rollback replays the journal in reverse, so a failed
//! transaction leaves no partial rename, column or order shift behind.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::storage::{
    CellValue, ColumnName, Compensation, LinkSide, RelationName, RowId, StorageResult,
    StoreState, StoredRow, TableStore,
};
use crate::transaction::error::TransactionResult;
use crate::transaction::locks::{LockManager, LockMode, LockTarget};

/// Marker type for active transactions.
#[derive(Debug)]
pub struct TxActive;

/// Marker type for committed transactions.
#[derive(Debug)]
pub struct TxCommitted;

/// Marker type for aborted transactions.
#[derive(Debug)]
pub struct TxAborted;

/// Transaction metadata stored in the manager.
#[derive(Debug, Clone)]
pub struct TransactionMetadata {
    /// Unique transaction ID.
    pub tx_id: String,
    /// Label of the physical store the transaction is scoped to.
    pub store: String,
    /// Longest wait for a single lock.
    pub lock_timeout: Duration,
    /// When the transaction started.
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// A transaction over one [`TableStore`] with typestate for lifecycle safety.
///
/// The `State` parameter tracks whether the transaction is:
/// - `TxActive`: Can perform operations
/// - `TxCommitted`: Successfully committed, no more operations allowed
/// - `TxAborted`: Rolled back, no more operations allowed
///
/// Dropping an active transaction rolls it back.
pub struct Transaction<State> {
    pub(crate) metadata: TransactionMetadata,
    store: TableStore,
    locks: LockManager,
    journal: Vec<Compensation>,
    held: Vec<LockTarget>,
    writes: usize,
    _state: PhantomData<State>,
}

impl<State> Transaction<State> {
    /// Get the transaction ID.
    pub fn id(&self) -> &str {
        &self.metadata.tx_id
    }

    /// Label of the store this transaction writes to.
    pub fn store_label(&self) -> &str {
        &self.metadata.store
    }

    /// Number of writes performed.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn settle<Next>(mut self) -> Transaction<Next> {
        let held = std::mem::take(&mut self.held);
        self.locks.release_all(&self.metadata.tx_id, &held);
        Transaction {
            metadata: self.metadata.clone(),
            store: self.store.clone(),
            locks: self.locks.clone(),
            journal: Vec::new(),
            held: Vec::new(),
            writes: self.writes,
            _state: PhantomData,
        }
    }

    fn revert(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        if journal.is_empty() {
            return;
        }
        let reverted = journal.len();
        self.store.write(|state| {
            for compensation in journal.into_iter().rev() {
                state.compensate(compensation);
            }
        });
        tracing::debug!(tx_id = %self.metadata.tx_id, reverted, "transaction rolled back");
    }
}

impl<State> Drop for Transaction<State> {
    fn drop(&mut self) {
        self.revert();
        let held = std::mem::take(&mut self.held);
        self.locks.release_all(&self.metadata.tx_id, &held);
    }
}

impl Transaction<TxActive> {
    /// Create a new active transaction.
    pub(crate) fn new(
        store: TableStore,
        locks: LockManager,
        tx_id: String,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            metadata: TransactionMetadata {
                tx_id,
                store: store.label().to_string(),
                lock_timeout,
                started_at: chrono::Utc::now(),
            },
            store,
            locks,
            journal: Vec::new(),
            held: Vec::new(),
            writes: 0,
            _state: PhantomData,
        }
    }

    fn record<T>(
        &mut self,
        f: impl FnOnce(&mut StoreState) -> StorageResult<(T, Compensation)>,
    ) -> TransactionResult<T> {
        let (value, compensation) = self.store.write(f)?;
        self.journal.push(compensation);
        self.writes += 1;
        Ok(value)
    }

    fn record_unit(
        &mut self,
        f: impl FnOnce(&mut StoreState) -> StorageResult<Compensation>,
    ) -> TransactionResult<()> {
        self.record(|state| f(state).map(|c| ((), c)))
    }

    // ==================== Locks ====================

    /// Take an exclusive lock, held until commit or rollback.
    pub fn lock(&mut self, target: LockTarget) -> TransactionResult<()> {
        self.lock_in(target, LockMode::Exclusive)
    }

    /// Take a shared lock, held until commit or rollback.
    pub fn lock_shared(&mut self, target: LockTarget) -> TransactionResult<()> {
        self.lock_in(target, LockMode::Shared)
    }

    fn lock_in(&mut self, target: LockTarget, mode: LockMode) -> TransactionResult<()> {
        let acquired = self.locks.acquire(
            &self.metadata.tx_id,
            &target,
            mode,
            self.metadata.lock_timeout,
        )?;
        if acquired {
            self.held.push(target);
        }
        Ok(())
    }

    /// Lock a row and read it (`select for update`).
    pub fn select_for_update(
        &mut self,
        relation: &RelationName,
        id: RowId,
    ) -> TransactionResult<Option<StoredRow>> {
        self.lock(LockTarget::Row {
            relation: relation.clone(),
            row: id,
        })?;
        self.read_row(relation, id)
    }

    // ==================== Reads ====================

    pub fn has_relation(&self, relation: &RelationName) -> bool {
        self.store.read(|s| s.has_relation(relation))
    }

    pub fn has_column(&self, relation: &RelationName, column: &str) -> bool {
        self.store.read(|s| s.has_column(relation, column))
    }

    pub fn has_link_table(&self, table: &RelationName) -> bool {
        self.store.read(|s| s.has_link_table(table))
    }

    pub fn read_row(&self, relation: &RelationName, id: RowId) -> TransactionResult<Option<StoredRow>> {
        Ok(self.store.read(|s| s.read_row(relation, id))?)
    }

    /// All rows of a relation in display order.
    pub fn scan(&self, relation: &RelationName) -> TransactionResult<Vec<StoredRow>> {
        Ok(self.store.read(|s| s.scan(relation))?)
    }

    pub fn row_ids(&self, relation: &RelationName) -> TransactionResult<Vec<RowId>> {
        Ok(self.store.read(|s| s.row_ids(relation))?)
    }

    pub fn max_order(&self, relation: &RelationName) -> TransactionResult<Option<Decimal>> {
        Ok(self.store.read(|s| s.max_order(relation))?)
    }

    pub fn min_order_in(
        &self,
        relation: &RelationName,
        lower: Decimal,
        upper: Decimal,
    ) -> TransactionResult<Option<Decimal>> {
        Ok(self.store.read(|s| s.min_order_in(relation, lower, upper))?)
    }

    pub fn link_targets(
        &self,
        table: &RelationName,
        side: LinkSide,
        row: RowId,
    ) -> TransactionResult<Vec<RowId>> {
        Ok(self.store.read(|s| s.link_targets(table, side, row))?)
    }

    // ==================== Relations & Columns ====================

    pub fn create_relation(&mut self, relation: &RelationName) -> TransactionResult<()> {
        self.record_unit(|s| s.create_relation(relation))
    }

    pub fn drop_relation(&mut self, relation: &RelationName) -> TransactionResult<()> {
        self.record_unit(|s| s.drop_relation(relation))
    }

    pub fn add_column(
        &mut self,
        relation: &RelationName,
        column: &ColumnName,
        default: CellValue,
    ) -> TransactionResult<()> {
        self.record_unit(|s| s.add_column(relation, column, default))
    }

    pub fn drop_column(&mut self, relation: &RelationName, column: &ColumnName) -> TransactionResult<()> {
        self.record_unit(|s| s.drop_column(relation, column))
    }

    pub fn rename_column(
        &mut self,
        relation: &RelationName,
        from: &ColumnName,
        to: &ColumnName,
    ) -> TransactionResult<()> {
        self.record_unit(|s| s.rename_column(relation, from, to))
    }

    // ==================== Rows ====================

    /// Insert a row, allocating an id unless `id` is given.
    pub fn insert_row(
        &mut self,
        relation: &RelationName,
        id: Option<RowId>,
        order: Decimal,
        cells: BTreeMap<ColumnName, CellValue>,
    ) -> TransactionResult<RowId> {
        self.record(|s| s.insert_row(relation, id, order, cells))
    }

    pub fn update_cells(
        &mut self,
        relation: &RelationName,
        id: RowId,
        cells: BTreeMap<ColumnName, CellValue>,
    ) -> TransactionResult<()> {
        self.record_unit(|s| s.update_cells(relation, id, cells))
    }

    pub fn delete_row(&mut self, relation: &RelationName, id: RowId) -> TransactionResult<()> {
        self.record_unit(|s| s.delete_row(relation, id))
    }

    /// Shift the orders in `(lower, upper]` by `delta` as one bulk write.
    pub fn shift_orders(
        &mut self,
        relation: &RelationName,
        lower: Decimal,
        upper: Decimal,
        delta: Decimal,
    ) -> TransactionResult<usize> {
        self.record(|s| s.shift_orders(relation, lower, upper, delta))
    }

    pub fn set_orders(
        &mut self,
        relation: &RelationName,
        orders: &[(RowId, Decimal)],
    ) -> TransactionResult<()> {
        self.record_unit(|s| s.set_orders(relation, orders))
    }

    // ==================== Link Tables ====================

    pub fn create_link_table(&mut self, table: &RelationName) -> TransactionResult<()> {
        self.record_unit(|s| s.create_link_table(table))
    }

    pub fn drop_link_table(&mut self, table: &RelationName) -> TransactionResult<()> {
        self.record_unit(|s| s.drop_link_table(table))
    }

    pub fn rename_link_table(&mut self, from: &RelationName, to: &RelationName) -> TransactionResult<()> {
        self.record_unit(|s| s.rename_link_table(from, to))
    }

    pub fn set_links(
        &mut self,
        table: &RelationName,
        side: LinkSide,
        row: RowId,
        targets: &[RowId],
    ) -> TransactionResult<()> {
        self.record_unit(|s| s.set_links(table, side, row, targets))
    }

    pub fn unlink_row(
        &mut self,
        table: &RelationName,
        side: LinkSide,
        row: RowId,
        both_sides: bool,
    ) -> TransactionResult<()> {
        self.record_unit(|s| s.unlink_row(table, side, row, both_sides))
    }

    // ==================== Transaction Control ====================

    /// Commit the transaction, keeping every write and releasing locks.
    pub fn commit(mut self) -> Transaction<TxCommitted> {
        self.journal.clear();
        self.settle()
    }

    /// Rollback the transaction, reverting every write in reverse order.
    pub fn rollback(mut self) -> Transaction<TxAborted> {
        self.revert();
        self.settle()
    }
}

impl Transaction<TxAborted> {
    pub fn was_rolled_back(&self) -> bool {
        true
    }
}
