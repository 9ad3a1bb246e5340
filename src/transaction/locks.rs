//! Locks held by transactions.
//!
//! Locks are keyed by [`LockTarget`] and owned by transaction ids until those
//! transactions commit or roll back. A lock is held either exclusively by one
//! transaction or shared by several. Waiters park on a condvar and give up
//! once the transaction's lock timeout elapses.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::storage::{RelationName, RowId};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Something a transaction can lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockTarget {
    /// The layout of a relation. Row writers hold it shared; schema changes
    /// (column conversions, field and table deletion) hold it exclusively.
    Table(RelationName),
    /// A single row (`select for update`).
    Row { relation: RelationName, row: RowId },
    /// The order values of a relation. Held while orders are allocated.
    Ordering(RelationName),
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTarget::Table(relation) => write!(f, "table {relation}"),
            LockTarget::Row { relation, row } => write!(f, "row {relation}#{row}"),
            LockTarget::Ordering(relation) => write!(f, "ordering of {relation}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
enum Holders {
    Exclusive(String),
    Shared(BTreeSet<String>),
}

impl Holders {
    fn new(mode: LockMode, tx_id: &str) -> Self {
        match mode {
            LockMode::Exclusive => Holders::Exclusive(tx_id.to_string()),
            LockMode::Shared => Holders::Shared(BTreeSet::from([tx_id.to_string()])),
        }
    }

    fn contains(&self, tx_id: &str) -> bool {
        match self {
            Holders::Exclusive(owner) => owner == tx_id,
            Holders::Shared(owners) => owners.contains(tx_id),
        }
    }

    fn is_sole_shared(&self, tx_id: &str) -> bool {
        matches!(self, Holders::Shared(owners) if owners.len() == 1 && owners.contains(tx_id))
    }
}

/// Lock table shared by all transactions of one store.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone, Default)]
pub struct LockManager {
    inner: Arc<LockManagerInner>,
}

#[derive(Default)]
struct LockManagerInner {
    held: Mutex<HashMap<LockTarget, Holders>>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `target` in `mode` for `tx_id`, waiting at most `timeout`.
    ///
    /// Returns `true` when the transaction did not hold the lock before and
    /// `false` when it already did. A sole shared holder asking for the
    /// exclusive lock is upgraded; an exclusive holder asking for a shared
    /// lock keeps its exclusive one.
    pub fn acquire(
        &self,
        tx_id: &str,
        target: &LockTarget,
        mode: LockMode,
        timeout: Duration,
    ) -> TransactionResult<bool> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut held = self.inner.held.lock();

        loop {
            match held.get_mut(target) {
                None => {
                    held.insert(target.clone(), Holders::new(mode, tx_id));
                    return Ok(true);
                }
                Some(Holders::Exclusive(owner)) if owner == tx_id => return Ok(false),
                Some(Holders::Shared(owners)) if mode == LockMode::Shared => {
                    return Ok(owners.insert(tx_id.to_string()));
                }
                Some(holders) if holders.is_sole_shared(tx_id) => {
                    *holders = Holders::Exclusive(tx_id.to_string());
                    return Ok(false);
                }
                Some(_) => {}
            }

            if Instant::now() >= deadline {
                let waited_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(tx_id, %target, ?mode, waited_ms, "lock wait timed out");
                return Err(TransactionError::Timeout {
                    tx_id: tx_id.to_string(),
                    target: target.to_string(),
                    waited_ms,
                });
            }
            self.inner.released.wait_until(&mut held, deadline);
        }
    }

    /// Release every lock in `targets` held by `tx_id` and wake waiters.
    pub fn release_all(&self, tx_id: &str, targets: &[LockTarget]) {
        if targets.is_empty() {
            return;
        }
        let mut held = self.inner.held.lock();
        for target in targets {
            let emptied = match held.get_mut(target) {
                Some(Holders::Exclusive(owner)) => owner == tx_id,
                Some(Holders::Shared(owners)) => {
                    owners.remove(tx_id);
                    owners.is_empty()
                }
                None => false,
            };
            if emptied {
                held.remove(target);
            }
        }
        drop(held);
        self.inner.released.notify_all();
    }

    /// Whether `tx_id` holds `target` in any mode.
    pub fn is_held_by(&self, target: &LockTarget, tx_id: &str) -> bool {
        self.inner
            .held
            .lock()
            .get(target)
            .map(|holders| holders.contains(tx_id))
            .unwrap_or(false)
    }

    /// Current exclusive owner of a lock.
    pub fn owner(&self, target: &LockTarget) -> Option<String> {
        match self.inner.held.lock().get(target) {
            Some(Holders::Exclusive(owner)) => Some(owner.clone()),
            _ => None,
        }
    }

    /// Number of locks currently held.
    pub fn held_count(&self) -> usize {
        self.inner.held.lock().len()
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("held_count", &self.held_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn row(id: RowId) -> LockTarget {
        LockTarget::Row {
            relation: RelationName::new("database_table_1").unwrap(),
            row: id,
        }
    }

    #[test]
    fn test_acquire_is_reentrant() {
        let locks = LockManager::new();
        assert!(locks.acquire("tx1", &row(1), LockMode::Exclusive, Duration::from_millis(10)).unwrap());
        assert!(!locks.acquire("tx1", &row(1), LockMode::Exclusive, Duration::from_millis(10)).unwrap());
        assert_eq!(locks.owner(&row(1)), Some("tx1".to_string()));
    }

    #[test]
    fn test_acquire_times_out() {
        let locks = LockManager::new();
        locks.acquire("tx1", &row(1), LockMode::Exclusive, Duration::from_millis(10)).unwrap();

        let err = locks
            .acquire("tx2", &row(1), LockMode::Exclusive, Duration::from_millis(20))
            .unwrap_err();
        assert!(err.is_retryable());

        // other rows are independent
        assert!(locks.acquire("tx2", &row(2), LockMode::Exclusive, Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let locks = LockManager::new();
        locks.acquire("tx1", &row(1), LockMode::Exclusive, Duration::from_millis(10)).unwrap();

        let waiter = {
            let locks = locks.clone();
            thread::spawn(move || locks.acquire("tx2", &row(1), LockMode::Exclusive, Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        locks.release_all("tx1", &[row(1)]);

        assert!(waiter.join().unwrap().unwrap());
        assert_eq!(locks.owner(&row(1)), Some("tx2".to_string()));
    }

    #[test]
    fn test_release_ignores_foreign_locks() {
        let locks = LockManager::new();
        locks.acquire("tx1", &row(1), LockMode::Exclusive, Duration::from_millis(10)).unwrap();
        locks.release_all("tx2", &[row(1)]);
        assert_eq!(locks.held_count(), 1);
    }

    fn table() -> LockTarget {
        LockTarget::Table(RelationName::new("database_table_1").unwrap())
    }

    #[test]
    fn test_shared_holders_exclude_writers() {
        let locks = LockManager::new();
        let wait = Duration::from_millis(20);
        assert!(locks.acquire("tx1", &table(), LockMode::Shared, wait).unwrap());
        assert!(locks.acquire("tx2", &table(), LockMode::Shared, wait).unwrap());
        assert!(!locks.acquire("tx2", &table(), LockMode::Shared, wait).unwrap());

        let err = locks.acquire("tx3", &table(), LockMode::Exclusive, wait).unwrap_err();
        assert!(err.is_retryable());
        // tx2 still shares the table with tx1
        assert!(locks.acquire("tx1", &table(), LockMode::Exclusive, wait).is_err());

        locks.release_all("tx2", &[table()]);
        assert!(!locks.acquire("tx1", &table(), LockMode::Exclusive, wait).unwrap());
        assert_eq!(locks.owner(&table()), Some("tx1".to_string()));
    }

    #[test]
    fn test_exclusive_holder_blocks_shared() {
        let locks = LockManager::new();
        let wait = Duration::from_millis(20);
        locks.acquire("tx1", &table(), LockMode::Exclusive, wait).unwrap();
        assert!(!locks.acquire("tx1", &table(), LockMode::Shared, wait).unwrap());
        assert!(locks.acquire("tx2", &table(), LockMode::Shared, wait).is_err());

        let reader = {
            let locks = locks.clone();
            thread::spawn(move || locks.acquire("tx2", &table(), LockMode::Shared, Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        locks.release_all("tx1", &[table()]);

        assert!(reader.join().unwrap().unwrap());
        assert!(locks.is_held_by(&table(), "tx2"));
        assert_eq!(locks.owner(&table()), None);
        locks.release_all("tx2", &[table()]);
        assert_eq!(locks.held_count(), 0);
    }
}
