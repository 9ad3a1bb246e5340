//! Transaction management for gridstore.
//!
//! Every transaction is scoped to one physical [`TableStore`](crate::storage::TableStore).
//! Writes apply immediately and are journaled; on commit the journal is
//! dropped, on rollback (or when an active transaction is dropped) it is
//! replayed in reverse. Table, row and ordering locks are held until the transaction
//! ends.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │     (begins transactions, tracks active tx, owns locks)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               │                             │
//!               ▼                             ▼
//!        ┌─────────────┐               ┌─────────────┐
//!        │ Transaction │               │    Lock     │
//!        │  (journal)  │               │   Manager   │
//!        └─────────────┘               └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use gridstore::transaction::TransactionManager;
//!
//! let manager = TransactionManager::new(store, Duration::from_secs(5));
//!
//! manager.with_transaction(|tx| -> TransactionResult<_> {
//!     let row = tx.select_for_update(&relation, 4)?;
//!     tx.update_cells(&relation, 4, cells)?;
//!     Ok(())
//! })?;
//! ```

mod context;
mod error;
mod locks;
mod manager;

pub use context::{Transaction, TransactionMetadata, TxAborted, TxActive, TxCommitted};
pub use error::{TransactionError, TransactionResult};
pub use locks::{LockManager, LockMode, LockTarget};
pub use manager::TransactionManager;
