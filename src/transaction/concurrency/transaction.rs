use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::types::{Lsn, Rid, TxnId, INVALID_LSN};
use crate::storage::tuple::Tuple;

/// Two-phase locking states. A transaction is SHRINKING only after its
/// first unlock (non-strict mode) and may not acquire afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    Insert,
    Delete,
    Update,
}

/// The table-side operations transaction rollback needs. Write records
/// carry one of these as a trait object so commit/abort can reach back
/// into whichever table produced the write.
pub trait TableOp: Send + Sync {
    /// Physically remove the tuple at `rid`.
    fn apply_delete(&self, rid: Rid, txn: &Transaction) -> bool;
    /// Clear a pending delete mark at `rid`.
    fn rollback_delete(&self, rid: Rid, txn: &Transaction) -> bool;
    /// Put `tuple` back at `rid`.
    fn update_tuple(&self, tuple: &Tuple, rid: Rid, txn: &Transaction) -> bool;
}

/// One entry of a transaction's undo information. For UPDATE the tuple is
/// the before-image; for DELETE it is the tuple pending physical removal.
pub struct WriteRecord {
    pub wtype: WriteType,
    pub rid: Rid,
    pub tuple: Tuple,
    pub table: Arc<dyn TableOp>,
}

impl WriteRecord {
    pub fn new(wtype: WriteType, rid: Rid, tuple: Tuple, table: Arc<dyn TableOp>) -> Self {
        Self {
            wtype,
            rid,
            tuple,
            table,
        }
    }
}

/// An active transaction: lock sets maintained by the lock manager, a
/// LIFO write set for rollback, and the LSN of its latest log record.
pub struct Transaction {
    id: TxnId,
    state: Mutex<TransactionState>,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
    write_set: Mutex<Vec<WriteRecord>>,
    prev_lsn: AtomicI32,
}

impl Transaction {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            state: Mutex::new(TransactionState::Growing),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
            write_set: Mutex::new(Vec::new()),
            prev_lsn: AtomicI32::new(INVALID_LSN),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    pub fn prev_lsn(&self) -> Lsn {
        self.prev_lsn.load(Ordering::SeqCst)
    }

    pub fn set_prev_lsn(&self, lsn: Lsn) {
        self.prev_lsn.store(lsn, Ordering::SeqCst);
    }

    pub fn add_to_write_set(&self, record: WriteRecord) {
        self.write_set.lock().push(record);
    }

    pub fn pop_write_record(&self) -> Option<WriteRecord> {
        self.write_set.lock().pop()
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub fn remove_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().remove(&rid);
    }

    pub fn remove_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().remove(&rid);
    }

    pub fn holds_shared_lock(&self, rid: Rid) -> bool {
        self.shared_lock_set.lock().contains(&rid)
    }

    pub fn holds_exclusive_lock(&self, rid: Rid) -> bool {
        self.exclusive_lock_set.lock().contains(&rid)
    }

    /// Every rid this transaction currently holds a lock on.
    pub fn locked_rids(&self) -> HashSet<Rid> {
        let mut rids: HashSet<Rid> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }
}
