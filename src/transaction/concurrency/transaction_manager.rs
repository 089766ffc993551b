use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{Transaction, TransactionState, WriteType};
use crate::transaction::wal::log_record::LogRecord;
use crate::transaction::wal::LogManager;

/// Creates transactions and drives them through commit or abort:
/// write-set resolution first, then the COMMIT/ABORT record made durable,
/// then every held lock released (strict two-phase locking).
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    lock_manager: Arc<LockManager>,
    log_manager: Option<Arc<LogManager>>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            lock_manager,
            log_manager: None,
        }
    }

    pub fn with_log_manager(lock_manager: Arc<LockManager>, log_manager: Arc<LogManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            lock_manager,
            log_manager: Some(log_manager),
        }
    }

    /// Start a transaction with a fresh id (ids order transactions by
    /// age for wait-die).
    pub fn begin(&self) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id));

        if let Some(log_manager) = self.logging() {
            let mut record = LogRecord::new_begin(txn_id);
            let lsn = log_manager.append_log_record(&mut record);
            txn.set_prev_lsn(lsn);
        }
        txn
    }

    pub fn commit(&self, txn: &Transaction) {
        txn.set_state(TransactionState::Committed);

        // deferred physical deletes happen now, newest first, while the
        // locks are still held
        while let Some(item) = txn.pop_write_record() {
            if item.wtype == WriteType::Delete {
                item.table.apply_delete(item.rid, txn);
            }
        }

        if let Some(log_manager) = self.logging() {
            let mut record = LogRecord::new_commit(txn.id(), txn.prev_lsn());
            let lsn = log_manager.append_log_record(&mut record);
            txn.set_prev_lsn(lsn);
            // commit is durable only once its record is on disk
            log_manager.flush_till_lsn(lsn);
        }

        self.release_locks(txn);
        debug!("txn {} committed", txn.id());
    }

    pub fn abort(&self, txn: &Transaction) {
        txn.set_state(TransactionState::Aborted);

        // roll back in reverse order before releasing any lock
        while let Some(item) = txn.pop_write_record() {
            match item.wtype {
                WriteType::Delete => {
                    item.table.rollback_delete(item.rid, txn);
                }
                WriteType::Insert => {
                    item.table.apply_delete(item.rid, txn);
                }
                WriteType::Update => {
                    item.table.update_tuple(&item.tuple, item.rid, txn);
                }
            }
        }

        if let Some(log_manager) = self.logging() {
            let mut record = LogRecord::new_abort(txn.id(), txn.prev_lsn());
            let lsn = log_manager.append_log_record(&mut record);
            txn.set_prev_lsn(lsn);
            log_manager.flush_till_lsn(lsn);
        }

        self.release_locks(txn);
        debug!("txn {} aborted", txn.id());
    }

    fn release_locks(&self, txn: &Transaction) {
        for rid in txn.locked_rids() {
            self.lock_manager.unlock(txn, rid);
        }
    }

    fn logging(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref().filter(|lm| lm.is_enabled())
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn next_txn_id(&self) -> TxnId {
        self.next_txn_id.load(Ordering::SeqCst)
    }
}
