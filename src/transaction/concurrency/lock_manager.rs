use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::transaction::{Transaction, TransactionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Transactions holding a lock on one rid. The holder set is ordered so
/// the oldest holder (smallest id) is always first.
struct GrantedLock {
    mode: LockMode,
    holders: BTreeSet<TxnId>,
}

impl GrantedLock {
    fn new(mode: LockMode, txn_id: TxnId) -> Self {
        let mut holders = BTreeSet::new();
        holders.insert(txn_id);
        Self { mode, holders }
    }

    fn oldest(&self) -> TxnId {
        debug_assert!(!self.holders.is_empty());
        *self.holders.iter().next().expect("granted set is never empty")
    }
}

struct LockTables {
    lock_table: HashMap<Rid, GrantedLock>,
    // Arc so an unlocker can still signal after dropping the table entry;
    // the slot is removed only when no waiter holds a reference
    cond_table: HashMap<Rid, Arc<Condvar>>,
}

/// Tuple-granularity lock manager with wait-die deadlock avoidance: a
/// requester waits only when it is older (smaller id) than every current
/// holder, otherwise it dies. Waits therefore always run old → young and
/// the waits-for graph cannot form a cycle.
///
/// Locking requires the caller to be GROWING; any violation aborts the
/// transaction and fails the call. Waking from a wait is a re-check, not
/// a grant.
pub struct LockManager {
    strict_2pl: bool,
    tables: Mutex<LockTables>,
}

impl LockManager {
    pub fn new(strict_2pl: bool) -> Self {
        Self {
            strict_2pl,
            tables: Mutex::new(LockTables {
                lock_table: HashMap::new(),
                cond_table: HashMap::new(),
            }),
        }
    }

    /// Acquire a shared lock on `rid`, blocking behind an older exclusive
    /// holder. Returns false (with the transaction aborted) when wait-die
    /// kills the request.
    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> bool {
        if !self.valid_for_lock(txn) {
            return false;
        }
        let txn_id = txn.id();
        let mut tables = self.tables.lock();

        let exclusive_holder = match tables.lock_table.get(&rid) {
            Some(granted) if granted.mode == LockMode::Exclusive => Some(granted.oldest()),
            _ => None,
        };
        if let Some(oldest) = exclusive_holder {
            if txn_id >= oldest {
                debug!("txn {} dies requesting S on {}", txn_id, rid);
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            let cv = Self::condvar(&mut tables, rid);
            while matches!(tables.lock_table.get(&rid), Some(g) if g.mode == LockMode::Exclusive) {
                cv.wait(&mut tables);
            }
        }

        // the entry may have vanished while we waited; re-derive it
        match tables.lock_table.get_mut(&rid) {
            None => {
                tables
                    .lock_table
                    .insert(rid, GrantedLock::new(LockMode::Shared, txn_id));
            }
            Some(granted) => {
                debug_assert_eq!(granted.mode, LockMode::Shared);
                granted.holders.insert(txn_id);
            }
        }
        txn.add_shared_lock(rid);
        true
    }

    /// Acquire an exclusive lock on `rid`.
    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> bool {
        if !self.valid_for_lock(txn) {
            return false;
        }
        let txn_id = txn.id();
        let mut tables = self.tables.lock();

        let current_oldest = tables.lock_table.get(&rid).map(GrantedLock::oldest);
        if let Some(oldest) = current_oldest {
            if txn_id >= oldest {
                debug!("txn {} dies requesting X on {}", txn_id, rid);
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            let cv = Self::condvar(&mut tables, rid);
            while tables.lock_table.contains_key(&rid) {
                cv.wait(&mut tables);
            }
        }

        tables
            .lock_table
            .insert(rid, GrantedLock::new(LockMode::Exclusive, txn_id));
        txn.add_exclusive_lock(rid);
        true
    }

    /// Upgrade a held shared lock to exclusive. The shared grant is given
    /// up first; if other sharers remain, wait-die applies against them.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: Rid) -> bool {
        if !self.valid_for_lock(txn) {
            return false;
        }
        let txn_id = txn.id();
        let mut tables = self.tables.lock();

        let Some(granted) = tables.lock_table.get_mut(&rid) else {
            txn.set_state(TransactionState::Aborted);
            return false;
        };
        if granted.mode != LockMode::Shared || !granted.holders.remove(&txn_id) {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        txn.remove_shared_lock(rid);

        if granted.holders.is_empty() {
            granted.mode = LockMode::Exclusive;
            granted.holders.insert(txn_id);
            txn.add_exclusive_lock(rid);
            return true;
        }

        if txn_id >= granted.oldest() {
            debug!("txn {} dies upgrading lock on {}", txn_id, rid);
            txn.set_state(TransactionState::Aborted);
            return false;
        }

        let cv = Self::condvar(&mut tables, rid);
        while tables.lock_table.contains_key(&rid) {
            cv.wait(&mut tables);
        }
        tables
            .lock_table
            .insert(rid, GrantedLock::new(LockMode::Exclusive, txn_id));
        txn.add_exclusive_lock(rid);
        true
    }

    /// Release this transaction's lock on `rid`. Under strict 2PL the
    /// transaction must already be COMMITTED or ABORTED.
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        if self.strict_2pl
            && !matches!(
                txn.state(),
                TransactionState::Committed | TransactionState::Aborted
            )
        {
            txn.set_state(TransactionState::Aborted);
            return false;
        }

        let mut tables = self.tables.lock();
        let Some(granted) = tables.lock_table.get_mut(&rid) else {
            txn.set_state(TransactionState::Aborted);
            return false;
        };
        if !granted.holders.remove(&txn.id()) {
            txn.set_state(TransactionState::Aborted);
            return false;
        }

        if !self.strict_2pl && txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
        }

        match granted.mode {
            LockMode::Shared => txn.remove_shared_lock(rid),
            LockMode::Exclusive => txn.remove_exclusive_lock(rid),
        }

        if granted.holders.is_empty() {
            tables.lock_table.remove(&rid);
            if let Some(cv) = tables.cond_table.get(&rid) {
                cv.notify_all();
                // last reference means nobody is waiting on this slot
                if Arc::strong_count(cv) == 1 {
                    tables.cond_table.remove(&rid);
                }
            }
        }
        true
    }

    fn condvar(tables: &mut LockTables, rid: Rid) -> Arc<Condvar> {
        tables
            .cond_table
            .entry(rid)
            .or_insert_with(|| Arc::new(Condvar::new()))
            .clone()
    }

    fn valid_for_lock(&self, txn: &Transaction) -> bool {
        if txn.state() != TransactionState::Growing {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_locks_coexist() {
        let lock_mgr = LockManager::new(false);
        let t0 = Transaction::new(0);
        let t1 = Transaction::new(1);
        let rid = Rid::new(0, 0);

        assert!(lock_mgr.lock_shared(&t0, rid));
        assert!(lock_mgr.lock_shared(&t1, rid));
        assert!(t0.holds_shared_lock(rid));
        assert!(t1.holds_shared_lock(rid));

        assert!(lock_mgr.unlock(&t0, rid));
        assert_eq!(t0.state(), TransactionState::Shrinking);
        assert!(lock_mgr.unlock(&t1, rid));
    }

    #[test]
    fn test_younger_dies_on_exclusive_conflict() {
        let lock_mgr = LockManager::new(false);
        let old = Transaction::new(1);
        let young = Transaction::new(5);
        let rid = Rid::new(0, 0);

        assert!(lock_mgr.lock_exclusive(&old, rid));
        assert!(!lock_mgr.lock_shared(&young, rid));
        assert_eq!(young.state(), TransactionState::Aborted);
        assert_eq!(old.state(), TransactionState::Growing);
    }

    #[test]
    fn test_no_lock_after_shrinking() {
        let lock_mgr = LockManager::new(false);
        let txn = Transaction::new(0);
        let rid_a = Rid::new(0, 0);
        let rid_b = Rid::new(0, 1);

        assert!(lock_mgr.lock_shared(&txn, rid_a));
        assert!(lock_mgr.unlock(&txn, rid_a));
        assert_eq!(txn.state(), TransactionState::Shrinking);

        assert!(!lock_mgr.lock_shared(&txn, rid_b));
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_upgrade_sole_holder() {
        let lock_mgr = LockManager::new(false);
        let txn = Transaction::new(0);
        let rid = Rid::new(0, 0);

        assert!(lock_mgr.lock_shared(&txn, rid));
        assert!(lock_mgr.lock_upgrade(&txn, rid));
        assert!(txn.holds_exclusive_lock(rid));
        assert!(!txn.holds_shared_lock(rid));
    }

    #[test]
    fn test_upgrade_without_shared_aborts() {
        let lock_mgr = LockManager::new(false);
        let txn = Transaction::new(0);
        let rid = Rid::new(0, 0);

        assert!(!lock_mgr.lock_upgrade(&txn, rid));
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_unlock_unheld_aborts() {
        let lock_mgr = LockManager::new(false);
        let holder = Transaction::new(0);
        let other = Transaction::new(1);
        let rid = Rid::new(0, 0);

        assert!(lock_mgr.lock_exclusive(&holder, rid));
        assert!(!lock_mgr.unlock(&other, rid));
        assert_eq!(other.state(), TransactionState::Aborted);
    }
}
