use std::sync::Arc;

use anyhow::{anyhow, Result};
use tempfile::NamedTempFile;

use karstdb::common::types::{PageId, Rid, INVALID_PAGE_ID};
use karstdb::storage::buffer::BufferPoolManager;
use karstdb::storage::disk::DiskManager;
use karstdb::storage::page::TablePage;
use karstdb::storage::tuple::Tuple;
use karstdb::transaction::concurrency::{TableOp, Transaction, WriteRecord, WriteType};
use karstdb::transaction::wal::log_record::LogRecord;
use karstdb::transaction::wal::LogManager;

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<NamedTempFile> {
    Ok(NamedTempFile::new()?)
}

// Create a buffer pool manager with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(
    pool_size: usize,
) -> Result<(Arc<BufferPoolManager>, Arc<DiskManager>, NamedTempFile)> {
    let file = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(file.path())?);
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, disk_manager.clone()));
    Ok((buffer_pool, disk_manager, file))
}

/// Minimal single-page table used to exercise transaction rollback and
/// crash recovery. Mirrors what a real heap would do: every mutation is
/// logged, the page LSN tracks the latest record, and the write set is
/// populated for rollback.
#[allow(dead_code)]
pub struct TestTable {
    buffer_pool: Arc<BufferPoolManager>,
    log_manager: Option<Arc<LogManager>>,
    page_id: PageId,
}

#[allow(dead_code)]
impl TestTable {
    pub fn create(
        buffer_pool: &Arc<BufferPoolManager>,
        log_manager: Option<&Arc<LogManager>>,
        txn: &Transaction,
    ) -> Result<Arc<Self>> {
        let (page_ptr, page_id) = buffer_pool.new_page()?;
        {
            let mut page = page_ptr.write();
            TablePage::new(&mut page.data).init(page_id, INVALID_PAGE_ID);
        }

        let table = Arc::new(Self {
            buffer_pool: buffer_pool.clone(),
            log_manager: log_manager.cloned(),
            page_id,
        });
        if let Some(lm) = table.logging() {
            let mut record = LogRecord::new_new_page(txn.id(), txn.prev_lsn(), INVALID_PAGE_ID);
            let lsn = lm.append_log_record(&mut record);
            txn.set_prev_lsn(lsn);
            page_ptr.write().set_lsn(lsn);
        }
        buffer_pool.unpin_page(page_id, true)?;
        Ok(table)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    fn logging(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref().filter(|lm| lm.is_enabled())
    }

    pub fn insert(self: &Arc<Self>, tuple: Tuple, rid: Rid, txn: &Transaction) -> Result<()> {
        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
        {
            let mut page = page_ptr.write();
            TablePage::new(&mut page.data)
                .insert_tuple(&tuple, rid)
                .map_err(|e| anyhow!("insert failed: {e}"))?;
            if let Some(lm) = self.logging() {
                let mut record =
                    LogRecord::new_insert(txn.id(), txn.prev_lsn(), rid, tuple.clone());
                let lsn = lm.append_log_record(&mut record);
                txn.set_prev_lsn(lsn);
                page.set_lsn(lsn);
            }
        }
        self.buffer_pool.unpin_page(rid.page_id, true)?;
        txn.add_to_write_set(WriteRecord::new(
            WriteType::Insert,
            rid,
            Tuple::default(),
            self.clone() as Arc<dyn TableOp>,
        ));
        Ok(())
    }

    pub fn update(self: &Arc<Self>, tuple: Tuple, rid: Rid, txn: &Transaction) -> Result<()> {
        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
        let old_tuple;
        {
            let mut page = page_ptr.write();
            old_tuple = TablePage::new(&mut page.data)
                .update_tuple(&tuple, rid)
                .map_err(|e| anyhow!("update failed: {e}"))?;
            if let Some(lm) = self.logging() {
                let mut record = LogRecord::new_update(
                    txn.id(),
                    txn.prev_lsn(),
                    rid,
                    old_tuple.clone(),
                    tuple.clone(),
                );
                let lsn = lm.append_log_record(&mut record);
                txn.set_prev_lsn(lsn);
                page.set_lsn(lsn);
            }
        }
        self.buffer_pool.unpin_page(rid.page_id, true)?;
        txn.add_to_write_set(WriteRecord::new(
            WriteType::Update,
            rid,
            old_tuple,
            self.clone() as Arc<dyn TableOp>,
        ));
        Ok(())
    }

    /// Tombstone the tuple; the physical removal is deferred to commit.
    pub fn mark_delete(self: &Arc<Self>, rid: Rid, txn: &Transaction) -> Result<()> {
        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
        {
            let mut page = page_ptr.write();
            let mut table_page = TablePage::new(&mut page.data);
            let old_tuple = table_page
                .get_tuple(rid)
                .map_err(|e| anyhow!("mark delete failed: {e}"))?;
            table_page
                .mark_delete(rid)
                .map_err(|e| anyhow!("mark delete failed: {e}"))?;
            if let Some(lm) = self.logging() {
                let mut record =
                    LogRecord::new_mark_delete(txn.id(), txn.prev_lsn(), rid, old_tuple.clone());
                let lsn = lm.append_log_record(&mut record);
                txn.set_prev_lsn(lsn);
                page.set_lsn(lsn);
            }
            txn.add_to_write_set(WriteRecord::new(
                WriteType::Delete,
                rid,
                old_tuple,
                self.clone() as Arc<dyn TableOp>,
            ));
        }
        self.buffer_pool.unpin_page(rid.page_id, true)?;
        Ok(())
    }

    pub fn get(&self, rid: Rid) -> Option<Tuple> {
        let page_ptr = self.buffer_pool.fetch_page(rid.page_id).ok()?;
        let result = {
            let mut page = page_ptr.write();
            TablePage::new(&mut page.data).get_tuple(rid).ok()
        };
        self.buffer_pool.unpin_page(rid.page_id, false).ok()?;
        result
    }
}

impl TableOp for TestTable {
    fn apply_delete(&self, rid: Rid, txn: &Transaction) -> bool {
        let Ok(page_ptr) = self.buffer_pool.fetch_page(rid.page_id) else {
            return false;
        };
        let ok = {
            let mut page = page_ptr.write();
            match TablePage::new(&mut page.data).apply_delete(rid) {
                Ok(tuple) => {
                    if let Some(lm) = self.logging() {
                        let mut record =
                            LogRecord::new_apply_delete(txn.id(), txn.prev_lsn(), rid, tuple);
                        let lsn = lm.append_log_record(&mut record);
                        txn.set_prev_lsn(lsn);
                        page.set_lsn(lsn);
                    }
                    true
                }
                Err(_) => false,
            }
        };
        self.buffer_pool.unpin_page(rid.page_id, ok).is_ok() && ok
    }

    fn rollback_delete(&self, rid: Rid, txn: &Transaction) -> bool {
        let Ok(page_ptr) = self.buffer_pool.fetch_page(rid.page_id) else {
            return false;
        };
        let ok = {
            let mut page = page_ptr.write();
            let mut table_page = TablePage::new(&mut page.data);
            match table_page.rollback_delete(rid) {
                Ok(()) => {
                    let tuple = table_page.get_tuple(rid).unwrap_or_default();
                    if let Some(lm) = self.logging() {
                        let mut record =
                            LogRecord::new_rollback_delete(txn.id(), txn.prev_lsn(), rid, tuple);
                        let lsn = lm.append_log_record(&mut record);
                        txn.set_prev_lsn(lsn);
                        page.set_lsn(lsn);
                    }
                    true
                }
                Err(_) => false,
            }
        };
        self.buffer_pool.unpin_page(rid.page_id, ok).is_ok() && ok
    }

    fn update_tuple(&self, tuple: &Tuple, rid: Rid, txn: &Transaction) -> bool {
        let Ok(page_ptr) = self.buffer_pool.fetch_page(rid.page_id) else {
            return false;
        };
        let ok = {
            let mut page = page_ptr.write();
            match TablePage::new(&mut page.data).update_tuple(tuple, rid) {
                Ok(old_tuple) => {
                    if let Some(lm) = self.logging() {
                        let mut record = LogRecord::new_update(
                            txn.id(),
                            txn.prev_lsn(),
                            rid,
                            old_tuple,
                            tuple.clone(),
                        );
                        let lsn = lm.append_log_record(&mut record);
                        txn.set_prev_lsn(lsn);
                        page.set_lsn(lsn);
                    }
                    true
                }
                Err(_) => false,
            }
        };
        self.buffer_pool.unpin_page(rid.page_id, ok).is_ok() && ok
    }
}
