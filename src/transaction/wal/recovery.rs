use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::common::types::{Lsn, TxnId, INVALID_PAGE_ID, LOG_BUFFER_SIZE};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::disk::{DiskManager, DiskManagerError};
use crate::storage::page::{TablePage, TablePageError};
use crate::transaction::wal::log_record::{LogPayload, LogRecord, LOG_HEADER_SIZE};

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("disk manager error: {0}")]
    Disk(#[from] DiskManagerError),

    #[error("buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("table page error: {0}")]
    Page(#[from] TablePageError),

    #[error("log chain refers to unknown lsn {0}")]
    MissingLsn(Lsn),
}

/// ARIES-style crash recovery: a forward redo pass over the whole log,
/// then a backward undo pass over every transaction without a COMMIT or
/// ABORT record. Runs single-threaded with logging disabled.
pub struct LogRecovery {
    disk_manager: Arc<DiskManager>,
    buffer_pool: Arc<BufferPoolManager>,
    // txn id -> last seen lsn, pruned on COMMIT/ABORT
    active_txns: HashMap<TxnId, Lsn>,
    // lsn -> absolute offset of the record in the log file
    lsn_mapping: HashMap<Lsn, u64>,
    log_buffer: Vec<u8>,
}

impl LogRecovery {
    pub fn new(disk_manager: Arc<DiskManager>, buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            disk_manager,
            buffer_pool,
            active_txns: HashMap::new(),
            lsn_mapping: HashMap::new(),
            log_buffer: vec![0u8; LOG_BUFFER_SIZE],
        }
    }

    /// Transactions still open after the last `redo` pass.
    pub fn active_txns(&self) -> &HashMap<TxnId, Lsn> {
        &self.active_txns
    }

    /// Decode the record at `offset` in the scan buffer. `None` means a
    /// chunk boundary or a truncated/corrupt tail; the caller either
    /// re-reads from the record start or ends the pass.
    fn deserialize_at(&self, offset: usize) -> Option<LogRecord> {
        if offset + LOG_HEADER_SIZE > LOG_BUFFER_SIZE {
            return None;
        }
        LogRecord::deserialize(&self.log_buffer[offset..])
    }

    /// Forward pass: re-apply every physical record whose LSN is newer
    /// than its page, rebuilding `active_txns` and the LSN → file offset
    /// map along the way.
    pub fn redo(&mut self) -> Result<(), RecoveryError> {
        self.active_txns.clear();
        self.lsn_mapping.clear();

        let mut read_offset: u64 = 0;
        while self.disk_manager.read_log(&mut self.log_buffer, read_offset)? {
            let mut buffer_offset = 0usize;
            while let Some(record) = self.deserialize_at(buffer_offset) {
                match record.payload {
                    LogPayload::Commit | LogPayload::Abort => {
                        self.active_txns.remove(&record.txn_id);
                    }
                    _ => {
                        self.active_txns.insert(record.txn_id, record.lsn);
                    }
                }

                self.redo_record(&record)?;

                self.lsn_mapping
                    .insert(record.lsn, read_offset + buffer_offset as u64);
                buffer_offset += record.size as usize;
            }
            if buffer_offset == 0 {
                // not even one record decodes: truncated tail
                warn!("log scan stops at offset {}", read_offset);
                break;
            }
            read_offset += buffer_offset as u64;
        }

        debug!(
            "redo complete, {} transaction(s) left to undo",
            self.active_txns.len()
        );
        Ok(())
    }

    fn redo_record(&mut self, record: &LogRecord) -> Result<(), RecoveryError> {
        match &record.payload {
            LogPayload::Insert { rid, tuple } => {
                let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
                let mut page = page_ptr.write();
                let redo = record.lsn > page.lsn();
                if redo {
                    let mut table_page = TablePage::new(&mut page.data);
                    table_page.insert_tuple(tuple, *rid)?;
                    page.set_lsn(record.lsn);
                }
                drop(page);
                self.buffer_pool.unpin_page(rid.page_id, redo)?;
            }
            LogPayload::Update {
                rid, new_tuple, ..
            } => {
                let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
                let mut page = page_ptr.write();
                let redo = record.lsn > page.lsn();
                if redo {
                    let mut table_page = TablePage::new(&mut page.data);
                    table_page.update_tuple(new_tuple, *rid)?;
                    page.set_lsn(record.lsn);
                }
                drop(page);
                self.buffer_pool.unpin_page(rid.page_id, redo)?;
            }
            LogPayload::MarkDelete { rid, .. } => {
                let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
                let mut page = page_ptr.write();
                let redo = record.lsn > page.lsn();
                if redo {
                    let mut table_page = TablePage::new(&mut page.data);
                    table_page.mark_delete(*rid)?;
                    page.set_lsn(record.lsn);
                }
                drop(page);
                self.buffer_pool.unpin_page(rid.page_id, redo)?;
            }
            LogPayload::ApplyDelete { rid, .. } => {
                let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
                let mut page = page_ptr.write();
                let redo = record.lsn > page.lsn();
                if redo {
                    let mut table_page = TablePage::new(&mut page.data);
                    table_page.apply_delete(*rid)?;
                    page.set_lsn(record.lsn);
                }
                drop(page);
                self.buffer_pool.unpin_page(rid.page_id, redo)?;
            }
            LogPayload::RollbackDelete { rid, .. } => {
                let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
                let mut page = page_ptr.write();
                let redo = record.lsn > page.lsn();
                if redo {
                    let mut table_page = TablePage::new(&mut page.data);
                    table_page.rollback_delete(*rid)?;
                    page.set_lsn(record.lsn);
                }
                drop(page);
                self.buffer_pool.unpin_page(rid.page_id, redo)?;
            }
            LogPayload::NewPage { prev_page_id } => {
                let (page_ptr, new_page_id) = self.buffer_pool.new_page()?;
                {
                    let mut page = page_ptr.write();
                    let mut table_page = TablePage::new(&mut page.data);
                    table_page.init(new_page_id, *prev_page_id);
                    page.set_lsn(record.lsn);
                }
                if *prev_page_id != INVALID_PAGE_ID {
                    let prev_ptr = self.buffer_pool.fetch_page(*prev_page_id)?;
                    let mut prev = prev_ptr.write();
                    let mut prev_table = TablePage::new(&mut prev.data);
                    let link = prev_table.next_page_id() == INVALID_PAGE_ID;
                    if link {
                        prev_table.set_next_page_id(new_page_id);
                    }
                    drop(prev);
                    self.buffer_pool.unpin_page(*prev_page_id, link)?;
                }
                self.buffer_pool.unpin_page(new_page_id, true)?;
            }
            LogPayload::Begin | LogPayload::Commit | LogPayload::Abort => {}
        }
        Ok(())
    }

    /// Backward pass: walk each loser transaction's `prev_lsn` chain from
    /// its last record to its BEGIN, applying the inverse operation.
    /// Undo writes no log records of its own.
    pub fn undo(&mut self) -> Result<(), RecoveryError> {
        let losers: Vec<(TxnId, Lsn)> =
            self.active_txns.iter().map(|(t, l)| (*t, *l)).collect();

        for (txn_id, last_lsn) in losers {
            debug!("rolling back transaction {} from lsn {}", txn_id, last_lsn);
            let mut lsn = last_lsn;
            loop {
                let offset = *self
                    .lsn_mapping
                    .get(&lsn)
                    .ok_or(RecoveryError::MissingLsn(lsn))?;
                if !self.disk_manager.read_log(&mut self.log_buffer, offset)? {
                    return Err(RecoveryError::MissingLsn(lsn));
                }
                let record = self
                    .deserialize_at(0)
                    .ok_or(RecoveryError::MissingLsn(lsn))?;

                match &record.payload {
                    LogPayload::Begin => break,
                    LogPayload::Insert { rid, .. } => {
                        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
                        {
                            let mut page = page_ptr.write();
                            let mut table_page = TablePage::new(&mut page.data);
                            table_page.apply_delete(*rid)?;
                        }
                        self.buffer_pool.unpin_page(rid.page_id, true)?;
                    }
                    LogPayload::Update { rid, old_tuple, .. } => {
                        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
                        {
                            let mut page = page_ptr.write();
                            let mut table_page = TablePage::new(&mut page.data);
                            table_page.update_tuple(old_tuple, *rid)?;
                        }
                        self.buffer_pool.unpin_page(rid.page_id, true)?;
                    }
                    LogPayload::ApplyDelete { rid, tuple } => {
                        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
                        {
                            let mut page = page_ptr.write();
                            let mut table_page = TablePage::new(&mut page.data);
                            table_page.insert_tuple(tuple, *rid)?;
                        }
                        self.buffer_pool.unpin_page(rid.page_id, true)?;
                    }
                    LogPayload::MarkDelete { rid, .. } => {
                        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
                        {
                            let mut page = page_ptr.write();
                            let mut table_page = TablePage::new(&mut page.data);
                            table_page.rollback_delete(*rid)?;
                        }
                        self.buffer_pool.unpin_page(rid.page_id, true)?;
                    }
                    LogPayload::RollbackDelete { rid, .. } => {
                        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
                        {
                            let mut page = page_ptr.write();
                            let mut table_page = TablePage::new(&mut page.data);
                            table_page.mark_delete(*rid)?;
                        }
                        self.buffer_pool.unpin_page(rid.page_id, true)?;
                    }
                    // page allocation is not rolled back; the page just
                    // stays unreferenced
                    LogPayload::NewPage { .. } => {}
                    LogPayload::Commit | LogPayload::Abort => break,
                }

                if record.prev_lsn < 0 {
                    break;
                }
                lsn = record.prev_lsn;
            }
        }

        self.active_txns.clear();
        self.lsn_mapping.clear();
        Ok(())
    }
}
