use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::page::Page;

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager handles the actual disk I/O: fixed-size page reads and
/// writes against the database file, and byte-granularity append/read
/// against the companion write-ahead log file.
pub struct DiskManager {
    db_file: Mutex<File>,
    log_file: Mutex<File>,
    log_path: PathBuf,
    next_page_id: AtomicI32,
}

impl DiskManager {
    /// Open (or create) the database file at `db_path` and its companion
    /// log file at `<db_path>.log`.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let db_path = db_path.as_ref();
        let db_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        let mut log_path = db_path.as_os_str().to_owned();
        log_path.push(".log");
        let log_path = PathBuf::from(log_path);
        let log_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&log_path)?;

        // Resume page-id allocation after the highest page already on
        // disk; id 0 is reserved for the header page
        let file_size = db_file.metadata()?.len();
        let next_page_id = ((file_size as usize / PAGE_SIZE) as PageId).max(1);

        Ok(Self {
            db_file: Mutex::new(db_file),
            log_file: Mutex::new(log_file),
            log_path,
            next_page_id: AtomicI32::new(next_page_id),
        })
    }

    /// Read a page from disk into `page`. A page past the end of the file
    /// comes back zero-filled, as a freshly allocated page would.
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        if page_id == INVALID_PAGE_ID || page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();
        let file_size = file.metadata()?.len();

        page.page_id = page_id;
        if offset >= file_size {
            page.data.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut page.data)?;
        Ok(())
    }

    /// Write a page to disk at the slot determined by its page id.
    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        if page.page_id == INVALID_PAGE_ID || page.page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page.page_id));
        }

        let offset = page.page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;
        file.flush()?;
        Ok(())
    }

    /// Allocate a fresh page id.
    pub fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Release a page id. Ids are not recycled; the slot simply becomes
    /// garbage until the file is compacted offline.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    /// Append raw bytes to the write-ahead log and sync them to disk.
    pub fn write_log(&self, data: &[u8]) -> Result<(), DiskManagerError> {
        if data.is_empty() {
            return Ok(());
        }
        let mut file = self.log_file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        file.sync_data()?;
        Ok(())
    }

    /// Read up to `buf.len()` bytes of the log starting at `offset`.
    /// Returns false once `offset` is at or past the end of the log; a
    /// short tail is zero-padded.
    pub fn read_log(&self, buf: &mut [u8], offset: u64) -> Result<bool, DiskManagerError> {
        let mut file = self.log_file.lock();
        let file_size = file.metadata()?.len();
        if offset >= file_size {
            return Ok(false);
        }

        file.seek(SeekFrom::Start(offset))?;
        let available = ((file_size - offset) as usize).min(buf.len());
        file.read_exact(&mut buf[..available])?;
        buf[available..].fill(0);
        Ok(true)
    }

    /// Current size of the log file in bytes.
    pub fn log_size(&self) -> Result<u64, DiskManagerError> {
        Ok(self.log_file.lock().metadata()?.len())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}
