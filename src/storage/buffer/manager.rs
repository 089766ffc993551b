use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::{Mutex, RwLock};

use crate::common::types::{FrameId, PageId, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::extendible_hash::ExtendibleHashTable;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;
use crate::storage::page::{Frame, FramePtr, Page, PagePtr};
use crate::transaction::wal::LogManager;

const PAGE_TABLE_BUCKET_SIZE: usize = 32;

/// Buffer pool: a fixed array of frames fronted by an extendible-hash
/// page directory and an LRU replacer.
///
/// Pin discipline: `fetch_page`/`new_page` pin, `unpin_page` unpins; a
/// frame enters the replacer only while its pin count is zero. Before a
/// dirty page whose LSN exceeds the persistent LSN reaches disk, the log
/// is flushed first.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<FramePtr>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    free_list: Mutex<VecDeque<FrameId>>,
    replacer: LruReplacer<FrameId>,
    disk_manager: Arc<DiskManager>,
    log_manager: Option<Arc<LogManager>>,
    // serializes page-table / free-list / victim decisions
    latch: Mutex<()>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::build(pool_size, disk_manager, None)
    }

    pub fn with_log_manager(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Arc<LogManager>,
    ) -> Self {
        Self::build(pool_size, disk_manager, Some(log_manager))
    }

    fn build(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            let page = Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID)));
            frames.push(Arc::new(RwLock::new(Frame::new(frame_id, page))));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            frames,
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            free_list: Mutex::new(free_list),
            replacer: LruReplacer::new(),
            disk_manager,
            log_manager,
            latch: Mutex::new(()),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Fetch a page, reading it from disk when it is not resident. The
    /// page comes back pinned; callers must `unpin_page` when done.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID || page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let _guard = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id];
            let mut frame_guard = frame.write();
            frame_guard.pin_count += 1;
            self.replacer.erase(&frame_id);
            return Ok(frame_guard.page.clone());
        }

        let frame_id = self.allocate_frame()?;
        let frame = &self.frames[frame_id];
        let mut frame_guard = frame.write();
        {
            let mut page_guard = frame_guard.page.write();
            self.disk_manager.read_page(page_id, &mut page_guard)?;
        }
        frame_guard.pin_count = 1;
        frame_guard.is_dirty = false;

        self.page_table.insert(page_id, frame_id);
        Ok(frame_guard.page.clone())
    }

    /// Allocate a brand new page, pinned and zero-filled.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let _guard = self.latch.lock();

        let frame_id = self.allocate_frame()?;
        let page_id = self.disk_manager.allocate_page();

        let frame = &self.frames[frame_id];
        let mut frame_guard = frame.write();
        {
            let mut page_guard = frame_guard.page.write();
            *page_guard = Page::new(page_id);
        }
        frame_guard.pin_count = 1;
        frame_guard.is_dirty = true;

        self.page_table.insert(page_id, frame_id);
        trace!("allocated page {} in frame {}", page_id, frame_id);
        Ok((frame_guard.page.clone(), page_id))
    }

    /// Drop one pin on the page, optionally marking it dirty. A frame
    /// whose pin count reaches zero becomes eligible for eviction.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let _guard = self.latch.lock();

        let frame_id = self
            .page_table
            .find(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &self.frames[frame_id];
        let mut frame_guard = frame.write();
        if frame_guard.pin_count > 0 {
            frame_guard.pin_count -= 1;
        }
        if is_dirty {
            frame_guard.is_dirty = true;
        }
        if frame_guard.pin_count == 0 {
            self.replacer.insert(frame_id);
        }
        Ok(())
    }

    /// Write the page to disk if dirty, honoring the WAL rule first.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let _guard = self.latch.lock();

        let frame_id = self
            .page_table
            .find(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &self.frames[frame_id];
        let mut frame_guard = frame.write();
        if frame_guard.is_dirty {
            self.write_back(&frame_guard.page)?;
            frame_guard.is_dirty = false;
        }
        Ok(())
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let _guard = self.latch.lock();

        for frame in &self.frames {
            let mut frame_guard = frame.write();
            if frame_guard.is_dirty {
                self.write_back(&frame_guard.page)?;
                frame_guard.is_dirty = false;
            }
        }
        Ok(())
    }

    /// Remove the page from the pool and release its id. Pinned pages
    /// cannot be deleted.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let _guard = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id];
            let mut frame_guard = frame.write();
            if frame_guard.pin_count > 0 {
                return Err(BufferPoolError::PagePinned(page_id));
            }

            self.page_table.remove(&page_id);
            {
                let mut page_guard = frame_guard.page.write();
                *page_guard = Page::new(INVALID_PAGE_ID);
            }
            frame_guard.is_dirty = false;

            self.replacer.erase(&frame_id);
            self.free_list.lock().push_back(frame_id);
        }

        self.disk_manager.deallocate_page(page_id);
        Ok(())
    }

    /// Pick a frame for reuse: the free list first, then an LRU victim
    /// whose current page is written back if dirty.
    fn allocate_frame(&self) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = self.free_list.lock().pop_front() {
            return Ok(frame_id);
        }

        let Some(victim_id) = self.replacer.victim() else {
            return Err(BufferPoolError::PoolExhausted);
        };

        let frame = &self.frames[victim_id];
        let mut frame_guard = frame.write();
        debug_assert_eq!(frame_guard.pin_count, 0);

        let old_page_id = frame_guard.page.read().page_id;
        if frame_guard.is_dirty {
            self.write_back(&frame_guard.page)?;
            frame_guard.is_dirty = false;
        }
        if old_page_id != INVALID_PAGE_ID {
            self.page_table.remove(&old_page_id);
            debug!("evicted page {} from frame {}", old_page_id, victim_id);
        }
        Ok(victim_id)
    }

    /// The write-ahead rule: the log covering the page's last change must
    /// be durable before the page itself is.
    fn write_back(&self, page: &PagePtr) -> Result<(), BufferPoolError> {
        let page_guard = page.read();
        if let Some(log_manager) = &self.log_manager {
            if log_manager.is_enabled() && page_guard.lsn() > log_manager.persistent_lsn() {
                log_manager.force_flush_and_wait();
            }
        }
        self.disk_manager.write_page(&page_guard)?;
        Ok(())
    }
}
