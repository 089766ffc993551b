mod table_page;
mod header_page;

pub use table_page::{TablePage, TablePageError};
pub use header_page::HeaderPage;

use std::sync::Arc;
use byteorder::{ByteOrder, LittleEndian};
use parking_lot::RwLock;

use crate::common::types::{Lsn, PageId, PAGE_SIZE};

/// Every page kind keeps its LSN in the same header slot so the buffer
/// pool can enforce the WAL rule without knowing the page layout.
pub const PAGE_LSN_OFFSET: usize = 4;

/// A fixed-size page image
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
        }
    }

    pub fn lsn(&self) -> Lsn {
        LittleEndian::read_i32(&self.data[PAGE_LSN_OFFSET..PAGE_LSN_OFFSET + 4])
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        LittleEndian::write_i32(&mut self.data[PAGE_LSN_OFFSET..PAGE_LSN_OFFSET + 4], lsn);
    }
}

/// Smart pointer to a page
pub type PagePtr = Arc<RwLock<Page>>;

/// Buffer pool frame: owns the page image plus replacement metadata.
/// Frames are created at pool init and recycled by the replacer.
pub struct Frame {
    pub page: PagePtr,
    pub frame_id: usize,
    pub pin_count: u32,
    pub is_dirty: bool,
}

impl Frame {
    pub fn new(frame_id: usize, page: PagePtr) -> Self {
        Self {
            page,
            frame_id,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

/// Smart pointer to a frame
pub type FramePtr = Arc<RwLock<Frame>>;
