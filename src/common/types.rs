use std::time::Duration;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Size of the in-memory log buffer in bytes
pub const LOG_BUFFER_SIZE: usize = (1 + PAGE_SIZE) * 32;

/// How long the background flush thread sleeps between group flushes
pub const LOG_TIMEOUT: Duration = Duration::from_secs(1);

/// Page ID type; pages are addressed by signed 32-bit ids
pub type PageId = i32;

/// Frame ID type; index into the buffer pool's frame array
pub type FrameId = usize;

/// Transaction ID type; lower id means older transaction
pub type TxnId = u32;

/// Slot index within a page
pub type SlotId = u32;

/// LSN (Log Sequence Number) type
pub type Lsn = i32;

pub const INVALID_PAGE_ID: PageId = -1;
pub const HEADER_PAGE_ID: PageId = 0;
pub const INVALID_LSN: Lsn = -1;
pub const INVALID_TXN_ID: TxnId = u32::MAX;

/// Record ID: physical address of a tuple as (page, slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: SlotId,
}

impl Rid {
    pub const SERIALIZED_SIZE: usize = 8;

    pub fn new(page_id: PageId, slot: SlotId) -> Self {
        Self { page_id, slot }
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        use byteorder::{ByteOrder, LittleEndian};
        LittleEndian::write_i32(&mut buf[0..4], self.page_id);
        LittleEndian::write_u32(&mut buf[4..8], self.slot);
    }

    pub fn read_from(buf: &[u8]) -> Self {
        use byteorder::{ByteOrder, LittleEndian};
        Self {
            page_id: LittleEndian::read_i32(&buf[0..4]),
            slot: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}
