use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{PageId, PAGE_SIZE};

/// The header page (page id 0) stores a table of (index name, root page
/// id) records so indexes can find their root across restarts.
///
/// Layout: | RecordCount (4) | records... |, each record packed as a
/// 4-byte name length, the name bytes, and a 4-byte root page id.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

const RECORDS_OFFSET: usize = 4;
const MAX_NAME_LEN: usize = 64;

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
    }

    pub fn record_count(&self) -> usize {
        LittleEndian::read_u32(&self.data[0..4]) as usize
    }

    fn set_record_count(&mut self, count: usize) {
        LittleEndian::write_u32(&mut self.data[0..4], count as u32);
    }

    fn record_len(&self, offset: usize) -> usize {
        let name_len = LittleEndian::read_u32(&self.data[offset..offset + 4]) as usize;
        4 + name_len + 4
    }

    /// Byte offset of the record for `name`, or of the free space after
    /// the last record when absent.
    fn locate(&self, name: &str) -> (usize, bool) {
        let mut offset = RECORDS_OFFSET;
        for _ in 0..self.record_count() {
            let name_len = LittleEndian::read_u32(&self.data[offset..offset + 4]) as usize;
            if &self.data[offset + 4..offset + 4 + name_len] == name.as_bytes() {
                return (offset, true);
            }
            offset += 4 + name_len + 4;
        }
        (offset, false)
    }

    fn write_record(&mut self, offset: usize, name: &str, root_page_id: PageId) {
        LittleEndian::write_u32(&mut self.data[offset..offset + 4], name.len() as u32);
        self.data[offset + 4..offset + 4 + name.len()].copy_from_slice(name.as_bytes());
        let root_offset = offset + 4 + name.len();
        LittleEndian::write_i32(&mut self.data[root_offset..root_offset + 4], root_page_id);
    }

    /// Register a new index. Fails when the name is taken, too long, or
    /// the page is full.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return false;
        }
        let (offset, found) = self.locate(name);
        if found || offset + 4 + name.len() + 4 > PAGE_SIZE {
            return false;
        }
        self.write_record(offset, name, root_page_id);
        self.set_record_count(self.record_count() + 1);
        true
    }

    /// Re-point an existing index at a new root.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        let (offset, found) = self.locate(name);
        if !found {
            return false;
        }
        let root_offset = offset + 4 + name.len();
        LittleEndian::write_i32(&mut self.data[root_offset..root_offset + 4], root_page_id);
        true
    }

    /// Drop an index record, compacting the ones after it.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let (offset, found) = self.locate(name);
        if !found {
            return false;
        }
        let len = self.record_len(offset);
        let mut end = RECORDS_OFFSET;
        for _ in 0..self.record_count() {
            end += self.record_len(end);
        }
        self.data.copy_within(offset + len..end, offset);
        self.data[end - len..end].fill(0);
        self.set_record_count(self.record_count() - 1);
        true
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let (offset, found) = self.locate(name);
        if !found {
            return None;
        }
        let root_offset = offset + 4 + name.len();
        Some(LittleEndian::read_i32(&self.data[root_offset..root_offset + 4]))
    }
}
