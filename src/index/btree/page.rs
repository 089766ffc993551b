use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Lsn, PageId};

/// Header shared by internal and leaf tree pages (six little-endian
/// i32 fields):
/// | PageType (4) | LSN (4) | CurrentSize (4) | MaxSize (4) |
/// | ParentPageId (4) | PageId (4) |
pub const TREE_PAGE_HEADER_SIZE: usize = 24;

pub const PAGE_TYPE_LEAF: i32 = 1;
pub const PAGE_TYPE_INTERNAL: i32 = 2;

const OFFSET_PAGE_TYPE: usize = 0;
const OFFSET_LSN: usize = 4;
const OFFSET_SIZE: usize = 8;
const OFFSET_MAX_SIZE: usize = 12;
const OFFSET_PARENT: usize = 16;
const OFFSET_PAGE_ID: usize = 20;

pub fn page_type(data: &[u8]) -> i32 {
    LittleEndian::read_i32(&data[OFFSET_PAGE_TYPE..OFFSET_PAGE_TYPE + 4])
}

pub fn set_page_type(data: &mut [u8], page_type: i32) {
    LittleEndian::write_i32(&mut data[OFFSET_PAGE_TYPE..OFFSET_PAGE_TYPE + 4], page_type);
}

pub fn is_leaf(data: &[u8]) -> bool {
    page_type(data) == PAGE_TYPE_LEAF
}

pub fn lsn(data: &[u8]) -> Lsn {
    LittleEndian::read_i32(&data[OFFSET_LSN..OFFSET_LSN + 4])
}

pub fn set_lsn(data: &mut [u8], lsn: Lsn) {
    LittleEndian::write_i32(&mut data[OFFSET_LSN..OFFSET_LSN + 4], lsn);
}

pub fn size(data: &[u8]) -> usize {
    LittleEndian::read_i32(&data[OFFSET_SIZE..OFFSET_SIZE + 4]) as usize
}

pub fn set_size(data: &mut [u8], size: usize) {
    LittleEndian::write_i32(&mut data[OFFSET_SIZE..OFFSET_SIZE + 4], size as i32);
}

pub fn max_size(data: &[u8]) -> usize {
    LittleEndian::read_i32(&data[OFFSET_MAX_SIZE..OFFSET_MAX_SIZE + 4]) as usize
}

pub fn set_max_size(data: &mut [u8], max_size: usize) {
    LittleEndian::write_i32(&mut data[OFFSET_MAX_SIZE..OFFSET_MAX_SIZE + 4], max_size as i32);
}

pub fn parent_page_id(data: &[u8]) -> PageId {
    LittleEndian::read_i32(&data[OFFSET_PARENT..OFFSET_PARENT + 4])
}

pub fn set_parent_page_id(data: &mut [u8], parent: PageId) {
    LittleEndian::write_i32(&mut data[OFFSET_PARENT..OFFSET_PARENT + 4], parent);
}

pub fn page_id(data: &[u8]) -> PageId {
    LittleEndian::read_i32(&data[OFFSET_PAGE_ID..OFFSET_PAGE_ID + 4])
}

pub fn set_page_id(data: &mut [u8], page_id: PageId) {
    LittleEndian::write_i32(&mut data[OFFSET_PAGE_ID..OFFSET_PAGE_ID + 4], page_id);
}
