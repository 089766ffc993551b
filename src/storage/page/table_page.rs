use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::common::types::{Lsn, PageId, Rid, SlotId, PAGE_SIZE};
use crate::storage::tuple::Tuple;

/// Slotted page holding tuples, the unit recovery and rollback operate on.
///
/// Header layout (24 bytes, little-endian):
/// | PageId (4) | LSN (4) | PrevPageId (4) | NextPageId (4) |
/// | FreeSpacePointer (4) | SlotCount (4) |
///
/// The slot directory of (offset, size) pairs grows forward from the
/// header; tuple bytes grow backward from the end of the page. A set high
/// bit in a slot's size field marks the tuple as deleted but not yet
/// physically removed.
pub struct TablePage<'a> {
    data: &'a mut [u8],
}

const HEADER_SIZE: usize = 24;
const SLOT_SIZE: usize = 8;

const OFFSET_PAGE_ID: usize = 0;
const OFFSET_LSN: usize = 4;
const OFFSET_PREV_PAGE_ID: usize = 8;
const OFFSET_NEXT_PAGE_ID: usize = 12;
const OFFSET_FREE_SPACE: usize = 16;
const OFFSET_SLOT_COUNT: usize = 20;

const DELETE_MASK: u32 = 1 << 31;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TablePageError {
    #[error("slot {0} does not exist")]
    InvalidSlot(SlotId),

    #[error("slot {0} is empty")]
    EmptySlot(SlotId),

    #[error("slot {0} is already occupied")]
    OccupiedSlot(SlotId),

    #[error("tuple at slot {0} is marked deleted")]
    TupleDeleted(SlotId),

    #[error("tuple at slot {0} is not marked deleted")]
    TupleNotDeleted(SlotId),

    #[error("not enough free space for a {0} byte tuple")]
    InsufficientSpace(usize),
}

impl<'a> TablePage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, page_id: PageId, prev_page_id: PageId) {
        self.data.fill(0);
        self.set_page_id(page_id);
        self.set_prev_page_id(prev_page_id);
        self.set_next_page_id(crate::common::types::INVALID_PAGE_ID);
        self.set_free_space_pointer(PAGE_SIZE as u32);
        self.set_slot_count(0);
    }

    pub fn page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data[OFFSET_PAGE_ID..OFFSET_PAGE_ID + 4])
    }

    fn set_page_id(&mut self, page_id: PageId) {
        LittleEndian::write_i32(&mut self.data[OFFSET_PAGE_ID..OFFSET_PAGE_ID + 4], page_id);
    }

    pub fn lsn(&self) -> Lsn {
        LittleEndian::read_i32(&self.data[OFFSET_LSN..OFFSET_LSN + 4])
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        LittleEndian::write_i32(&mut self.data[OFFSET_LSN..OFFSET_LSN + 4], lsn);
    }

    pub fn prev_page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data[OFFSET_PREV_PAGE_ID..OFFSET_PREV_PAGE_ID + 4])
    }

    pub fn set_prev_page_id(&mut self, page_id: PageId) {
        LittleEndian::write_i32(
            &mut self.data[OFFSET_PREV_PAGE_ID..OFFSET_PREV_PAGE_ID + 4],
            page_id,
        );
    }

    pub fn next_page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data[OFFSET_NEXT_PAGE_ID..OFFSET_NEXT_PAGE_ID + 4])
    }

    pub fn set_next_page_id(&mut self, page_id: PageId) {
        LittleEndian::write_i32(
            &mut self.data[OFFSET_NEXT_PAGE_ID..OFFSET_NEXT_PAGE_ID + 4],
            page_id,
        );
    }

    fn free_space_pointer(&self) -> u32 {
        LittleEndian::read_u32(&self.data[OFFSET_FREE_SPACE..OFFSET_FREE_SPACE + 4])
    }

    fn set_free_space_pointer(&mut self, ptr: u32) {
        LittleEndian::write_u32(&mut self.data[OFFSET_FREE_SPACE..OFFSET_FREE_SPACE + 4], ptr);
    }

    pub fn slot_count(&self) -> u32 {
        LittleEndian::read_u32(&self.data[OFFSET_SLOT_COUNT..OFFSET_SLOT_COUNT + 4])
    }

    fn set_slot_count(&mut self, count: u32) {
        LittleEndian::write_u32(&mut self.data[OFFSET_SLOT_COUNT..OFFSET_SLOT_COUNT + 4], count);
    }

    fn slot(&self, slot: SlotId) -> (u32, u32) {
        let base = HEADER_SIZE + slot as usize * SLOT_SIZE;
        let offset = LittleEndian::read_u32(&self.data[base..base + 4]);
        let size = LittleEndian::read_u32(&self.data[base + 4..base + 8]);
        (offset, size)
    }

    fn set_slot(&mut self, slot: SlotId, offset: u32, size: u32) {
        let base = HEADER_SIZE + slot as usize * SLOT_SIZE;
        LittleEndian::write_u32(&mut self.data[base..base + 4], offset);
        LittleEndian::write_u32(&mut self.data[base + 4..base + 8], size);
    }

    fn free_space(&self) -> usize {
        self.free_space_pointer() as usize - HEADER_SIZE - self.slot_count() as usize * SLOT_SIZE
    }

    /// Place `tuple` at the exact slot named by `rid`, extending the slot
    /// directory when needed. Recovery replays inserts at recorded rids,
    /// so the slot is caller-chosen rather than allocated here.
    pub fn insert_tuple(&mut self, tuple: &Tuple, rid: Rid) -> Result<(), TablePageError> {
        let slot = rid.slot;
        let count = self.slot_count();

        let mut needed = tuple.len();
        if slot >= count {
            needed += (slot as usize - count as usize + 1) * SLOT_SIZE;
        } else {
            let (_, size) = self.slot(slot);
            if size != 0 {
                return Err(TablePageError::OccupiedSlot(slot));
            }
        }
        if self.free_space() < needed {
            return Err(TablePageError::InsufficientSpace(tuple.len()));
        }

        if slot >= count {
            // intervening slots stay zeroed, i.e. empty
            self.set_slot_count(slot + 1);
        }

        let ptr = self.free_space_pointer() - tuple.len() as u32;
        self.data[ptr as usize..ptr as usize + tuple.len()].copy_from_slice(tuple.data());
        self.set_free_space_pointer(ptr);
        self.set_slot(slot, ptr, tuple.len() as u32);
        Ok(())
    }

    /// Tombstone the tuple; the bytes stay in place until `apply_delete`.
    pub fn mark_delete(&mut self, rid: Rid) -> Result<(), TablePageError> {
        let (offset, size) = self.checked_slot(rid.slot)?;
        if size & DELETE_MASK != 0 {
            return Err(TablePageError::TupleDeleted(rid.slot));
        }
        self.set_slot(rid.slot, offset, size | DELETE_MASK);
        Ok(())
    }

    /// Undo a `mark_delete`.
    pub fn rollback_delete(&mut self, rid: Rid) -> Result<(), TablePageError> {
        let (offset, size) = self.checked_slot(rid.slot)?;
        if size & DELETE_MASK == 0 {
            return Err(TablePageError::TupleNotDeleted(rid.slot));
        }
        self.set_slot(rid.slot, offset, size & !DELETE_MASK);
        Ok(())
    }

    /// Physically remove the tuple. The slot becomes empty and reusable;
    /// the freed bytes are reclaimed lazily.
    pub fn apply_delete(&mut self, rid: Rid) -> Result<Tuple, TablePageError> {
        let (offset, size) = self.checked_slot(rid.slot)?;
        let len = (size & !DELETE_MASK) as usize;
        let tuple = Tuple::from_bytes(&self.data[offset as usize..offset as usize + len]);
        self.set_slot(rid.slot, 0, 0);
        Ok(tuple)
    }

    /// Replace the tuple at `rid`, returning the old image. Growing
    /// updates relocate the payload into fresh free space.
    pub fn update_tuple(&mut self, new_tuple: &Tuple, rid: Rid) -> Result<Tuple, TablePageError> {
        let (offset, size) = self.checked_slot(rid.slot)?;
        if size & DELETE_MASK != 0 {
            return Err(TablePageError::TupleDeleted(rid.slot));
        }
        let old_len = size as usize;
        let old = Tuple::from_bytes(&self.data[offset as usize..offset as usize + old_len]);

        if new_tuple.len() <= old_len {
            let start = offset as usize;
            self.data[start..start + new_tuple.len()].copy_from_slice(new_tuple.data());
            self.set_slot(rid.slot, offset, new_tuple.len() as u32);
        } else {
            if self.free_space() < new_tuple.len() {
                return Err(TablePageError::InsufficientSpace(new_tuple.len()));
            }
            let ptr = self.free_space_pointer() - new_tuple.len() as u32;
            self.data[ptr as usize..ptr as usize + new_tuple.len()]
                .copy_from_slice(new_tuple.data());
            self.set_free_space_pointer(ptr);
            self.set_slot(rid.slot, ptr, new_tuple.len() as u32);
        }
        Ok(old)
    }

    /// Fetch the live tuple at `rid`.
    pub fn get_tuple(&self, rid: Rid) -> Result<Tuple, TablePageError> {
        let (offset, size) = self.checked_slot(rid.slot)?;
        if size & DELETE_MASK != 0 {
            return Err(TablePageError::TupleDeleted(rid.slot));
        }
        Ok(Tuple::from_bytes(
            &self.data[offset as usize..offset as usize + size as usize],
        ))
    }

    fn checked_slot(&self, slot: SlotId) -> Result<(u32, u32), TablePageError> {
        if slot >= self.slot_count() {
            return Err(TablePageError::InvalidSlot(slot));
        }
        let (offset, size) = self.slot(slot);
        if size == 0 {
            return Err(TablePageError::EmptySlot(slot));
        }
        Ok((offset, size))
    }
}
