use std::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID, PAGE_SIZE};
use crate::index::btree::key::IndexKey;
use crate::index::btree::page::{self, TREE_PAGE_HEADER_SIZE};

const NEXT_PAGE_ID_OFFSET: usize = TREE_PAGE_HEADER_SIZE;
const ENTRIES_OFFSET: usize = TREE_PAGE_HEADER_SIZE + 4;

/// View over a leaf tree page: the common header, the right-sibling
/// pointer, then a packed array of (key, rid) entries sorted by key.
/// Keys are unique.
pub struct LeafView<'a, K: IndexKey> {
    data: &'a mut [u8],
    _key: PhantomData<K>,
}

impl<'a, K: IndexKey> LeafView<'a, K> {
    const ENTRY_SIZE: usize = K::SIZE + Rid::SERIALIZED_SIZE;

    pub fn new(data: &'a mut [u8]) -> Self {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        Self {
            data,
            _key: PhantomData,
        }
    }

    /// Default capacity, leaving one slack slot for insert-then-split.
    pub fn default_max_size() -> usize {
        (PAGE_SIZE - ENTRIES_OFFSET) / Self::ENTRY_SIZE - 1
    }

    pub fn init(&mut self, page_id: PageId, parent_id: PageId) {
        self.data[..ENTRIES_OFFSET].fill(0);
        page::set_page_type(self.data, page::PAGE_TYPE_LEAF);
        page::set_page_id(self.data, page_id);
        page::set_parent_page_id(self.data, parent_id);
        page::set_size(self.data, 0);
        page::set_max_size(self.data, Self::default_max_size());
        self.set_next_page_id(INVALID_PAGE_ID);
    }

    pub fn size(&self) -> usize {
        page::size(self.data)
    }

    fn set_size(&mut self, size: usize) {
        page::set_size(self.data, size);
    }

    pub fn max_size(&self) -> usize {
        page::max_size(self.data)
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        page::set_max_size(self.data, max_size);
    }

    pub fn min_size(&self) -> usize {
        (self.max_size() + 2) / 2
    }

    pub fn page_id(&self) -> PageId {
        page::page_id(self.data)
    }

    pub fn parent_page_id(&self) -> PageId {
        page::parent_page_id(self.data)
    }

    pub fn set_parent_page_id(&mut self, parent: PageId) {
        page::set_parent_page_id(self.data, parent);
    }

    pub fn next_page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4])
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        LittleEndian::write_i32(&mut self.data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4], next);
    }

    fn entry_offset(index: usize) -> usize {
        ENTRIES_OFFSET + index * Self::ENTRY_SIZE
    }

    pub fn key_at(&self, index: usize) -> K {
        debug_assert!(index < self.size());
        K::read_from(&self.data[Self::entry_offset(index)..])
    }

    pub fn value_at(&self, index: usize) -> Rid {
        debug_assert!(index < self.size());
        Rid::read_from(&self.data[Self::entry_offset(index) + K::SIZE..])
    }

    pub fn item(&self, index: usize) -> (K, Rid) {
        (self.key_at(index), self.value_at(index))
    }

    fn set_item(&mut self, index: usize, key: &K, value: Rid) {
        let offset = Self::entry_offset(index);
        key.write_to(&mut self.data[offset..]);
        value.write_to(&mut self.data[offset + K::SIZE..]);
    }

    /// First index whose key is >= `key`; `size` when every key is
    /// smaller.
    pub fn key_index(&self, key: &K) -> usize {
        let mut start = 0;
        let mut end = self.size();
        while start < end {
            let mid = start + (end - start) / 2;
            if self.key_at(mid) < *key {
                start = mid + 1;
            } else {
                end = mid;
            }
        }
        start
    }

    /// Insert keeping the page sorted; duplicate keys are rejected.
    /// Returns the page size afterwards (unchanged on duplicate).
    pub fn insert(&mut self, key: &K, value: Rid) -> usize {
        let index = self.key_index(key);
        let size = self.size();
        if index < size && self.key_at(index) == *key {
            return size;
        }

        self.shift_right(index, size);
        self.set_size(size + 1);
        self.set_item(index, key, value);
        self.size()
    }

    pub fn lookup(&self, key: &K) -> Option<Rid> {
        let index = self.key_index(key);
        if index < self.size() && self.key_at(index) == *key {
            Some(self.value_at(index))
        } else {
            None
        }
    }

    /// Delete `key` if present, returning the page size afterwards.
    pub fn remove_and_delete_record(&mut self, key: &K) -> usize {
        let index = self.key_index(key);
        let size = self.size();
        if index < size && self.key_at(index) == *key {
            self.shift_left(index + 1, size);
            self.set_size(size - 1);
        }
        self.size()
    }

    /// Split: move the upper half to the fresh `recipient` and splice it
    /// into the sibling chain directly to the right of this page.
    pub fn move_half_to(&mut self, recipient: &mut LeafView<'_, K>) {
        debug_assert_eq!(self.size(), self.max_size() + 1);
        debug_assert_eq!(recipient.size(), 0);

        let size = self.size();
        let moved = self.min_size();
        let keep = size - moved;
        let src = Self::entry_offset(keep);
        let dst = Self::entry_offset(0);
        recipient.data[dst..dst + moved * Self::ENTRY_SIZE]
            .copy_from_slice(&self.data[src..src + moved * Self::ENTRY_SIZE]);
        recipient.set_size(moved);
        self.set_size(keep);

        recipient.set_next_page_id(self.next_page_id());
        self.set_next_page_id(recipient.page_id());
    }

    /// Merge: append everything to `recipient` (the left sibling), which
    /// takes over this page's right-sibling pointer.
    pub fn move_all_to(&mut self, recipient: &mut LeafView<'_, K>) {
        let size = self.size();
        let start = recipient.size();
        let src = Self::entry_offset(0);
        let dst = Self::entry_offset(start);
        recipient.data[dst..dst + size * Self::ENTRY_SIZE]
            .copy_from_slice(&self.data[src..src + size * Self::ENTRY_SIZE]);
        recipient.set_size(start + size);
        self.set_size(0);

        recipient.set_next_page_id(self.next_page_id());
    }

    /// Rotation: first entry of this page moves to the end of the left
    /// sibling `recipient`. Returns the new parent separator, this
    /// page's new first key.
    pub fn move_first_to_end_of(&mut self, recipient: &mut LeafView<'_, K>) -> K {
        debug_assert!(self.size() > self.min_size());

        let (key, value) = self.item(0);
        let end = recipient.size();
        recipient.set_size(end + 1);
        recipient.set_item(end, &key, value);

        let size = self.size();
        self.shift_left(1, size);
        self.set_size(size - 1);
        self.key_at(0)
    }

    /// Rotation: last entry of this page moves to the front of the right
    /// sibling `recipient`. Returns the new parent separator, the
    /// recipient's new first key.
    pub fn move_last_to_front_of(&mut self, recipient: &mut LeafView<'_, K>) -> K {
        debug_assert!(self.size() > self.min_size());

        let size = self.size();
        let (key, value) = self.item(size - 1);
        self.set_size(size - 1);

        let recipient_size = recipient.size();
        recipient.shift_right(0, recipient_size);
        recipient.set_size(recipient_size + 1);
        recipient.set_item(0, &key, value);
        key
    }

    fn shift_right(&mut self, from: usize, end: usize) {
        let src = Self::entry_offset(from);
        let len = (end - from) * Self::ENTRY_SIZE;
        self.data.copy_within(src..src + len, src + Self::ENTRY_SIZE);
    }

    fn shift_left(&mut self, from: usize, end: usize) {
        let src = Self::entry_offset(from);
        let len = (end - from) * Self::ENTRY_SIZE;
        self.data.copy_within(src..src + len, src - Self::ENTRY_SIZE);
    }
}
