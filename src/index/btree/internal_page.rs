use std::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{PageId, PAGE_SIZE};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use crate::index::btree::page::{self, TREE_PAGE_HEADER_SIZE};
use crate::storage::buffer::BufferPoolManager;

/// View over an internal tree page: a packed array of (key, child page
/// id) entries after the common header. The key in slot 0 is never read;
/// slot 0 carries only the leftmost child pointer.
pub struct InternalView<'a, K: IndexKey> {
    data: &'a mut [u8],
    _key: PhantomData<K>,
}

impl<'a, K: IndexKey> InternalView<'a, K> {
    const ENTRY_SIZE: usize = K::SIZE + 4;

    pub fn new(data: &'a mut [u8]) -> Self {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        Self {
            data,
            _key: PhantomData,
        }
    }

    /// Default capacity, leaving one slack slot for insert-then-split.
    pub fn default_max_size() -> usize {
        (PAGE_SIZE - TREE_PAGE_HEADER_SIZE) / Self::ENTRY_SIZE - 1
    }

    pub fn init(&mut self, page_id: PageId, parent_id: PageId) {
        self.data[..TREE_PAGE_HEADER_SIZE].fill(0);
        page::set_page_type(self.data, page::PAGE_TYPE_INTERNAL);
        page::set_page_id(self.data, page_id);
        page::set_parent_page_id(self.data, parent_id);
        page::set_size(self.data, 0);
        page::set_max_size(self.data, Self::default_max_size());
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
        (self.max_size() + 1) / 2
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

    fn key_offset(index: usize) -> usize {
        TREE_PAGE_HEADER_SIZE + index * Self::ENTRY_SIZE
    }

    fn value_offset(index: usize) -> usize {
        Self::key_offset(index) + K::SIZE
    }

    pub fn key_at(&self, index: usize) -> K {
        debug_assert!(index < self.size());
        K::read_from(&self.data[Self::key_offset(index)..])
    }

    pub fn set_key_at(&mut self, index: usize, key: &K) {
        debug_assert!(index < self.size());
        key.write_to(&mut self.data[Self::key_offset(index)..]);
    }

    pub fn value_at(&self, index: usize) -> PageId {
        debug_assert!(index < self.size());
        LittleEndian::read_i32(&self.data[Self::value_offset(index)..Self::value_offset(index) + 4])
    }

    fn set_value_at(&mut self, index: usize, value: PageId) {
        let offset = Self::value_offset(index);
        LittleEndian::write_i32(&mut self.data[offset..offset + 4], value);
    }

    /// Index of the entry whose child pointer equals `value`.
    pub fn value_index(&self, value: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == value)
    }

    /// Child whose key range contains `key`: binary search over the valid
    /// keys [1, size).
    pub fn lookup(&self, key: &K) -> PageId {
        debug_assert!(self.size() > 1);
        let mut start = 1;
        let mut end = self.size();
        while start < end {
            let mid = start + (end - start) / 2;
            if *key < self.key_at(mid) {
                end = mid;
            } else {
                start = mid + 1;
            }
        }
        self.value_at(start - 1)
    }

    /// Seed a brand-new root after the old root split: left child in
    /// slot 0, separator and right child in slot 1.
    pub fn populate_new_root(&mut self, left: PageId, key: &K, right: PageId) {
        debug_assert_eq!(self.size(), 0);
        self.set_size(2);
        self.set_value_at(0, left);
        self.set_key_at(1, key);
        self.set_value_at(1, right);
    }

    /// Insert (key, child) right after the entry pointing at `old_value`.
    /// Returns the new size.
    pub fn insert_node_after(&mut self, old_value: PageId, key: &K, new_value: PageId) -> usize {
        let index = self
            .value_index(old_value)
            .expect("split sibling must be present in its parent");
        let size = self.size();
        self.shift_right(index + 1, size);
        self.set_size(size + 1);
        self.set_key_at(index + 1, key);
        self.set_value_at(index + 1, new_value);
        self.size()
    }

    /// Drop the entry at `index`, keeping the array packed.
    pub fn remove(&mut self, index: usize) {
        let size = self.size();
        debug_assert!(index < size);
        self.shift_left(index + 1, size);
        self.set_size(size - 1);
    }

    /// Collapse a root down to its single child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        debug_assert_eq!(self.size(), 1);
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    /// Split: transfer the upper half (separator entry included) to the
    /// fresh `recipient`; the moved slot-0 key is what the caller
    /// promotes into the parent.
    pub fn move_half_to(
        &mut self,
        recipient: &mut InternalView<'_, K>,
        buffer_pool: &BufferPoolManager,
    ) -> Result<(), BTreeError> {
        debug_assert_eq!(self.size(), self.max_size() + 1);
        debug_assert_eq!(recipient.size(), 0);

        let size = self.size();
        let half = self.min_size();
        let moved = size - half;
        let src = Self::key_offset(half);
        let dst = Self::key_offset(0);
        recipient.data[dst..dst + moved * Self::ENTRY_SIZE]
            .copy_from_slice(&self.data[src..src + moved * Self::ENTRY_SIZE]);
        recipient.set_size(moved);
        self.set_size(half);

        recipient.adopt_children(0, moved, buffer_pool)
    }

    /// Merge: demote the parent's separator into slot 0, then append
    /// everything to `recipient` (the left sibling).
    pub fn move_all_to(
        &mut self,
        recipient: &mut InternalView<'_, K>,
        middle_key: &K,
        buffer_pool: &BufferPoolManager,
    ) -> Result<(), BTreeError> {
        let size = self.size();
        self.set_key_at(0, middle_key);

        let start = recipient.size();
        let src = Self::key_offset(0);
        let dst = Self::key_offset(start);
        recipient.data[dst..dst + size * Self::ENTRY_SIZE]
            .copy_from_slice(&self.data[src..src + size * Self::ENTRY_SIZE]);
        recipient.set_size(start + size);
        self.set_size(0);

        recipient.adopt_children(start, start + size, buffer_pool)
    }

    /// Rotation: first entry of this page moves to the end of the left
    /// sibling `recipient`, carrying the demoted `middle_key`. Returns
    /// the key to install as the new parent separator.
    pub fn move_first_to_end_of(
        &mut self,
        recipient: &mut InternalView<'_, K>,
        middle_key: &K,
        buffer_pool: &BufferPoolManager,
    ) -> Result<K, BTreeError> {
        debug_assert!(self.size() > self.min_size());

        let moved_child = self.value_at(0);
        let new_separator = self.key_at(1);

        let end = recipient.size();
        recipient.set_size(end + 1);
        recipient.set_key_at(end, middle_key);
        recipient.set_value_at(end, moved_child);

        let size = self.size();
        self.shift_left(1, size);
        self.set_size(size - 1);

        recipient.adopt_children(end, end + 1, buffer_pool)?;
        Ok(new_separator)
    }

    /// Rotation: last entry of this page moves to the front of the right
    /// sibling `recipient`; the demoted `middle_key` becomes the
    /// recipient's slot-1 key. Returns the new parent separator (the
    /// moved entry's key).
    pub fn move_last_to_front_of(
        &mut self,
        recipient: &mut InternalView<'_, K>,
        middle_key: &K,
        buffer_pool: &BufferPoolManager,
    ) -> Result<K, BTreeError> {
        debug_assert!(self.size() > self.min_size());

        let size = self.size();
        let moved_child = self.value_at(size - 1);
        let new_separator = self.key_at(size - 1);
        self.set_size(size - 1);

        let recipient_size = recipient.size();
        recipient.shift_right(0, recipient_size);
        recipient.set_size(recipient_size + 1);
        recipient.set_key_at(1, middle_key);
        recipient.set_value_at(0, moved_child);

        recipient.adopt_children(0, 1, buffer_pool)?;
        Ok(new_separator)
    }

    /// Point the children in entry range [start, end) back at this page.
    fn adopt_children(
        &self,
        start: usize,
        end: usize,
        buffer_pool: &BufferPoolManager,
    ) -> Result<(), BTreeError> {
        let page_id = self.page_id();
        for index in start..end {
            let child_id = self.value_at(index);
            let child_ptr = buffer_pool.fetch_page(child_id)?;
            {
                let mut child = child_ptr.write();
                page::set_parent_page_id(&mut child.data, page_id);
            }
            buffer_pool.unpin_page(child_id, true)?;
        }
        Ok(())
    }

    /// Move entries [from, end) one slot to the right.
    fn shift_right(&mut self, from: usize, end: usize) {
        let src = Self::key_offset(from);
        let len = (end - from) * Self::ENTRY_SIZE;
        self.data.copy_within(src..src + len, src + Self::ENTRY_SIZE);
    }

    /// Move entries [from, end) one slot to the left.
    fn shift_left(&mut self, from: usize, end: usize) {
        let src = Self::key_offset(from);
        let len = (end - from) * Self::ENTRY_SIZE;
        self.data.copy_within(src..src + len, src - Self::ENTRY_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(data: &mut [u8; PAGE_SIZE]) -> InternalView<'_, i64> {
        let mut node = InternalView::new(data);
        node.init(10, crate::common::types::INVALID_PAGE_ID);
        node
    }

    #[test]
    fn test_populate_and_lookup() {
        let mut data = [0u8; PAGE_SIZE];
        let mut node = view(&mut data);
        node.populate_new_root(100, &50, 200);
        assert_eq!(node.size(), 2);

        assert_eq!(node.lookup(&10), 100);
        assert_eq!(node.lookup(&50), 200);
        assert_eq!(node.lookup(&99), 200);
    }

    #[test]
    fn test_insert_node_after_keeps_order() {
        let mut data = [0u8; PAGE_SIZE];
        let mut node = view(&mut data);
        node.populate_new_root(100, &50, 200);

        // child 200 split, promoting 75 with new child 300
        let size = node.insert_node_after(200, &75, 300);
        assert_eq!(size, 3);
        assert_eq!(node.value_at(0), 100);
        assert_eq!(node.key_at(1), 50);
        assert_eq!(node.value_at(1), 200);
        assert_eq!(node.key_at(2), 75);
        assert_eq!(node.value_at(2), 300);

        assert_eq!(node.lookup(&60), 200);
        assert_eq!(node.lookup(&80), 300);
    }

    #[test]
    fn test_remove_and_only_child() {
        let mut data = [0u8; PAGE_SIZE];
        let mut node = view(&mut data);
        node.populate_new_root(100, &50, 200);
        node.remove(1);
        assert_eq!(node.size(), 1);
        assert_eq!(node.remove_and_return_only_child(), 100);
        assert_eq!(node.size(), 0);
    }

    #[test]
    fn test_value_index() {
        let mut data = [0u8; PAGE_SIZE];
        let mut node = view(&mut data);
        node.populate_new_root(100, &50, 200);
        assert_eq!(node.value_index(100), Some(0));
        assert_eq!(node.value_index(200), Some(1));
        assert_eq!(node.value_index(999), None);
    }
}
