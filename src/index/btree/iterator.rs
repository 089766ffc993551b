use std::marker::PhantomData;
use std::sync::Arc;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::index::btree::key::IndexKey;
use crate::index::btree::leaf_page::LeafView;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::PagePtr;

/// In-order cursor over the leaf chain. Keeps the current leaf pinned
/// and unpins it when crossing to the right sibling (or on drop). The
/// iterator ends once it steps past the last entry of the final leaf.
pub struct TreeIterator<K: IndexKey> {
    buffer_pool: Arc<BufferPoolManager>,
    page: Option<PagePtr>,
    page_id: PageId,
    offset: usize,
    _key: PhantomData<K>,
}

impl<K: IndexKey> TreeIterator<K> {
    pub(crate) fn new(
        buffer_pool: Arc<BufferPoolManager>,
        page: PagePtr,
        page_id: PageId,
        offset: usize,
    ) -> Self {
        Self {
            buffer_pool,
            page: Some(page),
            page_id,
            offset,
            _key: PhantomData,
        }
    }

    pub(crate) fn exhausted(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            page: None,
            page_id: INVALID_PAGE_ID,
            offset: 0,
            _key: PhantomData,
        }
    }
}

impl<K: IndexKey> Iterator for TreeIterator<K> {
    type Item = (K, Rid);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let page_ptr = self.page.as_ref()?.clone();

            let (item, next_page_id) = {
                let mut guard = page_ptr.write();
                let leaf = LeafView::<K>::new(&mut guard.data);
                if self.offset < leaf.size() {
                    (Some(leaf.item(self.offset)), INVALID_PAGE_ID)
                } else {
                    (None, leaf.next_page_id())
                }
            };

            if let Some(item) = item {
                self.offset += 1;
                return Some(item);
            }

            // end of this leaf: unpin it and cross to the right sibling
            self.page = None;
            let _ = self.buffer_pool.unpin_page(self.page_id, false);
            if next_page_id == INVALID_PAGE_ID {
                return None;
            }
            let next_ptr = self.buffer_pool.fetch_page(next_page_id).ok()?;
            self.page = Some(next_ptr);
            self.page_id = next_page_id;
            self.offset = 0;
        }
    }
}

impl<K: IndexKey> Drop for TreeIterator<K> {
    fn drop(&mut self) {
        if self.page.take().is_some() {
            let _ = self.buffer_pool.unpin_page(self.page_id, false);
        }
    }
}
