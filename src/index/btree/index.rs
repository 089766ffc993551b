use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::common::types::{PageId, Rid, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::internal_page::InternalView;
use crate::index::btree::iterator::TreeIterator;
use crate::index::btree::key::IndexKey;
use crate::index::btree::leaf_page::LeafView;
use crate::index::btree::page;
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::page::{HeaderPage, PagePtr};

/// Disk-oriented B+ tree index. All records live in sorted leaf pages
/// chained left to right; internal pages route by key range. The root
/// page id is persisted in the header page under the index name.
///
/// Structural operations serialize on a tree-wide latch (reads take it
/// shared); per-frame latching stays in the buffer pool underneath.
pub struct BPlusTree<K: IndexKey> {
    index_name: String,
    buffer_pool: Arc<BufferPoolManager>,
    root: RwLock<PageId>,
    leaf_max_size: Option<usize>,
    internal_max_size: Option<usize>,
    _key: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    pub fn new(index_name: &str, buffer_pool: Arc<BufferPoolManager>) -> Result<Self, BTreeError> {
        Self::build(index_name, buffer_pool, None, None)
    }

    /// Constructor with explicit page capacities, for exercising splits
    /// and merges on tiny trees.
    pub fn with_max_sizes(
        index_name: &str,
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        Self::build(
            index_name,
            buffer_pool,
            Some(leaf_max_size),
            Some(internal_max_size),
        )
    }

    fn build(
        index_name: &str,
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: Option<usize>,
        internal_max_size: Option<usize>,
    ) -> Result<Self, BTreeError> {
        let tree = Self {
            index_name: index_name.to_string(),
            buffer_pool,
            root: RwLock::new(INVALID_PAGE_ID),
            leaf_max_size,
            internal_max_size,
            _key: PhantomData,
        };

        // pick up a persisted root, or register the index
        let header_ptr = tree.buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let registered_root = {
            let mut guard = header_ptr.write();
            let mut header = HeaderPage::new(&mut guard.data);
            match header.get_root_id(index_name) {
                Some(root_id) => {
                    *tree.root.write() = root_id;
                    false
                }
                None => {
                    header.insert_record(index_name, INVALID_PAGE_ID);
                    true
                }
            }
        };
        tree.buffer_pool.unpin_page(HEADER_PAGE_ID, registered_root)?;

        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        *self.root.read() == INVALID_PAGE_ID
    }

    /// Point query: the value stored under `key`, if any.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>, BTreeError> {
        let root = self.root.read();
        if *root == INVALID_PAGE_ID {
            return Ok(None);
        }

        let (leaf_ptr, leaf_id) = self.find_leaf_page(*root, key, false)?;
        let result = {
            let mut guard = leaf_ptr.write();
            let leaf = LeafView::<K>::new(&mut guard.data);
            leaf.lookup(key)
        };
        self.buffer_pool.unpin_page(leaf_id, false)?;
        Ok(result)
    }

    /// Insert a unique key. Returns false when the key already exists.
    pub fn insert(&self, key: K, value: Rid) -> Result<bool, BTreeError> {
        let mut root = self.root.write();
        if *root == INVALID_PAGE_ID {
            self.start_new_tree(&mut root, &key, value)?;
            return Ok(true);
        }
        self.insert_into_leaf(&mut root, &key, value)
    }

    /// Delete `key` if present, rebalancing underflowing pages.
    pub fn remove(&self, key: &K) -> Result<(), BTreeError> {
        let mut root = self.root.write();
        if *root == INVALID_PAGE_ID {
            return Ok(());
        }

        let (leaf_ptr, leaf_id) = self.find_leaf_page(*root, key, false)?;
        let (removed, underflow) = {
            let mut guard = leaf_ptr.write();
            let mut leaf = LeafView::<K>::new(&mut guard.data);
            let old_size = leaf.size();
            let new_size = leaf.remove_and_delete_record(key);
            let removed = new_size != old_size;
            (removed, removed && new_size < leaf.min_size())
        };

        let mut delete_node = false;
        if underflow {
            delete_node = self.coalesce_or_redistribute(&mut root, leaf_id)?;
        }
        self.buffer_pool.unpin_page(leaf_id, removed)?;
        if delete_node {
            self.buffer_pool.delete_page(leaf_id)?;
        }
        Ok(())
    }

    /// Iterator over the whole tree in key order.
    pub fn iter(&self) -> Result<TreeIterator<K>, BTreeError> {
        let root = self.root.read();
        if *root == INVALID_PAGE_ID {
            return Ok(TreeIterator::exhausted(self.buffer_pool.clone()));
        }
        let (leaf_ptr, leaf_id) = self.find_leaf_page(*root, &K::default(), true)?;
        Ok(TreeIterator::new(self.buffer_pool.clone(), leaf_ptr, leaf_id, 0))
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn iter_from(&self, key: &K) -> Result<TreeIterator<K>, BTreeError> {
        let root = self.root.read();
        if *root == INVALID_PAGE_ID {
            return Ok(TreeIterator::exhausted(self.buffer_pool.clone()));
        }
        let (leaf_ptr, leaf_id) = self.find_leaf_page(*root, key, false)?;
        let offset = {
            let mut guard = leaf_ptr.write();
            let leaf = LeafView::<K>::new(&mut guard.data);
            leaf.key_index(key)
        };
        Ok(TreeIterator::new(
            self.buffer_pool.clone(),
            leaf_ptr,
            leaf_id,
            offset,
        ))
    }

    /// Descend from `root_id` to the leaf covering `key` (or the
    /// leftmost leaf). Interior pages are unpinned as soon as the next
    /// link is known; the returned leaf stays pinned.
    fn find_leaf_page(
        &self,
        root_id: PageId,
        key: &K,
        leftmost: bool,
    ) -> Result<(PagePtr, PageId), BTreeError> {
        let mut page_id = root_id;
        loop {
            let page_ptr = self.buffer_pool.fetch_page(page_id)?;
            let next = {
                let mut guard = page_ptr.write();
                if page::is_leaf(&guard.data) {
                    None
                } else {
                    let node = InternalView::<K>::new(&mut guard.data);
                    Some(if leftmost {
                        node.value_at(0)
                    } else {
                        node.lookup(key)
                    })
                }
            };
            match next {
                None => return Ok((page_ptr, page_id)),
                Some(child_id) => {
                    self.buffer_pool.unpin_page(page_id, false)?;
                    page_id = child_id;
                }
            }
        }
    }

    fn start_new_tree(&self, root: &mut PageId, key: &K, value: Rid) -> Result<(), BTreeError> {
        let (page_ptr, page_id) = self.allocate_page()?;
        {
            let mut guard = page_ptr.write();
            let mut leaf = LeafView::<K>::new(&mut guard.data);
            leaf.init(page_id, INVALID_PAGE_ID);
            if let Some(max) = self.leaf_max_size {
                leaf.set_max_size(max);
            }
            leaf.insert(key, value);
        }
        *root = page_id;
        self.update_root_page_id(*root)?;
        self.buffer_pool.unpin_page(page_id, true)?;
        debug!("index {} rooted at page {}", self.index_name, page_id);
        Ok(())
    }

    fn insert_into_leaf(
        &self,
        root: &mut PageId,
        key: &K,
        value: Rid,
    ) -> Result<bool, BTreeError> {
        let (leaf_ptr, leaf_id) = self.find_leaf_page(*root, key, false)?;

        let mut split: Option<(K, PageId)> = None;
        let inserted = {
            let mut guard = leaf_ptr.write();
            let mut leaf = LeafView::<K>::new(&mut guard.data);
            let old_size = leaf.size();
            let new_size = leaf.insert(key, value);
            let inserted = new_size != old_size;

            if new_size > leaf.max_size() {
                let (new_ptr, new_id) = self.allocate_page()?;
                let mut new_guard = new_ptr.write();
                let mut new_leaf = LeafView::<K>::new(&mut new_guard.data);
                new_leaf.init(new_id, leaf.parent_page_id());
                if let Some(max) = self.leaf_max_size {
                    new_leaf.set_max_size(max);
                }
                leaf.move_half_to(&mut new_leaf);
                split = Some((new_leaf.key_at(0), new_id));
            }
            inserted
        };

        let did_split = split.is_some();
        if let Some((split_key, new_id)) = split {
            self.insert_into_parent(root, leaf_id, &split_key, new_id)?;
            self.buffer_pool.unpin_page(new_id, true)?;
        }
        self.buffer_pool.unpin_page(leaf_id, inserted || did_split)?;
        Ok(inserted)
    }

    /// Hook `right_id` into the parent of `left_id` after a split,
    /// growing a new root or splitting the parent recursively as needed.
    fn insert_into_parent(
        &self,
        root: &mut PageId,
        left_id: PageId,
        key: &K,
        right_id: PageId,
    ) -> Result<(), BTreeError> {
        let parent_id = {
            let page_ptr = self.buffer_pool.fetch_page(left_id)?;
            let parent_id = page::parent_page_id(&page_ptr.read().data);
            self.buffer_pool.unpin_page(left_id, false)?;
            parent_id
        };

        if parent_id == INVALID_PAGE_ID {
            // the root itself split: grow the tree by one level
            let (root_ptr, new_root_id) = self.allocate_page()?;
            {
                let mut guard = root_ptr.write();
                let mut new_root = InternalView::<K>::new(&mut guard.data);
                new_root.init(new_root_id, INVALID_PAGE_ID);
                if let Some(max) = self.internal_max_size {
                    new_root.set_max_size(max);
                }
                new_root.populate_new_root(left_id, key, right_id);
            }
            for child_id in [left_id, right_id] {
                let child_ptr = self.buffer_pool.fetch_page(child_id)?;
                page::set_parent_page_id(&mut child_ptr.write().data, new_root_id);
                self.buffer_pool.unpin_page(child_id, true)?;
            }
            *root = new_root_id;
            self.update_root_page_id(*root)?;
            self.buffer_pool.unpin_page(new_root_id, true)?;
            return Ok(());
        }

        let parent_ptr = self.buffer_pool.fetch_page(parent_id)?;
        let mut split: Option<(K, PageId)> = None;
        {
            let mut guard = parent_ptr.write();
            let mut parent = InternalView::<K>::new(&mut guard.data);
            let new_size = parent.insert_node_after(left_id, key, right_id);

            if new_size > parent.max_size() {
                let (new_ptr, new_id) = self.allocate_page()?;
                let mut new_guard = new_ptr.write();
                let mut new_internal = InternalView::<K>::new(&mut new_guard.data);
                new_internal.init(new_id, parent.parent_page_id());
                if let Some(max) = self.internal_max_size {
                    new_internal.set_max_size(max);
                }
                parent.move_half_to(&mut new_internal, &self.buffer_pool)?;
                // the promoted slot-0 key routes into the new node
                split = Some((new_internal.key_at(0), new_id));
            }
        }

        if let Some((split_key, new_id)) = split {
            self.insert_into_parent(root, parent_id, &split_key, new_id)?;
            self.buffer_pool.unpin_page(new_id, true)?;
        }
        self.buffer_pool.unpin_page(parent_id, true)?;
        Ok(())
    }

    /// Rebalance an underflowing page against a sibling. Returns true
    /// when the page was emptied and the caller should delete it.
    fn coalesce_or_redistribute(
        &self,
        root: &mut PageId,
        node_id: PageId,
    ) -> Result<bool, BTreeError> {
        if *root == node_id {
            return self.adjust_root(root, node_id);
        }

        let node_ptr = self.buffer_pool.fetch_page(node_id)?;
        let (node_is_leaf, node_size, node_max, parent_id) = {
            let guard = node_ptr.read();
            (
                page::is_leaf(&guard.data),
                page::size(&guard.data),
                page::max_size(&guard.data),
                page::parent_page_id(&guard.data),
            )
        };

        let parent_ptr = self.buffer_pool.fetch_page(parent_id)?;
        let (node_index, sibling_id) = {
            let mut guard = parent_ptr.write();
            let parent = InternalView::<K>::new(&mut guard.data);
            let node_index = parent.value_index(node_id).ok_or_else(|| {
                BTreeError::Corrupt(format!("page {} missing from parent {}", node_id, parent_id))
            })?;
            // prefer the left sibling; only the leftmost child looks right
            let sibling_index = if node_index == 0 { 1 } else { node_index - 1 };
            (node_index, parent.value_at(sibling_index))
        };

        let sibling_ptr = self.buffer_pool.fetch_page(sibling_id)?;
        let sibling_size = page::size(&sibling_ptr.read().data);

        // merge only when both pages fit in one; otherwise rotate
        let coalesce = node_size + sibling_size <= node_max;

        if coalesce {
            // entries always flow right → left; leftmost child swaps roles
            let (left_ptr, right_ptr, separator_index) = if node_index == 0 {
                (&node_ptr, &sibling_ptr, 1)
            } else {
                (&sibling_ptr, &node_ptr, node_index)
            };

            let parent_underflow = {
                let mut parent_guard = parent_ptr.write();
                let mut parent = InternalView::<K>::new(&mut parent_guard.data);
                let middle_key = parent.key_at(separator_index);

                let mut left_guard = left_ptr.write();
                let mut right_guard = right_ptr.write();
                if node_is_leaf {
                    let mut left = LeafView::<K>::new(&mut left_guard.data);
                    let mut right = LeafView::<K>::new(&mut right_guard.data);
                    right.move_all_to(&mut left);
                } else {
                    let mut left = InternalView::<K>::new(&mut left_guard.data);
                    let mut right = InternalView::<K>::new(&mut right_guard.data);
                    right.move_all_to(&mut left, &middle_key, &self.buffer_pool)?;
                }
                parent.remove(separator_index);
                parent.size() < parent.min_size()
            };

            self.buffer_pool.unpin_page(node_id, true)?;
            self.buffer_pool.unpin_page(sibling_id, true)?;
            if node_index == 0 {
                // roles were swapped, so the emptied page is the sibling
                self.buffer_pool.delete_page(sibling_id)?;
            }

            if parent_underflow {
                let delete_parent = self.coalesce_or_redistribute(root, parent_id)?;
                self.buffer_pool.unpin_page(parent_id, true)?;
                if delete_parent {
                    self.buffer_pool.delete_page(parent_id)?;
                }
            } else {
                self.buffer_pool.unpin_page(parent_id, true)?;
            }

            Ok(node_index != 0)
        } else {
            {
                let mut parent_guard = parent_ptr.write();
                let mut parent = InternalView::<K>::new(&mut parent_guard.data);

                let mut node_guard = node_ptr.write();
                let mut sibling_guard = sibling_ptr.write();
                if node_index == 0 {
                    // borrow the right sibling's first entry
                    let middle_key = parent.key_at(1);
                    let separator = if node_is_leaf {
                        let mut node = LeafView::<K>::new(&mut node_guard.data);
                        let mut sibling = LeafView::<K>::new(&mut sibling_guard.data);
                        sibling.move_first_to_end_of(&mut node)
                    } else {
                        let mut node = InternalView::<K>::new(&mut node_guard.data);
                        let mut sibling = InternalView::<K>::new(&mut sibling_guard.data);
                        sibling.move_first_to_end_of(&mut node, &middle_key, &self.buffer_pool)?
                    };
                    parent.set_key_at(1, &separator);
                } else {
                    // borrow the left sibling's last entry
                    let middle_key = parent.key_at(node_index);
                    let separator = if node_is_leaf {
                        let mut node = LeafView::<K>::new(&mut node_guard.data);
                        let mut sibling = LeafView::<K>::new(&mut sibling_guard.data);
                        sibling.move_last_to_front_of(&mut node)
                    } else {
                        let mut node = InternalView::<K>::new(&mut node_guard.data);
                        let mut sibling = InternalView::<K>::new(&mut sibling_guard.data);
                        sibling.move_last_to_front_of(&mut node, &middle_key, &self.buffer_pool)?
                    };
                    parent.set_key_at(node_index, &separator);
                }
            }

            self.buffer_pool.unpin_page(node_id, true)?;
            self.buffer_pool.unpin_page(sibling_id, true)?;
            self.buffer_pool.unpin_page(parent_id, true)?;
            Ok(false)
        }
    }

    /// Shrink at the top: an empty leaf root clears the tree; an
    /// internal root with one child promotes that child.
    fn adjust_root(&self, root: &mut PageId, old_root_id: PageId) -> Result<bool, BTreeError> {
        let root_ptr = self.buffer_pool.fetch_page(old_root_id)?;

        let mut promoted_child = None;
        let deleted = {
            let mut guard = root_ptr.write();
            if page::is_leaf(&guard.data) {
                if page::size(&guard.data) == 0 {
                    *root = INVALID_PAGE_ID;
                    true
                } else {
                    false
                }
            } else if page::size(&guard.data) == 1 {
                let mut node = InternalView::<K>::new(&mut guard.data);
                promoted_child = Some(node.remove_and_return_only_child());
                true
            } else {
                false
            }
        };

        if let Some(child_id) = promoted_child {
            let child_ptr = self.buffer_pool.fetch_page(child_id)?;
            page::set_parent_page_id(&mut child_ptr.write().data, INVALID_PAGE_ID);
            self.buffer_pool.unpin_page(child_id, true)?;
            *root = child_id;
        }
        if deleted {
            self.update_root_page_id(*root)?;
            debug!("index {} root now page {}", self.index_name, *root);
        }
        self.buffer_pool.unpin_page(old_root_id, deleted)?;
        Ok(deleted)
    }

    /// Persist the root page id in the header page record for this
    /// index. Called every time the root changes.
    fn update_root_page_id(&self, root_id: PageId) -> Result<(), BTreeError> {
        let header_ptr = self.buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        {
            let mut guard = header_ptr.write();
            let mut header = HeaderPage::new(&mut guard.data);
            if !header.update_record(&self.index_name, root_id) {
                header.insert_record(&self.index_name, root_id);
            }
        }
        self.buffer_pool.unpin_page(HEADER_PAGE_ID, true)?;
        Ok(())
    }

    fn allocate_page(&self) -> Result<(PagePtr, PageId), BTreeError> {
        match self.buffer_pool.new_page() {
            Ok(pair) => Ok(pair),
            Err(BufferPoolError::PoolExhausted) => Err(BTreeError::OutOfMemory),
            Err(e) => Err(BTreeError::BufferPool(e)),
        }
    }
}
