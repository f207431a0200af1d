use std::sync::Arc;

use log::debug;

use crate::buffer::{BufferPoolManager, Frame};
use crate::common::{
    BrambleError, PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE,
    SUPPORTED_KEY_SIZES,
};
use crate::storage::page::HeaderPage;

use super::btree_page::{
    NodeMut, NodeRef, CHILD_SIZE, COMMON_HEADER_SIZE, LEAF_HEADER_SIZE, RECORD_ID_SIZE,
};
use super::index_iterator::IndexIterator;
use super::key_comparator::KeyComparator;

/// B+ tree index over fixed-width keys, backed entirely by buffer-pool
/// pages. Nodes are transient byte views into pinned frames; parent/child
/// links are page IDs resolved through the pool.
///
/// Keys are unique. The tree is safe for single-threaded use; callers that
/// share it across threads must serialize access themselves.
///
/// Pin discipline: every page fetched while executing an operation is
/// unpinned before the operation returns, with the dirty flag reflecting
/// whether that code path mutated the page.
pub struct BPlusTree<C: KeyComparator> {
    /// Name under which the root page ID is recorded in the header page
    index_name: String,
    /// Current root, None while the tree is empty
    root_page_id: Option<PageId>,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    key_size: usize,
    leaf_max_size: u32,
    internal_max_size: u32,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Opens the index named `name`, creating its header record if this is
    /// the first time the name is seen. An existing root page ID is picked
    /// up from the header page.
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        key_size: usize,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> Result<Self> {
        if !SUPPORTED_KEY_SIZES.contains(&key_size) {
            return Err(BrambleError::UnsupportedKeySize(key_size));
        }
        assert!(leaf_max_size >= 2, "leaf fan-out must be at least 2");
        assert!(internal_max_size >= 3, "internal fan-out must be at least 3");

        // an overfull node (max_size + 1 entries) must still fit in a page
        let leaf_bytes = LEAF_HEADER_SIZE + (leaf_max_size as usize + 1) * (key_size + RECORD_ID_SIZE);
        let internal_bytes =
            COMMON_HEADER_SIZE + (internal_max_size as usize + 1) * (key_size + CHILD_SIZE);
        if leaf_bytes > PAGE_SIZE {
            return Err(BrambleError::FanOutTooLarge(leaf_max_size));
        }
        if internal_bytes > PAGE_SIZE {
            return Err(BrambleError::FanOutTooLarge(internal_max_size));
        }

        let index_name = name.into();
        let root_page_id = {
            let frame = bpm.fetch_page(HEADER_PAGE_ID)?;
            let (root, created) = {
                let mut guard = frame.write_data();
                let mut header = HeaderPage::new(&mut guard[..]);
                match header.get_root_id(&index_name) {
                    Some(root) => (Some(root), false),
                    None => {
                        // first open: make sure a record exists so later root
                        // changes are plain updates
                        if !header.update_record(&index_name, INVALID_PAGE_ID)
                            && !header.insert_record(&index_name, INVALID_PAGE_ID)
                        {
                            bpm.unpin_page(HEADER_PAGE_ID, false);
                            return Err(BrambleError::HeaderPageFull);
                        }
                        (None, true)
                    }
                }
            };
            bpm.unpin_page(HEADER_PAGE_ID, created);
            root
        };

        Ok(Self {
            index_name,
            root_page_id,
            bpm,
            comparator,
            key_size,
            leaf_max_size,
            internal_max_size,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id.is_none()
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        self.root_page_id
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    /// Point lookup.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<RecordId>> {
        self.check_key(key);

        let Some((leaf_id, frame)) = self.find_leaf_page(key, false)? else {
            return Ok(None);
        };

        let result = {
            let guard = frame.read_data();
            let node = NodeRef::new(&guard[..], self.key_size);
            node.lookup(key, &self.comparator)
        };
        self.bpm.unpin_page(leaf_id, false);
        Ok(result)
    }

    /// Inserts a key/record pair. Returns false if the key is already
    /// present (keys are unique).
    pub fn insert(&mut self, key: &[u8], value: RecordId) -> Result<bool> {
        self.check_key(key);

        if self.root_page_id.is_none() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }
        self.insert_into_leaf(key, value)
    }

    /// Removes a key. Absent keys are a silent no-op.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        self.check_key(key);

        let Some((leaf_id, frame)) = self.find_leaf_page(key, false)? else {
            return Ok(());
        };

        let (removed, new_size, min_size) = {
            let mut guard = frame.write_data();
            let mut node = NodeMut::new(&mut guard[..], self.key_size);
            let before = node.as_ref().size();
            let after = node.leaf_remove(key, &self.comparator);
            (after != before, after, node.as_ref().min_size())
        };

        if !removed {
            self.bpm.unpin_page(leaf_id, false);
            return Ok(());
        }

        self.bpm.unpin_page(leaf_id, true);
        if new_size < min_size {
            self.coalesce_or_redistribute(leaf_id)?;
        }
        Ok(())
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator> {
        let zero_key = vec![0u8; self.key_size];
        let start = self.find_leaf_page(&zero_key, true)?;
        Ok(IndexIterator::new(
            Arc::clone(&self.bpm),
            self.key_size,
            start,
            0,
        ))
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn begin_from(&self, key: &[u8]) -> Result<IndexIterator> {
        self.check_key(key);

        let start = self.find_leaf_page(key, false)?;
        let index = match &start {
            Some((_, frame)) => {
                let guard = frame.read_data();
                let node = NodeRef::new(&guard[..], self.key_size);
                node.key_index(key, &self.comparator)
            }
            None => 0,
        };
        Ok(IndexIterator::new(
            Arc::clone(&self.bpm),
            self.key_size,
            start,
            index,
        ))
    }

    fn check_key(&self, key: &[u8]) {
        assert_eq!(
            key.len(),
            self.key_size,
            "key width does not match the tree"
        );
    }

    /// Descends from the root to the leaf covering `key` (or the leftmost
    /// leaf). Each internal page is unpinned clean before moving down; the
    /// returned leaf is still pinned and the caller must unpin it.
    fn find_leaf_page(
        &self,
        key: &[u8],
        left_most: bool,
    ) -> Result<Option<(PageId, Arc<Frame>)>> {
        let Some(root_id) = self.root_page_id else {
            return Ok(None);
        };

        let mut current_id = root_id;
        loop {
            let frame = self.bpm.fetch_page(current_id)?;
            let next = {
                let guard = frame.read_data();
                let node = NodeRef::new(&guard[..], self.key_size);
                if node.is_leaf() {
                    None
                } else if left_most {
                    Some(node.child_at(0))
                } else {
                    Some(node.lookup_child(key, &self.comparator))
                }
            };
            match next {
                None => return Ok(Some((current_id, frame))),
                Some(child) => {
                    self.bpm.unpin_page(current_id, false);
                    current_id = child;
                }
            }
        }
    }

    /// Builds a one-leaf tree holding the first entry and records the new
    /// root in the header page.
    fn start_new_tree(&mut self, key: &[u8], value: RecordId) -> Result<()> {
        let (root_id, frame) = self.bpm.new_page()?;
        {
            let mut guard = frame.write_data();
            let mut node = NodeMut::new(&mut guard[..], self.key_size);
            node.init_leaf(root_id, None, self.leaf_max_size);
            node.leaf_insert(key, value, &self.comparator);
        }
        self.root_page_id = Some(root_id);
        self.sync_root_page_id()?;
        self.bpm.unpin_page(root_id, true);
        debug!("index {:?}: new tree rooted at {}", self.index_name, root_id);
        Ok(())
    }

    fn insert_into_leaf(&mut self, key: &[u8], value: RecordId) -> Result<bool> {
        let (leaf_id, frame) = self
            .find_leaf_page(key, false)?
            .expect("tree is known to be non-empty");

        let outcome = {
            let mut guard = frame.write_data();
            let mut node = NodeMut::new(&mut guard[..], self.key_size);
            if node.as_ref().lookup(key, &self.comparator).is_some() {
                None
            } else {
                let new_size = node.leaf_insert(key, value, &self.comparator);
                Some(new_size > node.as_ref().max_size())
            }
        };

        match outcome {
            None => {
                self.bpm.unpin_page(leaf_id, false);
                Ok(false)
            }
            Some(false) => {
                self.bpm.unpin_page(leaf_id, true);
                Ok(true)
            }
            Some(true) => {
                self.split_leaf(leaf_id, &frame)?;
                self.bpm.unpin_page(leaf_id, true);
                Ok(true)
            }
        }
    }

    /// Splits an overfull leaf: the upper half moves to a fresh sibling,
    /// the sibling is spliced into the leaf chain, and its first key is
    /// promoted into the parent.
    fn split_leaf(&mut self, leaf_id: PageId, frame: &Arc<Frame>) -> Result<()> {
        let (new_leaf_id, new_frame) = self.bpm.new_page()?;

        let (separator, parent_id) = {
            let mut old_guard = frame.write_data();
            let mut old_node = NodeMut::new(&mut old_guard[..], self.key_size);
            let mut new_guard = new_frame.write_data();
            let mut new_node = NodeMut::new(&mut new_guard[..], self.key_size);

            let parent_id = old_node.as_ref().parent_page_id();
            new_node.init_leaf(new_leaf_id, parent_id, self.leaf_max_size);
            old_node.leaf_move_half_to(&mut new_node);

            new_node.set_next_page_id(old_node.as_ref().next_page_id());
            old_node.set_next_page_id(Some(new_leaf_id));

            (new_node.as_ref().key_at(0).to_vec(), parent_id)
        };

        self.bpm.unpin_page(new_leaf_id, true);
        self.insert_into_parent(leaf_id, separator, new_leaf_id, parent_id)
    }

    /// Hooks `new_id` into the parent of `old_id` under `key`, growing a new
    /// root or splitting the parent as needed.
    fn insert_into_parent(
        &mut self,
        old_id: PageId,
        key: Vec<u8>,
        new_id: PageId,
        parent_id: Option<PageId>,
    ) -> Result<()> {
        let Some(parent_id) = parent_id else {
            // old node was the root: grow the tree by one level
            let (root_id, root_frame) = self.bpm.new_page()?;
            {
                let mut guard = root_frame.write_data();
                let mut root = NodeMut::new(&mut guard[..], self.key_size);
                root.init_internal(root_id, None, self.internal_max_size);
                root.populate_new_root(old_id, &key, new_id);
            }
            self.bpm.unpin_page(root_id, true);

            self.reparent(old_id, root_id)?;
            self.reparent(new_id, root_id)?;

            self.root_page_id = Some(root_id);
            self.sync_root_page_id()?;
            debug!("index {:?}: root split, new root {}", self.index_name, root_id);
            return Ok(());
        };

        let parent_frame = self.bpm.fetch_page(parent_id)?;
        let overflow = {
            let mut guard = parent_frame.write_data();
            let mut parent = NodeMut::new(&mut guard[..], self.key_size);
            let new_size = parent.insert_node_after(old_id, &key, new_id);
            new_size > parent.as_ref().max_size()
        };

        if !overflow {
            self.bpm.unpin_page(parent_id, true);
            return Ok(());
        }

        let (promoted, new_internal_id, grandparent_id) =
            self.split_internal(parent_id, &parent_frame)?;
        self.bpm.unpin_page(parent_id, true);
        self.insert_into_parent(parent_id, promoted, new_internal_id, grandparent_id)
    }

    /// Splits an overfull internal node, adopting the moved children into
    /// the new sibling. Returns the promoted separator, the sibling's page
    /// ID and the split node's parent.
    fn split_internal(
        &mut self,
        internal_id: PageId,
        frame: &Arc<Frame>,
    ) -> Result<(Vec<u8>, PageId, Option<PageId>)> {
        let (new_internal_id, new_frame) = self.bpm.new_page()?;

        let (promoted, moved_children, parent_id) = {
            let mut old_guard = frame.write_data();
            let mut old_node = NodeMut::new(&mut old_guard[..], self.key_size);
            let mut new_guard = new_frame.write_data();
            let mut new_node = NodeMut::new(&mut new_guard[..], self.key_size);

            let parent_id = old_node.as_ref().parent_page_id();
            new_node.init_internal(new_internal_id, parent_id, self.internal_max_size);
            old_node.internal_move_half_to(&mut new_node);

            let new_ref = new_node.as_ref();
            let moved: Vec<PageId> = (0..new_ref.size() as usize)
                .map(|i| new_ref.child_at(i))
                .collect();
            // the promoted key rides in the new node's dummy slot
            (new_ref.key_at(0).to_vec(), moved, parent_id)
        };

        self.bpm.unpin_page(new_internal_id, true);
        for child in moved_children {
            self.reparent(child, new_internal_id)?;
        }

        Ok((promoted, new_internal_id, parent_id))
    }

    /// Rewrites one child's parent pointer through the buffer pool.
    fn reparent(&self, child_id: PageId, parent_id: PageId) -> Result<()> {
        let frame = self.bpm.fetch_page(child_id)?;
        {
            let mut guard = frame.write_data();
            let mut node = NodeMut::new(&mut guard[..], self.key_size);
            node.set_parent_page_id(Some(parent_id));
        }
        self.bpm.unpin_page(child_id, true);
        Ok(())
    }

    /// Restores minimum occupancy of `node_id` by merging with or borrowing
    /// from a sibling. Prefers the left sibling; child 0 uses its right
    /// neighbor.
    fn coalesce_or_redistribute(&mut self, node_id: PageId) -> Result<()> {
        let frame = self.bpm.fetch_page(node_id)?;
        let (parent_id, node_size, node_max, is_leaf) = {
            let guard = frame.read_data();
            let node = NodeRef::new(&guard[..], self.key_size);
            (
                node.parent_page_id(),
                node.size(),
                node.max_size(),
                node.is_leaf(),
            )
        };

        let Some(parent_id) = parent_id else {
            self.bpm.unpin_page(node_id, false);
            return self.adjust_root(node_id);
        };

        let parent_frame = self.bpm.fetch_page(parent_id)?;
        let (node_index, sibling_id) = {
            let guard = parent_frame.read_data();
            let parent = NodeRef::new(&guard[..], self.key_size);
            let index = parent
                .child_index(node_id)
                .expect("node must appear in its parent");
            let sibling_index = if index == 0 { 1 } else { index - 1 };
            (index, parent.child_at(sibling_index))
        };

        let sibling_frame = self.bpm.fetch_page(sibling_id)?;
        let sibling_size = {
            let guard = sibling_frame.read_data();
            NodeRef::new(&guard[..], self.key_size).size()
        };

        if node_size + sibling_size <= node_max {
            self.coalesce(
                node_id,
                &frame,
                sibling_id,
                &sibling_frame,
                parent_id,
                &parent_frame,
                node_index,
                is_leaf,
            )
        } else {
            self.redistribute(
                node_id,
                &frame,
                sibling_id,
                &sibling_frame,
                parent_id,
                &parent_frame,
                node_index,
                is_leaf,
            )
        }
    }

    /// Merges the rightward of (node, sibling) into the leftward one,
    /// removes the separator from the parent and deletes the emptied page.
    /// Recurses when the parent underflows.
    #[allow(clippy::too_many_arguments)]
    fn coalesce(
        &mut self,
        node_id: PageId,
        node_frame: &Arc<Frame>,
        sibling_id: PageId,
        sibling_frame: &Arc<Frame>,
        parent_id: PageId,
        parent_frame: &Arc<Frame>,
        node_index: usize,
        is_leaf: bool,
    ) -> Result<()> {
        // merge right into left; when the node is child 0, its right
        // sibling is the one that disappears
        let (left_id, left_frame, right_id, right_frame, remove_index) = if node_index == 0 {
            (node_id, node_frame, sibling_id, sibling_frame, 1)
        } else {
            (sibling_id, sibling_frame, node_id, node_frame, node_index)
        };

        let middle_key = {
            let guard = parent_frame.read_data();
            let parent = NodeRef::new(&guard[..], self.key_size);
            parent.key_at(remove_index).to_vec()
        };

        let adopted = {
            let mut left_guard = left_frame.write_data();
            let mut left = NodeMut::new(&mut left_guard[..], self.key_size);
            let mut right_guard = right_frame.write_data();
            let mut right = NodeMut::new(&mut right_guard[..], self.key_size);

            if is_leaf {
                right.leaf_move_all_to(&mut left);
                Vec::new()
            } else {
                let moved = right.as_ref().size() as usize;
                right.internal_move_all_to(&mut left, &middle_key);
                let left_ref = left.as_ref();
                let total = left_ref.size() as usize;
                (total - moved..total).map(|i| left_ref.child_at(i)).collect()
            }
        };

        for child in adopted {
            self.reparent(child, left_id)?;
        }

        self.bpm.unpin_page(left_id, true);
        self.bpm.unpin_page(right_id, true);
        let deleted = self.bpm.delete_page(right_id)?;
        debug_assert!(deleted, "merged page must not be pinned elsewhere");

        let (parent_size, parent_min) = {
            let mut guard = parent_frame.write_data();
            let mut parent = NodeMut::new(&mut guard[..], self.key_size);
            parent.remove_at(remove_index);
            (parent.as_ref().size(), parent.as_ref().min_size())
        };
        self.bpm.unpin_page(parent_id, true);

        if parent_size < parent_min {
            self.coalesce_or_redistribute(parent_id)?;
        }
        Ok(())
    }

    /// Borrows one entry from the sibling, rotating the separator through
    /// the parent.
    #[allow(clippy::too_many_arguments)]
    fn redistribute(
        &mut self,
        node_id: PageId,
        node_frame: &Arc<Frame>,
        sibling_id: PageId,
        sibling_frame: &Arc<Frame>,
        parent_id: PageId,
        parent_frame: &Arc<Frame>,
        node_index: usize,
        is_leaf: bool,
    ) -> Result<()> {
        // separator between the two nodes: at the right-hand node's index
        let separator_index = if node_index == 0 { 1 } else { node_index };

        let (new_separator, adopted) = {
            let mut node_guard = node_frame.write_data();
            let mut node = NodeMut::new(&mut node_guard[..], self.key_size);
            let mut sibling_guard = sibling_frame.write_data();
            let mut sibling = NodeMut::new(&mut sibling_guard[..], self.key_size);

            if node_index == 0 {
                // borrow the right sibling's first entry
                if is_leaf {
                    sibling.leaf_move_first_to_end_of(&mut node);
                    (sibling.as_ref().key_at(0).to_vec(), None)
                } else {
                    let middle_key = {
                        let guard = parent_frame.read_data();
                        let parent = NodeRef::new(&guard[..], self.key_size);
                        parent.key_at(separator_index).to_vec()
                    };
                    // the boundary key freed from the sibling ascends
                    let ascending = sibling.as_ref().key_at(1).to_vec();
                    let moved_child = sibling.as_ref().child_at(0);
                    sibling.internal_move_first_to_end_of(&mut node, &middle_key);
                    (ascending, Some((moved_child, node_id)))
                }
            } else {
                // borrow the left sibling's last entry
                if is_leaf {
                    sibling.leaf_move_last_to_front_of(&mut node);
                    (node.as_ref().key_at(0).to_vec(), None)
                } else {
                    let middle_key = {
                        let guard = parent_frame.read_data();
                        let parent = NodeRef::new(&guard[..], self.key_size);
                        parent.key_at(separator_index).to_vec()
                    };
                    let last = sibling.as_ref().size() as usize - 1;
                    let ascending = sibling.as_ref().key_at(last).to_vec();
                    let moved_child = sibling.as_ref().child_at(last);
                    sibling.internal_move_last_to_front_of(&mut node, &middle_key);
                    (ascending, Some((moved_child, node_id)))
                }
            }
        };

        if let Some((child, new_parent)) = adopted {
            self.reparent(child, new_parent)?;
        }

        {
            let mut guard = parent_frame.write_data();
            let mut parent = NodeMut::new(&mut guard[..], self.key_size);
            parent.set_key_at(separator_index, &new_separator);
        }

        self.bpm.unpin_page(node_id, true);
        self.bpm.unpin_page(sibling_id, true);
        self.bpm.unpin_page(parent_id, true);
        Ok(())
    }

    /// Shrinks the tree at the root: an empty leaf root ends the tree, an
    /// internal root with a single child hands the root to that child.
    fn adjust_root(&mut self, root_id: PageId) -> Result<()> {
        let frame = self.bpm.fetch_page(root_id)?;
        let (is_leaf, size) = {
            let guard = frame.read_data();
            let node = NodeRef::new(&guard[..], self.key_size);
            (node.is_leaf(), node.size())
        };

        if is_leaf && size == 0 {
            // the last entry of the whole tree is gone
            self.bpm.unpin_page(root_id, false);
            let deleted = self.bpm.delete_page(root_id)?;
            debug_assert!(deleted);
            self.root_page_id = None;
            self.sync_root_page_id()?;
            debug!("index {:?}: tree emptied", self.index_name);
            return Ok(());
        }

        if !is_leaf && size == 1 {
            // promote the only remaining child
            let new_root_id = {
                let mut guard = frame.write_data();
                let mut node = NodeMut::new(&mut guard[..], self.key_size);
                node.remove_and_return_only_child()
            };
            self.bpm.unpin_page(root_id, true);
            let deleted = self.bpm.delete_page(root_id)?;
            debug_assert!(deleted);

            self.reparent_root(new_root_id)?;
            self.root_page_id = Some(new_root_id);
            self.sync_root_page_id()?;
            debug!(
                "index {:?}: root collapsed into {}",
                self.index_name, new_root_id
            );
            return Ok(());
        }

        self.bpm.unpin_page(root_id, false);
        Ok(())
    }

    /// Clears the parent pointer of the page about to become the root.
    fn reparent_root(&self, page_id: PageId) -> Result<()> {
        let frame = self.bpm.fetch_page(page_id)?;
        {
            let mut guard = frame.write_data();
            let mut node = NodeMut::new(&mut guard[..], self.key_size);
            node.set_parent_page_id(None);
        }
        self.bpm.unpin_page(page_id, true);
        Ok(())
    }

    /// Writes the current root page ID through to the header page. Called on
    /// every root change.
    fn sync_root_page_id(&self) -> Result<()> {
        let root = self.root_page_id.unwrap_or(INVALID_PAGE_ID);
        let frame = self.bpm.fetch_page(HEADER_PAGE_ID)?;
        {
            let mut guard = frame.write_data();
            let mut header = HeaderPage::new(&mut guard[..]);
            let updated = header.update_record(&self.index_name, root);
            debug_assert!(updated, "header record is created at construction");
        }
        self.bpm.unpin_page(HEADER_PAGE_ID, true);
        Ok(())
    }
}
