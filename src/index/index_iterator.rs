use std::sync::Arc;

use crate::buffer::{BufferPoolManager, Frame};
use crate::common::{PageId, RecordId, Result};

use super::btree_page::NodeRef;

/// Forward-only walker over the leaf chain. The iterator keeps a pin on the
/// leaf it is positioned in and releases it when it advances past the leaf
/// or is dropped.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    key_size: usize,
    /// Current leaf, pinned. None once the chain is exhausted (or the tree
    /// was empty).
    current: Option<(PageId, Arc<Frame>)>,
    index: usize,
}

impl IndexIterator {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        key_size: usize,
        start: Option<(PageId, Arc<Frame>)>,
        index: usize,
    ) -> Self {
        Self {
            bpm,
            key_size,
            current: start,
            index,
        }
    }

    /// True when no further entries remain.
    pub fn is_end(&self) -> bool {
        match &self.current {
            None => true,
            Some((_, frame)) => {
                let guard = frame.read_data();
                let node = NodeRef::new(&guard[..], self.key_size);
                self.index >= node.size() as usize && node.next_page_id().is_none()
            }
        }
    }

    /// Returns the entry under the cursor and advances, hopping to the next
    /// leaf in the chain when the current one is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, RecordId)>> {
        loop {
            let Some((page_id, frame)) = &self.current else {
                return Ok(None);
            };

            let step = {
                let guard = frame.read_data();
                let node = NodeRef::new(&guard[..], self.key_size);
                if self.index < node.size() as usize {
                    Ok((
                        node.key_at(self.index).to_vec(),
                        node.record_at(self.index),
                    ))
                } else {
                    Err(node.next_page_id())
                }
            };

            match step {
                Ok(entry) => {
                    self.index += 1;
                    return Ok(Some(entry));
                }
                Err(next) => {
                    let page_id = *page_id;
                    self.current = None;
                    self.bpm.unpin_page(page_id, false);

                    let Some(next_id) = next else {
                        return Ok(None);
                    };
                    let next_frame = self.bpm.fetch_page(next_id)?;
                    self.current = Some((next_id, next_frame));
                    self.index = 0;
                }
            }
        }
    }
}

impl Iterator for IndexIterator {
    type Item = Result<(Vec<u8>, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl Drop for IndexIterator {
    fn drop(&mut self) {
        if let Some((page_id, _)) = self.current.take() {
            self.bpm.unpin_page(page_id, false);
        }
    }
}
