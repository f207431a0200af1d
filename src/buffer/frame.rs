use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// Frame is one slot of the buffer pool: the resident page's bytes plus the
/// metadata the pool needs to drive the pin/eviction protocol.
///
/// A frame is pinned while `pin_count > 0`; pinned frames are never handed
/// to the replacer. The dirty bit is sticky: once set it stays set until the
/// page is flushed or the frame is reset for reuse.
pub struct Frame {
    /// Index of this frame in the pool's frame array
    frame_id: FrameId,
    /// The page currently resident, INVALID_PAGE_ID when empty
    page_id: Mutex<PageId>,
    /// Number of outstanding pins
    pin_count: AtomicU32,
    /// Whether the buffer diverges from the on-disk image
    is_dirty: AtomicBool,
    /// The page bytes
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Frame {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: Mutex::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        *self.page_id.lock()
    }

    pub fn set_page_id(&self, page_id: PageId) {
        *self.page_id.lock() = page_id;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the frame was not pinned.
    pub fn unpin(&self) -> Option<u32> {
        let mut current = self.pin_count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return None;
            }
            match self.pin_count.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(current - 1),
                Err(seen) => current = seen,
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// ORs `dirty` into the dirty bit (sticky semantics).
    pub fn mark_dirty(&self, dirty: bool) {
        if dirty {
            self.is_dirty.store(true, Ordering::Release);
        }
    }

    /// Shared access to the page bytes.
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Exclusive access to the page bytes. The caller is responsible for
    /// reporting the mutation through `unpin_page(.., true)`.
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Snapshots the page bytes into an owned buffer (for disk writes).
    pub fn snapshot(&self) -> Box<[u8; PAGE_SIZE]> {
        let guard = self.data.read();
        let mut copy = Box::new([0u8; PAGE_SIZE]);
        copy.copy_from_slice(&**guard);
        copy
    }

    /// Loads page bytes from an owned buffer (after a disk read).
    pub fn load(&self, data: &[u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(data);
    }

    /// Resets the frame to its empty state: no page, unpinned, clean, zeroed.
    pub fn reset(&self) {
        *self.page_id.lock() = INVALID_PAGE_ID;
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_new() {
        let frame = Frame::new(FrameId::new(0));
        assert_eq!(frame.frame_id(), FrameId::new(0));
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_frame_pin_unpin() {
        let frame = Frame::new(FrameId::new(0));

        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert_eq!(frame.unpin(), Some(1));
        assert_eq!(frame.unpin(), Some(0));
        assert_eq!(frame.unpin(), None);
    }

    #[test]
    fn test_frame_dirty_is_sticky() {
        let frame = Frame::new(FrameId::new(0));

        frame.mark_dirty(true);
        assert!(frame.is_dirty());
        frame.mark_dirty(false);
        assert!(frame.is_dirty(), "true OR false must stay true");
        frame.set_dirty(false);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_frame_snapshot_load_round_trip() {
        let frame = Frame::new(FrameId::new(0));

        {
            let mut guard = frame.write_data();
            guard[0] = 0xAB;
            guard[PAGE_SIZE - 1] = 0xCD;
        }

        let snap = frame.snapshot();
        assert_eq!(snap[0], 0xAB);
        assert_eq!(snap[PAGE_SIZE - 1], 0xCD);

        let other = Frame::new(FrameId::new(1));
        other.load(&snap[..]);
        assert_eq!(other.read_data()[0], 0xAB);
    }

    #[test]
    fn test_frame_reset() {
        let frame = Frame::new(FrameId::new(0));

        frame.set_page_id(PageId::new(5));
        frame.pin();
        frame.mark_dirty(true);
        frame.write_data()[0] = 1;

        frame.reset();

        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert_eq!(frame.read_data()[0], 0);
    }
}
