use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::common::FrameId;

/// LRU replacement policy over unpinned frames.
///
/// The replacer tracks candidacy only: a frame is present iff its page is
/// unpinned and therefore evictable. The front of the deque is the most
/// recently unpinned frame, the back is the victim.
pub struct LruReplacer {
    candidates: Mutex<VecDeque<FrameId>>,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            candidates: Mutex::new(VecDeque::with_capacity(num_frames)),
        }
    }

    /// Removes and returns the least recently unpinned frame.
    /// Returns None when every frame is pinned.
    pub fn victim(&self) -> Option<FrameId> {
        self.candidates.lock().pop_back()
    }

    /// Withdraws a frame from candidacy. No-op if the frame is not a
    /// candidate.
    pub fn pin(&self, frame_id: FrameId) {
        let mut candidates = self.candidates.lock();
        if let Some(pos) = candidates.iter().position(|&f| f == frame_id) {
            candidates.remove(pos);
        }
    }

    /// Registers a frame as the freshest eviction candidate. A frame that is
    /// already a candidate keeps its position: repeated unpins must not
    /// promote it past frames unpinned later.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut candidates = self.candidates.lock();
        if candidates.iter().any(|&f| f == frame_id) {
            return;
        }
        candidates.push_front(frame_id);
    }

    /// Current number of eviction candidates.
    pub fn size(&self) -> usize {
        self.candidates.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_empty_victim() {
        let replacer = LruReplacer::new(4);
        assert_eq!(replacer.victim(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_replacer_victim_order() {
        let replacer = LruReplacer::new(4);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));

        // First unpinned is least recently used
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_repeated_unpin_keeps_position() {
        let replacer = LruReplacer::new(4);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(0)); // must not refresh frame 0

        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_lru_replacer_pin_removes_candidate() {
        let replacer = LruReplacer::new(4);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.pin(FrameId::new(0));

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_pin_absent_is_noop() {
        let replacer = LruReplacer::new(4);

        replacer.unpin(FrameId::new(2));
        replacer.pin(FrameId::new(3));

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_lru_replacer_unpin_after_victim_reenters() {
        let replacer = LruReplacer::new(4);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));

        replacer.unpin(FrameId::new(0));
        // frame 1 is now older than frame 0
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    }
}
