use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::common::{BrambleError, FrameId, PageId, Result, INVALID_PAGE_ID};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{Frame, LruReplacer};

/// Bookkeeping guarded by the pool-wide latch
struct PoolInner {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames currently holding no page
    free_list: LinkedList<FrameId>,
}

/// BufferPoolManager caches disk pages in a fixed array of frames and
/// brokers all page I/O. Callers address pages only by ID, pin them through
/// `fetch_page`/`new_page` and must release every pin with `unpin_page`,
/// passing the dirty flag for the mutations they made.
///
/// Every operation runs under one pool-wide latch, including the disk I/O it
/// triggers. Simple and correct; throughput is not the goal here.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// The buffer pool frames
    frames: Vec<Arc<Frame>>,
    /// Page table and free list
    inner: Mutex<PoolInner>,
    /// LRU replacer over unpinned frames
    replacer: LruReplacer,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with `pool_size` empty frames, all of
    /// them on the free list.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruReplacer::new(pool_size),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Fetches a page into the pool and pins it. On a hit the resident frame
    /// is pinned and returned; on a miss a frame is taken from the free list
    /// or evicted (dirty victims are written back first) and the page is read
    /// from disk. `Err(BufferPoolFull)` when every frame is pinned.
    ///
    /// The caller must balance this with exactly one `unpin_page`.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        if page_id == INVALID_PAGE_ID {
            return Err(BrambleError::InvalidPageId(page_id));
        }

        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            self.replacer.pin(frame_id);
            frame.pin();
            trace!("buffer pool hit for {}", page_id);
            return Ok(Arc::clone(frame));
        }

        debug!("buffer pool miss for {}, loading from disk", page_id);
        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.frames[frame_id.as_usize()];

        inner.page_table.insert(page_id, frame_id);
        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();
        self.replacer.pin(frame_id);

        match self.disk_scheduler.read_page_sync(page_id) {
            Ok(data) => {
                frame.load(&data[..]);
                Ok(Arc::clone(frame))
            }
            Err(e) => {
                // roll the installation back so the frame is not leaked
                inner.page_table.remove(&page_id);
                frame.reset();
                inner.free_list.push_back(frame_id);
                Err(e)
            }
        }
    }

    /// Allocates a fresh page on disk and pins it in a zeroed frame.
    /// `Err(BufferPoolFull)` when every frame is pinned.
    pub fn new_page(&self) -> Result<(PageId, Arc<Frame>)> {
        let mut inner = self.inner.lock();

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.frames[frame_id.as_usize()];

        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                frame.reset();
                inner.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        debug!("allocated {} into frame {}", page_id, frame_id);
        Ok((page_id, Arc::clone(frame)))
    }

    /// Releases one pin on a page, ORing `is_dirty` into the frame's dirty
    /// bit. When the pin count reaches zero the frame becomes an eviction
    /// candidate. Returns false if the page is not resident.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];

        if let Some(0) = frame.unpin() {
            self.replacer.unpin(frame_id);
        }
        frame.mark_dirty(is_dirty);
        true
    }

    /// Writes a resident page back to disk and clears its dirty bit. The pin
    /// count is untouched. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.as_usize()];

        self.disk_scheduler
            .write_page_sync(page_id, frame.snapshot())?;
        frame.set_dirty(false);
        Ok(true)
    }

    /// Flushes every frame that holds a valid page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _inner = self.inner.lock();

        for frame in &self.frames {
            let page_id = frame.page_id();
            if page_id == INVALID_PAGE_ID {
                continue;
            }
            self.disk_scheduler
                .write_page_sync(page_id, frame.snapshot())?;
            frame.set_dirty(false);
        }
        Ok(())
    }

    /// Drops a page from the pool and deallocates it on disk. Idempotent:
    /// a non-resident page returns `Ok(true)`. A pinned page cannot be
    /// deleted and returns `Ok(false)`.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(true);
        }

        let mut inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        if frame.is_dirty() {
            self.disk_scheduler
                .write_page_sync(page_id, frame.snapshot())?;
        }
        self.disk_scheduler
            .disk_manager()
            .deallocate_page(page_id)?;

        inner.page_table.remove(&page_id);
        // withdraw from candidacy; the frame is free now, not evictable
        self.replacer.pin(frame_id);
        frame.reset();
        inner.free_list.push_back(frame_id);

        trace!("deleted {}, frame {} returned to free list", page_id, frame_id);
        Ok(true)
    }

    /// Pin count of a resident page; None if not resident. The tests use
    /// this to catch pin leaks.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.inner.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Obtains an empty frame: free list first, then the replacer's victim.
    /// A dirty victim is written back before its frame is reused.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_back() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(BrambleError::BufferPoolFull)?;
        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            trace!("evicting dirty {} from frame {}", old_page_id, frame_id);
            if let Err(e) = self
                .disk_scheduler
                .write_page_sync(old_page_id, frame.snapshot())
            {
                // victim stays resident and evictable
                self.replacer.unpin(frame_id);
                return Err(e);
            }
            frame.set_dirty(false);
        } else {
            trace!("evicting clean {} from frame {}", old_page_id, frame_id);
        }

        if old_page_id != INVALID_PAGE_ID {
            inner.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }
}
