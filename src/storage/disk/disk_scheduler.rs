use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{BrambleError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// A disk I/O request handed to the background worker. Buffers are owned by
/// the request, so the worker never touches caller memory.
enum DiskRequest {
    Read {
        page_id: PageId,
        reply: Sender<Result<Box<[u8; PAGE_SIZE]>>>,
    },
    Write {
        page_id: PageId,
        data: Box<[u8; PAGE_SIZE]>,
        reply: Sender<Result<()>>,
    },
}

/// DiskScheduler funnels page I/O through a single background worker thread
/// fed by a bounded request queue. The synchronous entry points block on a
/// reply channel until the worker has completed the request.
pub struct DiskScheduler {
    /// The disk manager performing the actual I/O
    disk_manager: Arc<DiskManager>,
    /// Request queue; dropped on shutdown to disconnect the worker
    request_sender: Option<Sender<DiskRequest>>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(64);

        let dm = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || Self::run_worker(dm, receiver));

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    /// Reads a page through the worker, blocking until the data arrives.
    pub fn read_page_sync(&self, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>> {
        let (reply, done) = bounded(1);
        self.submit(DiskRequest::Read { page_id, reply })?;
        done.recv()
            .map_err(|e| BrambleError::DiskScheduler(format!("reply channel closed: {}", e)))?
    }

    /// Writes a page through the worker, blocking until it hits the file.
    pub fn write_page_sync(&self, page_id: PageId, data: Box<[u8; PAGE_SIZE]>) -> Result<()> {
        let (reply, done) = bounded(1);
        self.submit(DiskRequest::Write {
            page_id,
            data,
            reply,
        })?;
        done.recv()
            .map_err(|e| BrambleError::DiskScheduler(format!("reply channel closed: {}", e)))?
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn submit(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .as_ref()
            .expect("scheduler already shut down")
            .send(request)
            .map_err(|_| BrambleError::DiskScheduler("worker thread is gone".to_string()))
    }

    /// Worker loop: drains requests until the queue disconnects.
    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        for request in receiver {
            match request {
                DiskRequest::Read { page_id, reply } => {
                    let mut data = Box::new([0u8; PAGE_SIZE]);
                    let result = disk_manager.read_page(page_id, &mut data[..]).map(|_| data);
                    let _ = reply.send(result);
                }
                DiskRequest::Write {
                    page_id,
                    data,
                    reply,
                } => {
                    let _ = reply.send(disk_manager.write_page(page_id, &data[..]));
                }
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Disconnect the queue so the worker drains and exits
        self.request_sender.take();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[0] = 42;
        data[100] = 255;
        scheduler.write_page_sync(page_id, data).unwrap();

        let read_back = scheduler.read_page_sync(page_id).unwrap();
        assert_eq!(read_back[0], 42);
        assert_eq!(read_back[100], 255);
    }

    #[test]
    fn test_disk_scheduler_many_requests() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_ids: Vec<_> = (0..8)
            .map(|_| scheduler.disk_manager().allocate_page().unwrap())
            .collect();

        for (i, &pid) in page_ids.iter().enumerate() {
            let mut data = Box::new([0u8; PAGE_SIZE]);
            data[0] = i as u8 + 1;
            scheduler.write_page_sync(pid, data).unwrap();
        }

        for (i, &pid) in page_ids.iter().enumerate() {
            let data = scheduler.read_page_sync(pid).unwrap();
            assert_eq!(data[0], i as u8 + 1);
        }
    }

    #[test]
    fn test_disk_scheduler_shutdown_joins_worker() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(Arc::clone(&dm));

        let page_id = scheduler.disk_manager().allocate_page().unwrap();
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[7] = 7;
        scheduler.write_page_sync(page_id, data).unwrap();

        drop(scheduler);

        // The write made it to the file before the worker exited
        let mut read_back = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_back).unwrap();
        assert_eq!(read_back[7], 7);
    }
}
