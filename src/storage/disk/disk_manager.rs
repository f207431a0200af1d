use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, HEADER_PAGE_ID, PAGE_SIZE};

/// DiskManager is responsible for reading and writing pages to/from the
/// database file. Page 0 is reserved for the header page and is written
/// out zeroed when a fresh file is created.
///
/// Page IDs are handed out monotonically; `deallocate_page` is bookkeeping
/// only and never causes an ID to be reused.
pub struct DiskManager {
    /// Database file guarded by a mutex for exclusive cursor access
    db_file: Mutex<File>,
    /// Path of the database file
    file_path: PathBuf,
    /// Next page ID to hand out
    next_page_id: AtomicU32,
    /// Number of pages handed back via deallocate_page
    num_deallocated: AtomicU32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at the given path.
    /// A fresh file gets a zeroed header page at PageId 0.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let file_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&file_path)?;

        let file_size = file.metadata()?.len();
        let pages_on_disk = (file_size / PAGE_SIZE as u64) as u32;

        let dm = Self {
            db_file: Mutex::new(file),
            file_path,
            next_page_id: AtomicU32::new(pages_on_disk.max(1)),
            num_deallocated: AtomicU32::new(0),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if pages_on_disk == 0 {
            let zeros = [0u8; PAGE_SIZE];
            dm.write_page(HEADER_PAGE_ID, &zeros)?;
        }

        Ok(dm)
    }

    /// Reads a page from disk into the provided buffer.
    /// Reads past the current end of file come back zero-filled.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a new page on disk and returns its page ID.
    /// The new page is zeroed out so stale file contents never leak through.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst));

        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;

        Ok(page_id)
    }

    /// Marks a page as deallocated. Best-effort bookkeeping: the ID is not
    /// reused and the on-disk bytes are left in place.
    pub fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        self.num_deallocated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of pages handed out so far (including the header page).
    pub fn num_pages(&self) -> u32 {
        self.next_page_id.load(Ordering::Relaxed)
    }

    pub fn num_deallocated(&self) -> u32 {
        self.num_deallocated.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Forces all buffered writes down to stable storage.
    pub fn sync(&self) -> Result<()> {
        let file = self.db_file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.db_file.get_mut();
        let _ = file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_manager_new() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let dm = DiskManager::new(&db_path).unwrap();

        assert!(db_path.exists());
        assert_eq!(dm.num_pages(), 1); // header page
    }

    #[test]
    fn test_disk_manager_allocate_page() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::new(temp_dir.path().join("alloc.db")).unwrap();

        let first = dm.allocate_page().unwrap();
        let second = dm.allocate_page().unwrap();

        assert_eq!(first, PageId::new(1)); // page 0 is the header
        assert_eq!(second, PageId::new(2));
        assert_eq!(dm.num_pages(), 3);
    }

    #[test]
    fn test_disk_manager_read_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::new(temp_dir.path().join("rw.db")).unwrap();

        let page_id = dm.allocate_page().unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_data).unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);
    }

    #[test]
    fn test_disk_manager_read_past_eof_zero_filled() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::new(temp_dir.path().join("eof.db")).unwrap();

        let mut data = [7u8; PAGE_SIZE];
        dm.read_page(PageId::new(50), &mut data).unwrap();

        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_persistence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("persist.db");

        let page_id = {
            let dm = DiskManager::new(&db_path).unwrap();
            let page_id = dm.allocate_page().unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 123;
            dm.write_page(page_id, &data).unwrap();
            page_id
        };

        {
            let dm = DiskManager::new(&db_path).unwrap();
            assert_eq!(dm.num_pages(), 2); // header + 1 data page

            let mut data = [0u8; PAGE_SIZE];
            dm.read_page(page_id, &mut data).unwrap();
            assert_eq!(data[0], 123);
        }
    }

    #[test]
    fn test_disk_manager_deallocate_is_bookkeeping() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::new(temp_dir.path().join("dealloc.db")).unwrap();

        let page_id = dm.allocate_page().unwrap();
        dm.deallocate_page(page_id).unwrap();

        assert_eq!(dm.num_deallocated(), 1);
        // IDs keep increasing monotonically
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(2));
    }
}
