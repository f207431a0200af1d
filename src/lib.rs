//! Bramble - the storage core of an educational relational database
//!
//! The crate implements the classical demand-paged storage substrate: data
//! lives in fixed-size pages on disk, a buffer pool caches those pages in
//! memory, and a B+ tree index is built on top of paged storage. Callers
//! reference data only by page ID and must pin pages while using them.
//!
//! # Architecture
//!
//! - **Storage** (`storage`): page-granular disk access
//!   - `DiskManager`: reads, writes and allocates pages in the database file
//!   - `DiskScheduler`: funnels page I/O through a background worker thread
//!   - `HeaderPage`: page 0, recording each index's root page ID
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: fetches pages into frames and brokers all I/O;
//!     callers pin with `fetch_page`/`new_page` and release with `unpin_page`
//!   - `LruReplacer`: least-recently-unpinned eviction policy
//!   - `Frame`: one pool slot, its page bytes plus pin/dirty metadata
//!
//! - **Index** (`index`): ordered access by key
//!   - `BPlusTree`: balanced index over fixed-width keys; navigates pages
//!     through the buffer pool using the same pin protocol
//!   - `IndexIterator`: in-order traversal of the leaf chain
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bramble::buffer::BufferPoolManager;
//! use bramble::index::{BPlusTree, IntegerComparator};
//! use bramble::storage::disk::DiskManager;
//! use bramble::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("bramble.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let mut tree =
//!     BPlusTree::new("demo_index", bpm, IntegerComparator, 4, 32, 32).unwrap();
//!
//! let key = 42u32.to_le_bytes();
//! tree.insert(&key, RecordId::new(PageId::new(7), SlotId::new(0)))
//!     .unwrap();
//! assert!(tree.get_value(&key).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{BrambleError, PageId, RecordId, Result, SlotId};
