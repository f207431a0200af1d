use thiserror::Error;

use super::types::PageId;

/// Database error types
#[derive(Error, Debug)]
pub enum BrambleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Unsupported key size: {0}")]
    UnsupportedKeySize(usize),

    #[error("Tree fan-out does not fit in a page: {0}")]
    FanOutTooLarge(u32),

    #[error("Header page is full")]
    HeaderPageFull,
}

pub type Result<T> = std::result::Result<T, BrambleError>;
