use thiserror::Error;

use crate::common::types::PageId;
use crate::storage::disk::DiskManagerError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("page {0} not found in buffer pool")]
    PageNotFound(PageId),

    #[error("page {0} is pinned")]
    PagePinned(PageId),

    #[error("buffer pool exhausted: all frames pinned")]
    PoolExhausted,

    #[error("invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("disk manager error: {0}")]
    Disk(#[from] DiskManagerError),
}
