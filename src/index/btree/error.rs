use thiserror::Error;

use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("out of memory: could not allocate a tree page")]
    OutOfMemory,

    #[error("buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("tree structure corrupt: {0}")]
    Corrupt(String),
}
