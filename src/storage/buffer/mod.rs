pub mod error;
pub mod manager;
pub mod replacer;
pub mod extendible_hash;

pub use error::BufferPoolError;
pub use manager::BufferPoolManager;
pub use replacer::LruReplacer;
pub use extendible_hash::ExtendibleHashTable;
