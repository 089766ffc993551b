// Export public modules
pub mod common;
pub mod storage;
pub mod index;
pub mod transaction;

// Re-export key items for convenient access
pub use storage::buffer::BufferPoolManager;
pub use storage::buffer::BufferPoolError;
pub use storage::disk::DiskManager;
pub use index::btree::BPlusTree;
pub use transaction::concurrency::{LockManager, Transaction, TransactionManager};
pub use transaction::wal::{LogManager, LogRecovery};
