pub mod concurrency;
pub mod wal;

// Public exports
pub use concurrency::{LockManager, Transaction, TransactionManager, TransactionState};
pub use wal::{LogManager, LogRecord, LogRecordType, LogRecovery};
