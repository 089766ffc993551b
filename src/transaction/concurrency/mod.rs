pub mod transaction;
pub mod lock_manager;
pub mod transaction_manager;

// Public exports
pub use transaction::{TableOp, Transaction, TransactionState, WriteRecord, WriteType};
pub use lock_manager::{LockManager, LockMode};
pub use transaction_manager::TransactionManager;
