pub mod log_record;
pub mod log_manager;
pub mod recovery;

pub use log_record::{LogPayload, LogRecord, LogRecordType, LOG_HEADER_SIZE};
pub use log_manager::LogManager;
pub use recovery::{LogRecovery, RecoveryError};
